//! Cross-thread completion queue.
//!
//! Native modules that perform blocking I/O run it off-thread and push
//! completion events here; the fiber waiting on the request drains the
//! queue on the VM thread and runs script callbacks without holding the
//! lock. This is the only synchronization primitive in the runtime - the
//! VM itself is single-threaded.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// A mutex-guarded FIFO of completion events.
///
/// The payload type must be `Send`; script values never cross threads,
/// so producers post plain data (status codes, body bytes, strings) which
/// the VM-thread consumer converts into script values.
#[derive(Debug)]
pub struct EventQueue<T> {
    events: Arc<Mutex<VecDeque<T>>>,
}

impl<T> EventQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> EventQueue<T> {
        EventQueue {
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Appends an event. Callable from any thread.
    pub fn post(&self, event: T) {
        self.events.lock().push_back(event);
    }

    /// Removes and returns the oldest event, if any.
    pub fn take(&self) -> Option<T> {
        self.events.lock().pop_front()
    }

    /// Removes and returns every queued event.
    ///
    /// The lock is released before the returned events are processed.
    pub fn drain(&self) -> Vec<T> {
        let mut guard = self.events.lock();
        guard.drain(..).collect()
    }

    /// True when no events are queued.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        EventQueue::new()
    }
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        EventQueue {
            events: self.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_post_and_drain_in_order() {
        let queue = EventQueue::new();
        queue.post(1);
        queue.post(2);
        queue.post(3);
        assert_eq!(queue.drain(), vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_single() {
        let queue = EventQueue::new();
        queue.post("done");
        assert_eq!(queue.take(), Some("done"));
        assert_eq!(queue.take(), None);
    }

    #[test]
    fn test_posts_from_io_thread() {
        let queue: EventQueue<String> = EventQueue::new();
        let producer = queue.clone();
        let worker = thread::spawn(move || {
            for i in 0..10 {
                producer.post(format!("event-{}", i));
            }
        });
        worker.join().unwrap();
        let events = queue.drain();
        assert_eq!(events.len(), 10);
        assert_eq!(events[0], "event-0");
        assert_eq!(events[9], "event-9");
    }
}
