//! Cooperative fiber scheduling.
//!
//! A fiber is an independent control flow with its own call stack,
//! suspended only at explicit yield points. The scheduler is a FIFO queue
//! of named fibers; the host drains it between top-level invocations.
//! Fibers never preempt each other, and a fiber may enqueue further fibers
//! while it runs.

use std::any::Any;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use core_types::{RuntimeError, Value};

/// Shared status flags of one fiber.
#[derive(Debug, Default)]
struct FiberFlags {
    cancelled: Cell<bool>,
    started: Cell<bool>,
    finished: Cell<bool>,
}

/// A handle to a scheduled fiber.
///
/// Handles are cheap to clone and compare by identity. Cancellation
/// through a handle is definitive only while the fiber is still pending;
/// once the fiber has started, the flag is advisory and the fiber is
/// expected to observe it at its next yield.
#[derive(Debug, Clone, Default)]
pub struct FiberHandle(Rc<FiberFlags>);

impl FiberHandle {
    fn new() -> FiberHandle {
        FiberHandle(Rc::new(FiberFlags::default()))
    }

    /// Marks the fiber cancelled.
    pub fn cancel(&self) {
        self.0.cancelled.set(true);
    }

    /// True once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.get()
    }

    /// True once the fiber has run at least once.
    pub fn is_started(&self) -> bool {
        self.0.started.get()
    }

    /// True once the fiber has completed or failed.
    pub fn is_finished(&self) -> bool {
        self.0.finished.get()
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &FiberHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// The outcome of resuming a fiber.
pub enum FiberStep {
    /// The fiber ran to completion with this value
    Done(Value),
    /// The fiber suspended at a yield point
    Yielded,
    /// The fiber raised an uncaught exception
    Failed(RuntimeError),
}

/// One resumable unit of fiber work.
///
/// The host passed to `resume` is the virtual machine, type-erased so this
/// crate stays independent of the interpreter.
pub trait FiberBody {
    /// Runs the fiber until it yields, finishes, or fails.
    fn resume(&mut self, host: &mut dyn Any) -> FiberStep;
}

/// A scheduled fiber: a name tag, its handle, and its body.
pub struct Fiber {
    /// Host-chosen tag, used by the stdlib to find related fibers
    pub name: String,
    /// The fiber's shared handle
    pub handle: FiberHandle,
    /// The resumable work
    pub body: Box<dyn FiberBody>,
}

impl Fiber {
    /// Resumes this fiber, maintaining its handle flags.
    pub fn step(&mut self, host: &mut dyn Any) -> FiberStep {
        self.handle.0.started.set(true);
        let step = self.body.resume(host);
        if !matches!(step, FiberStep::Yielded) {
            self.handle.0.finished.set(true);
        }
        step
    }
}

/// FIFO scheduler for cooperative fibers.
#[derive(Default)]
pub struct FiberScheduler {
    queue: VecDeque<Fiber>,
}

impl FiberScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> FiberScheduler {
        FiberScheduler {
            queue: VecDeque::new(),
        }
    }

    /// Enqueues a fiber at the tail and returns its handle.
    pub fn add_fiber(&mut self, name: impl Into<String>, body: Box<dyn FiberBody>) -> FiberHandle {
        let handle = FiberHandle::new();
        self.queue.push_back(Fiber {
            name: name.into(),
            handle: handle.clone(),
            body,
        });
        handle
    }

    /// Enqueues a fiber at the head and returns its handle.
    pub fn add_fiber_first(
        &mut self,
        name: impl Into<String>,
        body: Box<dyn FiberBody>,
    ) -> FiberHandle {
        let handle = FiberHandle::new();
        self.queue.push_front(Fiber {
            name: name.into(),
            handle: handle.clone(),
            body,
        });
        handle
    }

    /// Cancels a fiber.
    ///
    /// Returns true iff the fiber was still pending (never started) and
    /// has been removed from the queue with no side effects. A fiber that
    /// has already started only gets its advisory cancelled flag set.
    pub fn remove_fiber(&mut self, handle: &FiberHandle) -> bool {
        handle.cancel();
        if handle.is_started() {
            return false;
        }
        let before = self.queue.len();
        self.queue.retain(|fiber| !fiber.handle.same_as(handle));
        self.queue.len() != before
    }

    /// Takes the next runnable fiber off the queue, dropping cancelled
    /// pending fibers along the way.
    pub fn pop_runnable(&mut self) -> Option<Fiber> {
        while let Some(fiber) = self.queue.pop_front() {
            if fiber.handle.is_cancelled() && !fiber.handle.is_started() {
                continue;
            }
            return Some(fiber);
        }
        None
    }

    /// Puts a yielded fiber back at the tail.
    pub fn requeue(&mut self, fiber: Fiber) {
        self.queue.push_back(fiber);
    }

    /// Number of queued fibers.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// True when no fibers are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
