//! Scheduler contract tests: ordering and cancellation guarantees.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use core_types::Value;
use fiber_runtime::{FiberBody, FiberScheduler, FiberStep};

/// Records each resume in a shared log, yielding a fixed number of times.
struct Logger {
    tag: &'static str,
    yields: usize,
    log: Rc<RefCell<Vec<String>>>,
}

impl FiberBody for Logger {
    fn resume(&mut self, _host: &mut dyn Any) -> FiberStep {
        self.log.borrow_mut().push(format!("{}", self.tag));
        if self.yields > 0 {
            self.yields -= 1;
            FiberStep::Yielded
        } else {
            FiberStep::Done(Value::Undefined)
        }
    }
}

fn drain(scheduler: &mut FiberScheduler) {
    let mut host = ();
    while let Some(mut fiber) = scheduler.pop_runnable() {
        match fiber.step(&mut host) {
            FiberStep::Yielded => scheduler.requeue(fiber),
            FiberStep::Done(_) => {}
            FiberStep::Failed(e) => panic!("fiber failed: {}", e),
        }
    }
}

#[test]
fn scheduling_order_is_fifo_with_requeue_at_tail() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut scheduler = FiberScheduler::new();
    scheduler.add_fiber(
        "a",
        Box::new(Logger {
            tag: "a",
            yields: 1,
            log: log.clone(),
        }),
    );
    scheduler.add_fiber(
        "b",
        Box::new(Logger {
            tag: "b",
            yields: 0,
            log: log.clone(),
        }),
    );
    drain(&mut scheduler);
    assert_eq!(*log.borrow(), vec!["a", "b", "a"]);
}

#[test]
fn fibers_registered_during_execution_run_in_the_same_drain() {
    /// Spawns a child fiber on its first resume.
    struct Spawner {
        log: Rc<RefCell<Vec<String>>>,
        spawned: bool,
    }

    impl FiberBody for Spawner {
        fn resume(&mut self, host: &mut dyn Any) -> FiberStep {
            self.log.borrow_mut().push("parent".to_string());
            if !self.spawned {
                self.spawned = true;
                // The host in this test is the scheduler itself
                let scheduler = host.downcast_mut::<FiberScheduler>().unwrap();
                scheduler.add_fiber(
                    "child",
                    Box::new(Logger {
                        tag: "child",
                        yields: 0,
                        log: self.log.clone(),
                    }),
                );
            }
            FiberStep::Done(Value::Undefined)
        }
    }

    let log = Rc::new(RefCell::new(Vec::new()));
    let mut outer = FiberScheduler::new();
    outer.add_fiber(
        "parent",
        Box::new(Spawner {
            log: log.clone(),
            spawned: false,
        }),
    );

    // Drive manually, letting bodies enqueue into a second scheduler that
    // plays the role of the VM-owned queue.
    let mut host = FiberScheduler::new();
    while let Some(mut fiber) = outer.pop_runnable() {
        match fiber.step(&mut host) {
            FiberStep::Yielded => outer.requeue(fiber),
            _ => {}
        }
        while let Some(mut child) = host.pop_runnable() {
            match child.step(&mut ()) {
                FiberStep::Yielded => host.requeue(child),
                _ => {}
            }
        }
    }
    assert_eq!(*log.borrow(), vec!["parent", "child"]);
}

#[test]
fn cancelled_pending_fiber_never_runs() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut scheduler = FiberScheduler::new();
    let handle = scheduler.add_fiber(
        "doomed",
        Box::new(Logger {
            tag: "doomed",
            yields: 0,
            log: log.clone(),
        }),
    );
    assert!(scheduler.remove_fiber(&handle));
    drain(&mut scheduler);
    assert!(log.borrow().is_empty());
}
