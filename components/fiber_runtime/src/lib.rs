//! Cooperative fiber runtime.
//!
//! This crate provides the fiber scheduler used for timers, generators and
//! asynchronous completions, and the mutex-guarded event queue that
//! bridges host I/O threads to the VM thread.

pub mod event_queue;
pub mod scheduler;

pub use event_queue::EventQueue;
pub use scheduler::{Fiber, FiberBody, FiberHandle, FiberScheduler, FiberStep};
