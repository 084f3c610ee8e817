//! The Mudscript virtual machine and embedding facade.
//!
//! The compiler (in the parser crate) produces bytecode programs; this
//! crate executes them: opcode dispatch, lexical environments, the
//! try-data exception unwinder, prototype member access, cooperative
//! fibers, generators, and the standard-library wiring.

pub mod call_frame;
pub mod generator;
pub mod interpreter;
pub mod ops;
pub mod stdlib;
pub mod vm;

pub use call_frame::{CallFrame, CallKind, TryData, VmState};
pub use interpreter::Interpreter;
pub use vm::{MethodSuites, RunOutcome, VirtualMachine, VmFiber};
