//! Call frames, try-data and the per-invocation execution state.

use std::rc::Rc;

use core_types::{Chunk, Environment, Value};

/// How the current function was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// An ordinary call; RETURN passes the popped value through
    Normal,
    /// A `new` construction; RETURN yields the constructed `this`
    New,
}

/// The unwinder record pushed by TRY and popped by ENDTRY.
#[derive(Debug, Clone)]
pub struct TryData {
    /// Environment depth when the TRY executed
    pub env_depth: usize,
    /// Operand-stack size when the TRY executed
    pub stack_size: usize,
    /// Absolute offset of the handler
    pub catch_target: usize,
}

/// A suspended caller, restored on RETURN.
pub struct CallFrame {
    /// The caller's bytecode
    pub chunk: Rc<Chunk>,
    /// The caller's saved instruction pointer
    pub ip: usize,
    /// The caller's environment
    pub env: Rc<Environment>,
    /// The caller's try-data stack
    pub try_stack: Vec<TryData>,
    /// How the caller itself was entered
    pub call_kind: CallKind,
    /// The caller's `this`
    pub this: Value,
}

/// One top-level invocation's complete execution state.
///
/// Fibers own one of these each; suspension saves it whole and resumption
/// re-enters the dispatch loop on it.
pub struct VmState {
    /// Operand stack
    pub stack: Vec<Value>,
    /// Suspended callers, innermost last
    pub frames: Vec<CallFrame>,
    /// Active try-data for the current frame
    pub try_stack: Vec<TryData>,
    /// Bytecode of the current function
    pub chunk: Rc<Chunk>,
    /// Instruction pointer into `chunk`
    pub ip: usize,
    /// Current lexical environment
    pub env: Rc<Environment>,
    /// Current `this`
    pub this: Value,
    /// How the current function was entered
    pub call_kind: CallKind,
}

impl VmState {
    /// Creates a state positioned at the start of `chunk` in `env`.
    pub fn new(chunk: Rc<Chunk>, env: Rc<Environment>, this: Value, call_kind: CallKind) -> VmState {
        VmState {
            stack: Vec::with_capacity(64),
            frames: Vec::new(),
            try_stack: Vec::new(),
            chunk,
            ip: 0,
            env,
            this,
            call_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_starts_at_zero() {
        let state = VmState::new(
            Rc::new(Chunk::new()),
            Environment::new_global(),
            Value::Undefined,
            CallKind::Normal,
        );
        assert_eq!(state.ip, 0);
        assert!(state.stack.is_empty());
        assert!(state.frames.is_empty());
        assert!(state.try_stack.is_empty());
    }
}
