//! Runtime wrapper driving the interpreter for the CLI.

use std::path::Path;

use core_types::Value;
use interpreter::Interpreter;

use crate::error::CliResult;

/// The CLI's execution engine: an interpreter with the standard library
/// registered, draining fibers after every top-level run.
pub struct Runtime {
    interpreter: Interpreter,
}

impl Runtime {
    /// Creates a runtime.
    ///
    /// `print_disasm` lists compiled bytecode before execution;
    /// `print_trace` logs each dispatched opcode.
    pub fn new(print_disasm: bool, print_trace: bool) -> Runtime {
        let mut interpreter = Interpreter::new(print_disasm, print_trace);
        interpreter.initialize_stdlib();
        Runtime { interpreter }
    }

    /// Runs a source string and then drains pending fibers.
    pub fn execute_source(&mut self, source: &str) -> CliResult<Value> {
        let value = self.interpreter.evaluate(source)?;
        self.interpreter.run_fibers();
        Ok(value)
    }

    /// Runs a source or bytecode file and then drains pending fibers.
    pub fn execute_file(&mut self, path: impl AsRef<Path>) -> CliResult<Value> {
        let value = self.interpreter.evaluate_file(path)?;
        self.interpreter.run_fibers();
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_source() {
        let mut runtime = Runtime::new(false, false);
        assert_eq!(
            runtime.execute_source("1 + 2;").unwrap(),
            Value::Integer(3)
        );
    }

    #[test]
    fn test_state_persists_between_runs() {
        let mut runtime = Runtime::new(false, false);
        runtime.execute_source("var x = 40;").unwrap();
        assert_eq!(
            runtime.execute_source("x + 2;").unwrap(),
            Value::Integer(42)
        );
    }

    #[test]
    fn test_timers_drain_after_run() {
        let mut runtime = Runtime::new(false, false);
        runtime
            .execute_source("var done = false; setTimeout(function() { done = true; }, 0);")
            .unwrap();
        assert_eq!(
            runtime.execute_source("done;").unwrap(),
            Value::Boolean(true)
        );
    }
}
