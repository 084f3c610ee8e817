//! The embedding facade.
//!
//! Hosts create an [`Interpreter`], initialize the standard library,
//! evaluate source strings or files (source or compiled bytecode), add
//! globals, and drain pending fibers.

use std::io;
use std::path::Path;
use std::rc::Rc;

use bytecode_system::{disassemble_program, Program, BINARY_MARKER};
use core_types::{Environment, MudError, Value};
use fiber_runtime::FiberHandle;

use crate::stdlib;
use crate::vm::VirtualMachine;

/// A Mudscript interpreter instance.
///
/// All state (globals, prototype caches, fibers) is per-instance; two
/// interpreters in one process are fully isolated.
pub struct Interpreter {
    vm: VirtualMachine,
    print_disasm: bool,
}

impl Interpreter {
    /// Creates an interpreter.
    ///
    /// `print_disasm` lists every compiled program before execution;
    /// `print_vm_trace` logs each dispatched opcode.
    pub fn new(print_disasm: bool, print_vm_trace: bool) -> Interpreter {
        let mut vm = VirtualMachine::new();
        vm.set_trace(print_vm_trace);
        Interpreter { vm, print_disasm }
    }

    /// Registers all standard globals (console, Object, Array, Math,
    /// JSON, RegExp, Date, Map, Error family, System, Generator, the
    /// free functions, and the timer functions).
    pub fn initialize_stdlib(&mut self) {
        stdlib::initialize_stdlib(&mut self.vm);
    }

    /// Compiles and runs a source string in a fresh top-level scope
    /// under the shared global environment; returns the last
    /// expression's value.
    pub fn evaluate(&mut self, source: &str) -> Result<Value, MudError> {
        let program = parser::compile(source)?;
        self.run_program(&program)
    }

    /// Runs an already-compiled program.
    pub fn run_program(&mut self, program: &Program) -> Result<Value, MudError> {
        if self.print_disasm {
            print!("{}", disassemble_program(program));
        }
        Ok(self.vm.run_program(program)?)
    }

    /// Runs a file: compiled bytecode when it carries the binary marker,
    /// otherwise source text.
    pub fn evaluate_file(&mut self, path: impl AsRef<Path>) -> Result<Value, MudError> {
        let bytes = std::fs::read(path)?;
        if bytes.first() == Some(&BINARY_MARKER) {
            let program = Program::from_bytes(&bytes)
                .map_err(|e| MudError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
            return self.run_program(&program);
        }
        let source = String::from_utf8(bytes)
            .map_err(|e| MudError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        self.evaluate(&source)
    }

    /// Sets a global binding, bypassing declaration and const rules.
    pub fn force_set_global(&mut self, name: &str, value: Value, is_const: bool) {
        self.vm.globals().force_set(name, value, is_const);
    }

    /// The shared global environment.
    pub fn globals(&self) -> Rc<Environment> {
        self.vm.globals()
    }

    /// Calls a script or native function value from the host.
    pub fn call_function(
        &mut self,
        func: &Value,
        this: &Value,
        args: &[Value],
    ) -> Result<Value, MudError> {
        Ok(self.vm.call_function(func, this, args)?)
    }

    /// Enqueues a fiber that calls `func` when scheduled.
    pub fn add_fiber(
        &mut self,
        name: impl Into<String>,
        func: Value,
        this: Value,
        args: Vec<Value>,
    ) -> FiberHandle {
        self.vm.add_fiber(name, func, this, args)
    }

    /// Cancels a fiber; true iff it was still pending.
    pub fn remove_fiber(&mut self, handle: &FiberHandle) -> bool {
        self.vm.remove_fiber(handle)
    }

    /// Drains pending fibers until the queue is empty.
    pub fn run_fibers(&mut self) {
        self.vm.run_fibers();
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new(false, false)
    }
}
