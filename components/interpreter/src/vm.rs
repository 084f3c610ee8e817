//! The virtual machine: opcode dispatch, call stack, exception
//! unwinding, member access, iterator adaptors and fiber execution.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use bytecode_system::{disasm, ConstTable, DebugMap, OpCode, Program};
use core_types::{
    chain_has_constructor, find_getter, find_setter, lookup_field, Environment, Function,
    FunctionKind, NativeContext, NativeError, NativeResult, Object, ObjectRef, RuntimeError,
    TracebackEntry, Value,
};
use fiber_runtime::{FiberBody, FiberHandle, FiberScheduler, FiberStep};

use crate::call_frame::{CallFrame, CallKind, TryData, VmState};
use crate::generator;
use crate::ops;

/// Per-interpreter method tables consulted for member access on
/// primitive receivers, plus the shared prototypes. Never process-global:
/// two interpreters in one process are fully isolated.
pub struct MethodSuites {
    /// Array receiver methods
    pub array: HashMap<&'static str, Rc<Function>>,
    /// String receiver methods
    pub string: HashMap<&'static str, Rc<Function>>,
    /// Function receiver methods (call/apply/bind)
    pub function: HashMap<&'static str, Rc<Function>>,
    /// Fallback prototype consulted for every object receiver
    pub object_prototype: ObjectRef,
    /// Prototype of generator objects
    pub generator_prototype: ObjectRef,
}

impl MethodSuites {
    fn new() -> MethodSuites {
        MethodSuites {
            array: HashMap::new(),
            string: HashMap::new(),
            function: HashMap::new(),
            object_prototype: Object::new_ref(),
            generator_prototype: Object::new_ref(),
        }
    }
}

/// The in-flight exception, stashed between the unwinder and LOADEXC.
pub(crate) struct PendingException {
    pub message: String,
    pub value: Value,
    pub traceback: Vec<TracebackEntry>,
}

/// Result of driving one execution state.
pub enum RunOutcome {
    /// The invocation ran to completion
    Completed(Value),
    /// A fiber suspension request unwound out of the dispatch loop
    Suspended,
}

enum CallStep {
    Done,
    Suspended,
}

/// The Mudscript virtual machine.
pub struct VirtualMachine {
    globals: Rc<Environment>,
    consts: Rc<ConstTable>,
    debug: Option<Rc<DebugMap>>,
    exception: Option<PendingException>,
    suspend_requested: bool,
    trace: bool,
    pub(crate) scheduler: FiberScheduler,
    pub(crate) suites: MethodSuites,
}

impl VirtualMachine {
    /// Creates a VM with an empty global environment.
    pub fn new() -> VirtualMachine {
        VirtualMachine {
            globals: Environment::new_global(),
            consts: Rc::new(ConstTable::new()),
            debug: None,
            exception: None,
            suspend_requested: false,
            trace: false,
            scheduler: FiberScheduler::new(),
            suites: MethodSuites::new(),
        }
    }

    /// Enables or disables the per-opcode trace.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// The shared global environment.
    pub fn globals(&self) -> Rc<Environment> {
        self.globals.clone()
    }

    /// Runs a program's main function in a fresh top-level scope and
    /// returns its result.
    pub fn run_program(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        self.consts = program.constants.clone();
        self.debug = program.debug.clone().map(Rc::new);
        let mut state =
            self.setup_script_state(&program.main, Value::Undefined, &[], CallKind::Normal)?;
        match self.run_state(&mut state, false)? {
            RunOutcome::Completed(v) => Ok(v),
            RunOutcome::Suspended => Err(RuntimeError::new(
                "vm internal error: top-level invocation suspended",
            )),
        }
    }

    /// Calls a function value to completion on the current thread.
    ///
    /// This is the reentrant entry used by native functions, getters and
    /// setters, `call`/`apply` and the fiber drain loop. The call runs
    /// with a fresh try-data stack; suspension is not possible here.
    pub fn call_function(
        &mut self,
        func: &Value,
        this: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let Value::Function(f) = func else {
            return Err(RuntimeError::new(format!(
                "cannot call value of type {}",
                func.type_of()
            )));
        };
        match f.kind() {
            FunctionKind::Script(_) if f.is_generator() => {
                generator::make_generator(self, f, this.clone(), args.to_vec())
            }
            FunctionKind::Script(_) => {
                let mut state =
                    self.setup_script_state(f, this.clone(), args, CallKind::Normal)?;
                match self.run_state(&mut state, false)? {
                    RunOutcome::Completed(v) => Ok(v),
                    RunOutcome::Suspended => Err(RuntimeError::new(
                        "vm internal error: reentrant invocation suspended",
                    )),
                }
            }
            FunctionKind::Native(nf) => {
                let nf = *nf;
                let result = nf(self, this, args);
                self.finish_reentrant_native(result)
            }
            FunctionKind::NativeDelegate(d) => {
                let d = d.clone();
                let result = d(self, this, args);
                self.finish_reentrant_native(result)
            }
        }
    }

    fn finish_reentrant_native(&mut self, result: NativeResult) -> Result<Value, RuntimeError> {
        if self.suspend_requested {
            self.suspend_requested = false;
            return Err(RuntimeError::new("cannot suspend outside of a fiber"));
        }
        result.map_err(native_to_runtime)
    }

    // ---- fibers ----

    /// Enqueues a fiber that will call `func` when first scheduled.
    pub fn add_fiber(
        &mut self,
        name: impl Into<String>,
        func: Value,
        this: Value,
        args: Vec<Value>,
    ) -> FiberHandle {
        self.scheduler
            .add_fiber(name, Box::new(VmFiber::call(func, this, args)))
    }

    /// Enqueues a fiber at the head of the queue.
    pub fn add_fiber_first(
        &mut self,
        name: impl Into<String>,
        func: Value,
        this: Value,
        args: Vec<Value>,
    ) -> FiberHandle {
        self.scheduler
            .add_fiber_first(name, Box::new(VmFiber::call(func, this, args)))
    }

    /// Cancels a fiber; true iff it was still pending.
    pub fn remove_fiber(&mut self, handle: &FiberHandle) -> bool {
        self.scheduler.remove_fiber(handle)
    }

    /// Drains the fiber queue in FIFO order until it is empty.
    ///
    /// Yielded fibers requeue at the tail; a timer fiber therefore spins
    /// through the queue until its deadline passes. Uncaught fiber
    /// exceptions are reported and do not stop the drain.
    pub fn run_fibers(&mut self) {
        while let Some(mut fiber) = self.scheduler.pop_runnable() {
            match fiber.step(self) {
                FiberStep::Yielded => self.scheduler.requeue(fiber),
                FiberStep::Done(_) => {}
                FiberStep::Failed(e) => {
                    eprintln!("uncaught exception in fiber '{}': {}", fiber.name, e);
                }
            }
        }
    }

    // ---- call setup ----

    /// Builds the execution state for a script-function call: a fresh
    /// scope under the captured closure, parameters bound positionally.
    pub(crate) fn setup_script_state(
        &mut self,
        func: &Rc<Function>,
        this: Value,
        args: &[Value],
        call_kind: CallKind,
    ) -> Result<VmState, RuntimeError> {
        let FunctionKind::Script(script) = func.kind() else {
            return Err(RuntimeError::new("vm internal error: not a script function"));
        };
        if script.chunk.code.is_empty() {
            return Err(RuntimeError::new("empty script function invocation"));
        }
        let parent = script
            .closure
            .borrow()
            .clone()
            .unwrap_or_else(|| self.globals.clone());
        let env = Environment::child(&parent);
        for (i, name) in script.arg_names.iter().enumerate() {
            env.force_set(name, args.get(i).cloned().unwrap_or(Value::Undefined), false);
        }
        let this = func.bound_this().unwrap_or(this);
        Ok(VmState::new(script.chunk.clone(), env, this, call_kind))
    }

    // ---- the dispatch loop ----

    /// Drives `state` until HALT, top-level return, an uncaught
    /// exception, or (when `suspendable`) a fiber suspension.
    pub(crate) fn run_state(
        &mut self,
        state: &mut VmState,
        suspendable: bool,
    ) -> Result<RunOutcome, RuntimeError> {
        loop {
            if state.ip >= state.chunk.code.len() {
                return Ok(RunOutcome::Completed(
                    state.stack.pop().unwrap_or(Value::Undefined),
                ));
            }
            let op_offset = state.ip;
            if self.trace {
                if let Ok((text, _)) =
                    disasm::decode_instruction(&state.chunk.code, op_offset, &self.consts)
                {
                    eprintln!("[vm] {:04x}  {}", op_offset, text);
                }
            }
            let byte = state.chunk.code[state.ip];
            state.ip += 1;
            let Ok(op) = OpCode::try_from(byte) else {
                return Err(RuntimeError::new(format!(
                    "vm internal error: bad opcode 0x{:02x} at offset {}",
                    byte, op_offset
                )));
            };

            match op {
                OpCode::Nop => {}
                OpCode::Const => {
                    let idx = read_u32(state)? as usize;
                    let Some(value) = self.consts.get(idx).cloned() else {
                        return Err(RuntimeError::new(format!(
                            "vm internal error: bad constant index {}",
                            idx
                        )));
                    };
                    // Script-function constants are templates; loading one
                    // captures the current environment
                    let value = match &value {
                        Value::Function(f) if matches!(f.kind(), FunctionKind::Script(_)) => {
                            Value::Function(f.bind_environment(state.env.clone()))
                        }
                        _ => value,
                    };
                    state.stack.push(value);
                }
                OpCode::Const0 => state.stack.push(Value::Integer(0)),
                OpCode::Const1 => state.stack.push(Value::Integer(1)),
                OpCode::ConstN1 => state.stack.push(Value::Integer(-1)),
                OpCode::Push => {
                    let index = read_i32(state)?;
                    let slot = if index < 0 {
                        state.stack.len() as i64 + index as i64
                    } else {
                        index as i64
                    };
                    let Some(value) = usize::try_from(slot)
                        .ok()
                        .and_then(|i| state.stack.get(i).cloned())
                    else {
                        return Err(RuntimeError::new(
                            "vm internal error: PUSH index out of range",
                        ));
                    };
                    state.stack.push(value);
                }
                OpCode::Pop => {
                    pop(state)?;
                }
                OpCode::PopN => {
                    let n = read_u32(state)? as usize;
                    if state.stack.len() < n {
                        return Err(RuntimeError::new(
                            "vm internal error: operand stack underflow",
                        ));
                    }
                    let new_len = state.stack.len() - n;
                    state.stack.truncate(new_len);
                }
                OpCode::Set => {
                    let slot = read_u32(state)? as usize;
                    let Some(top) = state.stack.last().cloned() else {
                        return Err(RuntimeError::new(
                            "vm internal error: operand stack underflow",
                        ));
                    };
                    let Some(target) = state.stack.get_mut(slot) else {
                        return Err(RuntimeError::new(
                            "vm internal error: SET index out of range",
                        ));
                    };
                    *target = top;
                }
                OpCode::Stack => {
                    let n = read_u32(state)? as usize;
                    state.stack.extend(std::iter::repeat(Value::Undefined).take(n));
                }
                OpCode::Stack1 => state.stack.push(Value::Undefined),
                OpCode::Array => {
                    let n = read_u32(state)? as usize;
                    let elements = split_args(state, n)?;
                    state.stack.push(Value::array(elements));
                }
                OpCode::Object => {
                    let n = read_u32(state)? as usize;
                    let mut pairs = split_args(state, n * 2)?;
                    let obj = Object::new_ref();
                    {
                        let mut obj = obj.borrow_mut();
                        obj.prototype = Some(self.suites.object_prototype.clone());
                        while pairs.len() >= 2 {
                            let key = pairs.remove(0).to_string();
                            let value = pairs.remove(0);
                            obj.set_field(key, value);
                        }
                    }
                    state.stack.push(Value::Object(obj));
                }
                OpCode::Class => {
                    self.build_class(state)?;
                }
                OpCode::Iter => {
                    let iterable = pop(state)?;
                    match self.make_iterator(&iterable) {
                        Ok(next_fn) => state.stack.push(next_fn),
                        Err(e) => self.raise_runtime(state, e)?,
                    }
                }
                OpCode::Del => {
                    let key = pop(state)?;
                    let receiver = pop(state)?;
                    let name = key.to_string();
                    match &receiver {
                        Value::Object(obj) => {
                            let removed = obj.borrow_mut().delete_field(&name);
                            state.stack.push(Value::Boolean(removed));
                        }
                        Value::Function(f) => {
                            state.stack.push(Value::Boolean(f.delete_field(&name)));
                        }
                        other => {
                            let message =
                                format!("cannot delete member of {}", other.type_of());
                            self.raise(state, message)?;
                        }
                    }
                }
                OpCode::TypeOf => {
                    let value = pop(state)?;
                    state.stack.push(Value::string(value.type_of()));
                }
                OpCode::InstanceOf => {
                    let ctor = pop(state)?;
                    let value = pop(state)?;
                    match &ctor {
                        Value::Function(f) => {
                            let result = match &value {
                                Value::Object(obj) => chain_has_constructor(obj, f),
                                _ => false,
                            };
                            state.stack.push(Value::Boolean(result));
                        }
                        _ => {
                            self.raise(
                                state,
                                "right operand of instanceof must be a function",
                            )?;
                        }
                    }
                }
                OpCode::Call => {
                    let n = read_u32(state)? as usize;
                    let args = split_args(state, n)?;
                    let func = pop(state)?;
                    let this = pop(state)?;
                    match self.perform_call(
                        state,
                        func,
                        this,
                        args,
                        CallKind::Normal,
                        suspendable,
                        op_offset,
                    )? {
                        CallStep::Done => {}
                        CallStep::Suspended => return Ok(RunOutcome::Suspended),
                    }
                }
                OpCode::New => {
                    let n = read_u32(state)? as usize;
                    let args = split_args(state, n)?;
                    let func = pop(state)?;
                    let Value::Function(f) = &func else {
                        let message =
                            format!("cannot construct value of type {}", func.type_of());
                        self.raise(state, message)?;
                        continue;
                    };
                    let obj = Object::new_ref();
                    obj.borrow_mut().prototype = f.prototype_object();
                    let this = Value::Object(obj);
                    match self.perform_call(
                        state,
                        func.clone(),
                        this,
                        args,
                        CallKind::New,
                        suspendable,
                        op_offset,
                    )? {
                        CallStep::Done => {}
                        CallStep::Suspended => return Ok(RunOutcome::Suspended),
                    }
                }
                OpCode::Return => {
                    let mut ret = pop(state)?;
                    if state.call_kind == CallKind::New {
                        ret = state.this.clone();
                    }
                    match state.frames.pop() {
                        Some(frame) => {
                            restore_frame(state, frame);
                            state.stack.push(ret);
                        }
                        None => return Ok(RunOutcome::Completed(ret)),
                    }
                }
                OpCode::This => state.stack.push(state.this.clone()),
                OpCode::OpenScope => {
                    state.env = Environment::child(&state.env);
                }
                OpCode::CloseScope => {
                    let Some(parent) = state.env.parent() else {
                        return Err(RuntimeError::new(
                            "vm internal error: closed the global scope",
                        ));
                    };
                    state.env = parent;
                }
                OpCode::DeclVar => {
                    let name = self.const_name(state)?;
                    let value = pop(state)?;
                    // `var` always targets the global environment
                    if let Err(e) = self.globals.declare(&name, value, false) {
                        self.raise(state, e.to_string())?;
                    }
                }
                OpCode::DeclLet => {
                    let name = self.const_name(state)?;
                    let value = pop(state)?;
                    if let Err(e) = state.env.declare(&name, value, false) {
                        self.raise(state, e.to_string())?;
                    }
                }
                OpCode::DeclConst => {
                    let name = self.const_name(state)?;
                    let value = pop(state)?;
                    if let Err(e) = state.env.declare(&name, value, true) {
                        self.raise(state, e.to_string())?;
                    }
                }
                OpCode::GetVar => {
                    let name = self.const_name(state)?;
                    match state.env.lookup(&name) {
                        Some(value) => state.stack.push(value),
                        None => {
                            let message = format!("variable '{}' is not declared", name);
                            self.raise(state, message)?;
                        }
                    }
                }
                OpCode::SetVar => {
                    let name = self.const_name(state)?;
                    let value = pop(state)?;
                    if let Err(e) = state.env.assign(&name, value) {
                        self.raise(state, e.to_string())?;
                    }
                }
                OpCode::ObjGet => {
                    let key = pop(state)?;
                    let receiver = pop(state)?;
                    match self.member_get(&receiver, &key) {
                        Ok(value) => state.stack.push(value),
                        Err(e) => self.raise_runtime(state, e)?,
                    }
                }
                OpCode::ObjSet => {
                    let value = pop(state)?;
                    let key = pop(state)?;
                    let receiver = pop(state)?;
                    match self.member_set(&receiver, &key, value) {
                        Ok(observable) => state.stack.push(observable),
                        Err(e) => self.raise_runtime(state, e)?,
                    }
                }
                OpCode::Jmp => {
                    let rel = read_i32(state)?;
                    jump_relative(state, rel)?;
                }
                OpCode::JmpFalse => {
                    let rel = read_i32(state)?;
                    let cond = pop(state)?;
                    if !cond.is_truthy() {
                        jump_relative(state, rel)?;
                    }
                }
                OpCode::Switch => {
                    let default = read_u32(state)? as usize;
                    let table = pop(state)?;
                    let scrutinee = pop(state)?;
                    match switch_target(&table, &scrutinee, default) {
                        Ok(target) => state.ip = target,
                        Err(message) => self.raise(state, message)?,
                    }
                }
                OpCode::Goto => {
                    let target = read_u32(state)? as usize;
                    let scopes = read_u8(state)?;
                    for _ in 0..scopes {
                        let Some(parent) = state.env.parent() else {
                            return Err(RuntimeError::new(
                                "vm internal error: GOTO closed the global scope",
                            ));
                        };
                        state.env = parent;
                    }
                    state.ip = target;
                }
                OpCode::Try => {
                    let catch_target = read_u32(state)? as usize;
                    state.try_stack.push(TryData {
                        env_depth: state.env.depth(),
                        stack_size: state.stack.len(),
                        catch_target,
                    });
                }
                OpCode::EndTry => {
                    if state.try_stack.pop().is_none() {
                        return Err(RuntimeError::new(
                            "vm internal error: ENDTRY without TRY",
                        ));
                    }
                }
                OpCode::Throw => {
                    let value = pop(state)?;
                    let message = value.to_string();
                    self.raise_value(state, message, value)?;
                }
                OpCode::Rethrow => {
                    if let Some(pending) = self.exception.take() {
                        self.unwind(state, pending)?;
                    }
                }
                OpCode::LoadExc => {
                    let value = match self.exception.take() {
                        Some(pending) => pending.value,
                        None => Value::Undefined,
                    };
                    state.stack.push(value);
                }
                OpCode::Concat => {
                    let n = read_u32(state)? as usize;
                    let parts = split_args(state, n)?;
                    let mut out = String::new();
                    for part in &parts {
                        out.push_str(&part.to_string());
                    }
                    state.stack.push(Value::string(out));
                }
                OpCode::BitNot => {
                    let a = pop(state)?;
                    state.stack.push(ops::bit_not(&a));
                }
                OpCode::Not => {
                    let a = pop(state)?;
                    state.stack.push(Value::Boolean(!a.is_truthy()));
                }
                OpCode::Negate => {
                    let a = pop(state)?;
                    state.stack.push(ops::negate(&a));
                }
                OpCode::Pow => binary_op(state, ops::pow)?,
                OpCode::Mul => binary_op(state, ops::mul)?,
                OpCode::Div => binary_op(state, ops::div)?,
                OpCode::Mod => binary_op(state, ops::rem)?,
                OpCode::Add => binary_op(state, ops::add)?,
                OpCode::Sub => binary_op(state, ops::sub)?,
                OpCode::BitLsh => binary_op(state, ops::shl)?,
                OpCode::BitRsh => binary_op(state, ops::shr)?,
                OpCode::BitURsh => binary_op(state, ops::ushr)?,
                OpCode::Lt => comparison_op(state, |o| o == std::cmp::Ordering::Less)?,
                OpCode::Le => comparison_op(state, |o| o != std::cmp::Ordering::Greater)?,
                OpCode::Gt => comparison_op(state, |o| o == std::cmp::Ordering::Greater)?,
                OpCode::Ge => comparison_op(state, |o| o != std::cmp::Ordering::Less)?,
                OpCode::Equals => {
                    let b = pop(state)?;
                    let a = pop(state)?;
                    state.stack.push(Value::Boolean(a.loose_equals(&b)));
                }
                OpCode::NEquals => {
                    let b = pop(state)?;
                    let a = pop(state)?;
                    state.stack.push(Value::Boolean(!a.loose_equals(&b)));
                }
                OpCode::StrEquals => {
                    let b = pop(state)?;
                    let a = pop(state)?;
                    state.stack.push(Value::Boolean(a.strict_equals(&b)));
                }
                OpCode::BitAnd => binary_op(state, ops::bit_and)?,
                OpCode::BitOr => binary_op(state, ops::bit_or)?,
                OpCode::BitXor => binary_op(state, ops::bit_xor)?,
                OpCode::And => {
                    let b = pop(state)?;
                    let a = pop(state)?;
                    state
                        .stack
                        .push(Value::Boolean(a.is_truthy() && b.is_truthy()));
                }
                OpCode::Or => {
                    let b = pop(state)?;
                    let a = pop(state)?;
                    state
                        .stack
                        .push(Value::Boolean(a.is_truthy() || b.is_truthy()));
                }
                OpCode::Tern => {
                    let if_false = pop(state)?;
                    let if_true = pop(state)?;
                    let cond = pop(state)?;
                    state
                        .stack
                        .push(if cond.is_truthy() { if_true } else { if_false });
                }
                OpCode::Halt => {
                    return Ok(RunOutcome::Completed(
                        state.stack.pop().unwrap_or(Value::Undefined),
                    ));
                }
            }
        }
    }

    fn const_name(&self, state: &mut VmState) -> Result<String, RuntimeError> {
        let idx = read_u32(state)? as usize;
        match self.consts.get(idx) {
            Some(Value::String(s)) => Ok(s.to_string()),
            _ => Err(RuntimeError::new(format!(
                "vm internal error: constant {} is not a name",
                idx
            ))),
        }
    }

    // ---- calls ----

    #[allow(clippy::too_many_arguments)]
    fn perform_call(
        &mut self,
        state: &mut VmState,
        func: Value,
        this: Value,
        args: Vec<Value>,
        kind: CallKind,
        suspendable: bool,
        op_offset: usize,
    ) -> Result<CallStep, RuntimeError> {
        let Value::Function(f) = &func else {
            let message = format!("cannot call value of type {}", func.type_of());
            self.raise(state, message)?;
            return Ok(CallStep::Done);
        };
        match f.kind() {
            FunctionKind::Script(_) if f.is_generator() => {
                match generator::make_generator(self, f, this, args) {
                    Ok(gen) => state.stack.push(gen),
                    Err(e) => self.raise_runtime(state, e)?,
                }
                Ok(CallStep::Done)
            }
            FunctionKind::Script(_) => {
                let new_state = match self.setup_script_state(f, this, &args, kind) {
                    Ok(s) => s,
                    Err(e) => {
                        self.raise_runtime(state, e)?;
                        return Ok(CallStep::Done);
                    }
                };
                state.frames.push(CallFrame {
                    chunk: state.chunk.clone(),
                    ip: state.ip,
                    env: state.env.clone(),
                    try_stack: std::mem::take(&mut state.try_stack),
                    call_kind: state.call_kind,
                    this: state.this.clone(),
                });
                state.chunk = new_state.chunk;
                state.ip = 0;
                state.env = new_state.env;
                state.this = new_state.this;
                state.call_kind = kind;
                Ok(CallStep::Done)
            }
            FunctionKind::Native(nf) => {
                let nf = *nf;
                let result = nf(self, &this, &args);
                self.finish_native_call(state, result, func.clone(), this, args, kind, suspendable, op_offset)
            }
            FunctionKind::NativeDelegate(d) => {
                let d = d.clone();
                let result = d(self, &this, &args);
                self.finish_native_call(state, result, func.clone(), this, args, kind, suspendable, op_offset)
            }
        }
    }

    /// Completes a native call: handles suspension requests (rewinding
    /// the CALL so it re-executes on resume), native errors, and the
    /// constructed-this rule for NEW.
    #[allow(clippy::too_many_arguments)]
    fn finish_native_call(
        &mut self,
        state: &mut VmState,
        result: NativeResult,
        func: Value,
        this: Value,
        args: Vec<Value>,
        kind: CallKind,
        suspendable: bool,
        op_offset: usize,
    ) -> Result<CallStep, RuntimeError> {
        if self.suspend_requested {
            self.suspend_requested = false;
            if !suspendable {
                self.raise(state, "cannot suspend outside of a fiber")?;
                return Ok(CallStep::Done);
            }
            // Leave the operands in place and rewind to the CALL; the
            // native is re-invoked with the same evaluated arguments
            if kind == CallKind::Normal {
                state.stack.push(this);
            }
            state.stack.push(func);
            state.stack.extend(args);
            state.ip = op_offset;
            return Ok(CallStep::Suspended);
        }
        match result {
            Ok(value) => {
                let value = match kind {
                    CallKind::Normal => value,
                    // A native constructor may return a replacement value
                    // (Array does); otherwise the constructed this wins
                    CallKind::New => match value {
                        Value::Undefined => this,
                        other => other,
                    },
                };
                state.stack.push(value);
                Ok(CallStep::Done)
            }
            Err(e) => {
                self.raise_native(state, e)?;
                Ok(CallStep::Done)
            }
        }
    }

    // ---- classes ----

    fn build_class(&mut self, state: &mut VmState) -> Result<(), RuntimeError> {
        let num_methods = read_u8(state)? as usize;
        let num_getters = read_u8(state)? as usize;
        let num_setters = read_u8(state)? as usize;
        let num_statics = read_u8(state)? as usize;

        let base = pop(state)?;
        let statics = pop_member_pairs(state, num_statics)?;
        let setters = pop_member_pairs(state, num_setters)?;
        let getters = pop_member_pairs(state, num_getters)?;
        let methods = pop_member_pairs(state, num_methods)?;
        let ctor_value = pop(state)?;

        let Value::Function(ctor) = &ctor_value else {
            self.raise(state, "malformed class instruction")?;
            return Ok(());
        };
        let Some(proto) = ctor.prototype_object() else {
            self.raise(state, "malformed class instruction")?;
            return Ok(());
        };

        {
            let mut proto = proto.borrow_mut();
            for (name, func) in &methods {
                proto.set_field(name.clone(), Value::Function(func.clone()));
            }
            for (name, func) in &getters {
                proto
                    .getters
                    .insert(name.clone(), Value::Function(func.clone()));
            }
            for (name, func) in &setters {
                proto
                    .setters
                    .insert(name.clone(), Value::Function(func.clone()));
            }
        }
        for (name, func) in &statics {
            ctor.set_field(name.clone(), Value::Function(func.clone()));
        }

        match &base {
            Value::Undefined => {}
            Value::Function(base_fn) => {
                let Some(base_proto) = base_fn.prototype_object() else {
                    self.raise(state, "malformed class instruction")?;
                    return Ok(());
                };
                proto.borrow_mut().prototype = Some(base_proto);
                // Give the constructor and every member access to the
                // base class through a `super` binding
                self.bind_super(ctor, &base);
                for (_, func) in methods
                    .iter()
                    .chain(getters.iter())
                    .chain(setters.iter())
                    .chain(statics.iter())
                {
                    self.bind_super(func, &base);
                }
            }
            _ => {
                self.raise(state, "class can only extend a constructor function")?;
                return Ok(());
            }
        }

        state.stack.push(ctor_value);
        Ok(())
    }

    fn bind_super(&self, func: &Rc<Function>, base: &Value) {
        if let FunctionKind::Script(script) = func.kind() {
            let parent = script
                .closure
                .borrow()
                .clone()
                .unwrap_or_else(|| self.globals.clone());
            let wrapped = Environment::child(&parent);
            wrapped.force_set("super", base.clone(), true);
            *script.closure.borrow_mut() = Some(wrapped);
        }
    }

    // ---- member access ----

    /// Reads `receiver[key]`, walking prototype chains and invoking
    /// getters, with the primitive method suites as fallback.
    pub(crate) fn member_get(
        &mut self,
        receiver: &Value,
        key: &Value,
    ) -> Result<Value, RuntimeError> {
        match receiver {
            Value::Object(obj) => {
                let name = key.to_string();
                if let Some(getter) = find_getter(obj, &name) {
                    return self.call_function(&getter, receiver, &[]);
                }
                if let Some(value) = lookup_field(obj, &name) {
                    return Ok(value);
                }
                // Shared object prototype: available on every object
                let fallback = {
                    let proto = self.suites.object_prototype.borrow();
                    proto
                        .getters
                        .get(&name)
                        .cloned()
                        .map(|g| (true, g))
                        .or_else(|| proto.fields.get(&name).cloned().map(|v| (false, v)))
                };
                match fallback {
                    Some((true, getter)) => self.call_function(&getter, receiver, &[]),
                    Some((false, value)) => Ok(value),
                    None => Ok(Value::Undefined),
                }
            }
            Value::Array(items) => {
                if let Some(index) = integer_key(key) {
                    let items = items.borrow();
                    let Some(slot) = wrap_index(index, items.len()) else {
                        return Err(RuntimeError::new(format!(
                            "array index {} out of range for length {}",
                            index,
                            items.len()
                        )));
                    };
                    return Ok(items[slot].clone());
                }
                let name = key.to_string();
                if name == "length" {
                    return Ok(Value::Integer(items.borrow().len() as i64));
                }
                Ok(self
                    .suites
                    .array
                    .get(name.as_str())
                    .map(|f| Value::Function(f.clone()))
                    .unwrap_or(Value::Undefined))
            }
            Value::String(s) => {
                if let Some(index) = integer_key(key) {
                    return match Value::string_index(s, index) {
                        Some(c) => Ok(Value::string(c)),
                        None => Err(RuntimeError::new(format!(
                            "string index {} out of range",
                            index
                        ))),
                    };
                }
                let name = key.to_string();
                if name == "length" {
                    // Byte length, per the value model
                    return Ok(Value::Integer(s.len() as i64));
                }
                Ok(self
                    .suites
                    .string
                    .get(name.as_str())
                    .map(|f| Value::Function(f.clone()))
                    .unwrap_or(Value::Undefined))
            }
            Value::Function(f) => {
                let name = key.to_string();
                if let Some(value) = f.get_field(&name) {
                    return Ok(value);
                }
                if name == "name" {
                    return Ok(Value::string(f.name()));
                }
                Ok(self
                    .suites
                    .function
                    .get(name.as_str())
                    .map(|m| Value::Function(m.clone()))
                    .unwrap_or(Value::Undefined))
            }
            other => Err(RuntimeError::new(format!(
                "cannot access members of {}",
                other.type_of()
            ))),
        }
    }

    /// Writes `receiver[key] = value`. A setter found along the chain
    /// wins; the observable result is then whatever the getter reports.
    pub(crate) fn member_set(
        &mut self,
        receiver: &Value,
        key: &Value,
        value: Value,
    ) -> Result<Value, RuntimeError> {
        match receiver {
            Value::Object(obj) => {
                let name = key.to_string();
                if let Some(setter) = find_setter(obj, &name) {
                    self.call_function(&setter, receiver, &[value])?;
                    return match find_getter(obj, &name) {
                        Some(getter) => self.call_function(&getter, receiver, &[]),
                        None => Ok(Value::Undefined),
                    };
                }
                obj.borrow_mut().set_field(name, value.clone());
                Ok(value)
            }
            Value::Array(items) => {
                let Some(index) = integer_key(key) else {
                    return Err(RuntimeError::new(format!(
                        "cannot set member '{}' of array",
                        key
                    )));
                };
                let mut items = items.borrow_mut();
                let len = items.len();
                let Some(slot) = wrap_index(index, len) else {
                    return Err(RuntimeError::new(format!(
                        "array index {} out of range for length {}",
                        index, len
                    )));
                };
                items[slot] = value.clone();
                Ok(value)
            }
            Value::Function(f) => {
                f.set_field(key.to_string(), value.clone());
                Ok(value)
            }
            other => Err(RuntimeError::new(format!(
                "cannot mutate members of {}",
                other.type_of()
            ))),
        }
    }

    // ---- iteration ----

    /// Builds the next-function for an iterable value.
    ///
    /// Strings yield code points, arrays yield elements, objects yield
    /// their own fields in insertion order. Completion reports
    /// `{done: true}`.
    pub(crate) fn make_iterator(&mut self, iterable: &Value) -> Result<Value, RuntimeError> {
        let pairs: Vec<(Value, Value)> = match iterable {
            Value::Array(items) => items
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::Integer(i as i64), v.clone()))
                .collect(),
            Value::String(s) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (Value::Integer(i as i64), Value::string(c.to_string())))
                .collect(),
            Value::Object(obj) => obj
                .borrow()
                .fields
                .iter()
                .map(|(k, v)| (Value::string(k.clone()), v.clone()))
                .collect(),
            other => {
                return Err(RuntimeError::new(format!(
                    "cannot iterate value of type {}",
                    other.type_of()
                )));
            }
        };
        Ok(iteration_next_fn(pairs))
    }

    // ---- raising and unwinding ----

    fn raise(
        &mut self,
        state: &mut VmState,
        message: impl Into<String>,
    ) -> Result<(), RuntimeError> {
        let message = message.into();
        let value = Value::string(message.clone());
        self.raise_value(state, message, value)
    }

    fn raise_runtime(&mut self, state: &mut VmState, err: RuntimeError) -> Result<(), RuntimeError> {
        self.raise_value(state, err.message, err.thrown)
    }

    fn raise_native(&mut self, state: &mut VmState, err: NativeError) -> Result<(), RuntimeError> {
        let err = native_to_runtime(err);
        self.raise_runtime(state, err)
    }

    pub(crate) fn raise_value(
        &mut self,
        state: &mut VmState,
        message: String,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let pending = PendingException {
            message,
            value,
            traceback: Vec::new(),
        };
        self.unwind(state, pending)
    }

    /// The exception unwinder.
    ///
    /// Consumes try-data from the current frame; failing that, pops call
    /// frames (appending their source line to the traceback) until a
    /// handler is found or the exception escapes to the host.
    fn unwind(
        &mut self,
        state: &mut VmState,
        mut pending: PendingException,
    ) -> Result<(), RuntimeError> {
        loop {
            if let Some(td) = state.try_stack.pop() {
                while state.env.depth() > td.env_depth {
                    let Some(parent) = state.env.parent() else {
                        return Err(RuntimeError::new(
                            "vm internal error: unwound past the global scope",
                        ));
                    };
                    state.env = parent;
                }
                state.stack.truncate(td.stack_size);
                state.ip = td.catch_target;
                self.exception = Some(pending);
                return Ok(());
            }
            pending.traceback.push(self.traceback_entry(state));
            match state.frames.pop() {
                Some(frame) => restore_frame(state, frame),
                None => {
                    let mut err = RuntimeError::with_thrown(pending.message, pending.value);
                    err.traceback = pending.traceback;
                    return Err(err);
                }
            }
        }
    }

    fn traceback_entry(&self, state: &VmState) -> TracebackEntry {
        let line = state
            .chunk
            .line_for(state.ip.saturating_sub(1))
            .unwrap_or(0);
        let source = self
            .debug
            .as_ref()
            .and_then(|d| d.line_text(line))
            .unwrap_or("")
            .to_string();
        TracebackEntry { line, source }
    }
}

impl Default for VirtualMachine {
    fn default() -> Self {
        VirtualMachine::new()
    }
}

impl NativeContext for VirtualMachine {
    fn call_value(&mut self, func: &Value, this: &Value, args: &[Value]) -> NativeResult {
        self.call_function(func, this, args)
            .map_err(|e| NativeError::Thrown(e.thrown))
    }

    fn globals(&self) -> Rc<Environment> {
        self.globals.clone()
    }

    fn request_suspend(&mut self) {
        self.suspend_requested = true;
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

// ---- fiber bodies ----

/// A fiber that runs a function call, suspending and resuming through
/// its saved execution state.
pub struct VmFiber {
    root: Option<(Value, Value, Vec<Value>)>,
    state: Option<VmState>,
}

impl VmFiber {
    /// A fiber that will call `func(this, args)` when first scheduled.
    pub fn call(func: Value, this: Value, args: Vec<Value>) -> VmFiber {
        VmFiber {
            root: Some((func, this, args)),
            state: None,
        }
    }

    /// A fiber over an already-built execution state (generators).
    pub(crate) fn from_state(state: VmState) -> VmFiber {
        VmFiber {
            root: None,
            state: Some(state),
        }
    }

    pub(crate) fn resume_on(&mut self, vm: &mut VirtualMachine) -> FiberStep {
        if let Some(mut state) = self.state.take() {
            return match vm.run_state(&mut state, true) {
                Ok(RunOutcome::Completed(v)) => FiberStep::Done(v),
                Ok(RunOutcome::Suspended) => {
                    self.state = Some(state);
                    FiberStep::Yielded
                }
                Err(e) => FiberStep::Failed(e),
            };
        }
        let Some((func, this, args)) = self.root.take() else {
            return FiberStep::Done(Value::Undefined);
        };
        let Value::Function(f) = &func else {
            return FiberStep::Failed(RuntimeError::new(format!(
                "cannot run fiber over value of type {}",
                func.type_of()
            )));
        };
        match f.kind() {
            FunctionKind::Script(_) => {
                match vm.setup_script_state(f, this, &args, CallKind::Normal) {
                    Ok(state) => {
                        self.state = Some(state);
                        self.resume_on(vm)
                    }
                    Err(e) => FiberStep::Failed(e),
                }
            }
            FunctionKind::Native(nf) => {
                let nf = *nf;
                let result = nf(vm, &this, &args);
                self.finish_native_root(vm, result, func.clone(), this, args)
            }
            FunctionKind::NativeDelegate(d) => {
                let d = d.clone();
                let result = d(vm, &this, &args);
                self.finish_native_root(vm, result, func.clone(), this, args)
            }
        }
    }

    fn finish_native_root(
        &mut self,
        vm: &mut VirtualMachine,
        result: NativeResult,
        func: Value,
        this: Value,
        args: Vec<Value>,
    ) -> FiberStep {
        if vm.suspend_requested {
            vm.suspend_requested = false;
            // The native re-runs from the top on the next turn; this is
            // how timer natives poll their deadline
            self.root = Some((func, this, args));
            return FiberStep::Yielded;
        }
        match result {
            Ok(v) => FiberStep::Done(v),
            Err(e) => FiberStep::Failed(native_to_runtime(e)),
        }
    }
}

impl FiberBody for VmFiber {
    fn resume(&mut self, host: &mut dyn Any) -> FiberStep {
        let Some(vm) = host.downcast_mut::<VirtualMachine>() else {
            return FiberStep::Failed(RuntimeError::new("fiber resumed without a VM host"));
        };
        self.resume_on(vm)
    }
}

// ---- free helpers ----

fn native_to_runtime(err: NativeError) -> RuntimeError {
    match err {
        NativeError::Thrown(value) => RuntimeError::with_thrown(value.to_string(), value),
        NativeError::WrongNumberOfArgs { expected, actual } => RuntimeError::new(format!(
            "wrong number of arguments: expected {}, got {}",
            expected, actual
        )),
        NativeError::WrongTypeOfArg { index, expected } => RuntimeError::new(format!(
            "wrong type for argument {}: expected {}",
            index + 1,
            expected
        )),
    }
}

fn pop(state: &mut VmState) -> Result<Value, RuntimeError> {
    state
        .stack
        .pop()
        .ok_or_else(|| RuntimeError::new("vm internal error: operand stack underflow"))
}

fn binary_op(
    state: &mut VmState,
    op: impl Fn(&Value, &Value) -> Value,
) -> Result<(), RuntimeError> {
    let b = pop(state)?;
    let a = pop(state)?;
    state.stack.push(op(&a, &b));
    Ok(())
}

fn comparison_op(
    state: &mut VmState,
    test: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<(), RuntimeError> {
    let b = pop(state)?;
    let a = pop(state)?;
    // NaN comparisons are all false
    let result = a.compare(&b).map(test).unwrap_or(false);
    state.stack.push(Value::Boolean(result));
    Ok(())
}

fn split_args(state: &mut VmState, n: usize) -> Result<Vec<Value>, RuntimeError> {
    if state.stack.len() < n {
        return Err(RuntimeError::new(
            "vm internal error: operand stack underflow",
        ));
    }
    let at = state.stack.len() - n;
    Ok(state.stack.split_off(at))
}

fn read_u8(state: &mut VmState) -> Result<u8, RuntimeError> {
    let Some(&byte) = state.chunk.code.get(state.ip) else {
        return Err(RuntimeError::new("vm internal error: truncated operand"));
    };
    state.ip += 1;
    Ok(byte)
}

fn read_u32(state: &mut VmState) -> Result<u32, RuntimeError> {
    let Some(slice) = state.chunk.code.get(state.ip..state.ip + 4) else {
        return Err(RuntimeError::new("vm internal error: truncated operand"));
    };
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(slice);
    state.ip += 4;
    Ok(u32::from_ne_bytes(bytes))
}

fn read_i32(state: &mut VmState) -> Result<i32, RuntimeError> {
    Ok(read_u32(state)? as i32)
}

fn jump_relative(state: &mut VmState, rel: i32) -> Result<(), RuntimeError> {
    let target = state.ip as i64 + rel as i64;
    if target < 0 || target as usize > state.chunk.code.len() {
        return Err(RuntimeError::new("vm internal error: jump out of range"));
    }
    state.ip = target as usize;
    Ok(())
}

fn restore_frame(state: &mut VmState, frame: CallFrame) {
    state.chunk = frame.chunk;
    state.ip = frame.ip;
    state.env = frame.env;
    state.try_stack = frame.try_stack;
    state.call_kind = frame.call_kind;
    state.this = frame.this;
}

fn pop_member_pairs(
    state: &mut VmState,
    n: usize,
) -> Result<Vec<(String, Rc<Function>)>, RuntimeError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let func = pop(state)?;
        let name = pop(state)?.to_string();
        let Value::Function(func) = func else {
            return Err(RuntimeError::new(
                "vm internal error: class member is not a function",
            ));
        };
        out.push((name, func));
    }
    out.reverse();
    Ok(out)
}

fn integer_key(key: &Value) -> Option<i64> {
    match key {
        Value::Integer(n) => Some(*n),
        Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
        _ => None,
    }
}

/// Wraps a possibly-negative index; `-len` maps to 0 and `-len - 1` is
/// out of range.
fn wrap_index(index: i64, len: usize) -> Option<usize> {
    let wrapped = if index < 0 { len as i64 + index } else { index };
    if wrapped < 0 || wrapped >= len as i64 {
        None
    } else {
        Some(wrapped as usize)
    }
}

fn switch_target(table: &Value, scrutinee: &Value, default: usize) -> Result<usize, String> {
    let Value::Array(pairs) = table else {
        return Err("invalid switch table".to_string());
    };
    for pair in pairs.borrow().iter() {
        let Value::Array(pair) = pair else {
            return Err("invalid switch table".to_string());
        };
        let pair = pair.borrow();
        if pair.len() != 2 {
            return Err("invalid switch table".to_string());
        }
        if pair[0].strict_equals(scrutinee) {
            let Value::Integer(offset) = pair[1] else {
                return Err("invalid switch table".to_string());
            };
            return Ok(offset as usize);
        }
    }
    Ok(default)
}

/// Builds the next-function over a snapshot of (key, value) pairs.
fn iteration_next_fn(pairs: Vec<(Value, Value)>) -> Value {
    let index = Cell::new(0usize);
    Value::Function(Function::new_delegate("next", move |_ctx, _this, _args| {
        let result = Object::new_ref();
        let i = index.get();
        {
            let mut result = result.borrow_mut();
            if i < pairs.len() {
                index.set(i + 1);
                let (key, value) = pairs[i].clone();
                result.set_field("done", Value::Boolean(false));
                result.set_field("key", key);
                result.set_field("value", value);
            } else {
                result.set_field("done", Value::Boolean(true));
            }
        }
        Ok(Value::Object(result))
    }))
}
