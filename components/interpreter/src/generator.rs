//! Generators over fibers.
//!
//! A generator function runs inside a dedicated fiber whose environment
//! carries a `yield` binding. `next()` resumes the fiber directly (it is
//! never queued on the scheduler) and packages the yielded value with a
//! `done` flag; `yield` parks the fiber and hands the value across.

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

use core_types::{
    Environment, Function, FunctionKind, NativeContext, NativeError, NativeResult, Object,
    ObjectRef, RuntimeError, Value,
};
use fiber_runtime::FiberStep;

use crate::call_frame::CallKind;
use crate::vm::{VirtualMachine, VmFiber};

/// The channel between the `yield` binding and the generator object.
struct Shared {
    yielded: Option<Value>,
    sent: Value,
    resuming: bool,
}

/// Per-generator state, attached to the generator object's native
/// handle.
pub struct GeneratorData {
    shared: Rc<RefCell<Shared>>,
    fiber: RefCell<Option<VmFiber>>,
    started: Cell<bool>,
    done: Cell<bool>,
}

/// Builds a generator object for a call of a `function*`.
pub fn make_generator(
    vm: &mut VirtualMachine,
    func: &Rc<Function>,
    this: Value,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let FunctionKind::Script(script) = func.kind() else {
        return Err(RuntimeError::new("generators require a script function"));
    };
    let shared = Rc::new(RefCell::new(Shared {
        yielded: None,
        sent: Value::Undefined,
        resuming: false,
    }));

    // Wrap the closure with the fiber-local yield binding
    let parent = script
        .closure
        .borrow()
        .clone()
        .unwrap_or_else(|| vm.globals());
    let wrapper = Environment::child(&parent);
    wrapper.force_set(
        "yield",
        Value::Function(yield_native(shared.clone())),
        true,
    );
    let bound = func.bind_environment(wrapper);

    let state = vm.setup_script_state(&bound, this, &args, CallKind::Normal)?;
    let data = Rc::new(GeneratorData {
        shared,
        fiber: RefCell::new(Some(VmFiber::from_state(state))),
        started: Cell::new(false),
        done: Cell::new(false),
    });

    let obj = Object::new_ref();
    {
        let mut obj = obj.borrow_mut();
        obj.prototype = Some(vm.suites.generator_prototype.clone());
        obj.native = Some(data);
    }
    Ok(Value::Object(obj))
}

fn yield_native(shared: Rc<RefCell<Shared>>) -> Rc<Function> {
    Function::new_delegate("yield", move |ctx, _this, args| {
        let mut sh = shared.borrow_mut();
        if sh.resuming {
            // Re-executed after a resume: hand over the value passed to
            // next() as the result of the yield expression
            sh.resuming = false;
            Ok(mem::replace(&mut sh.sent, Value::Undefined))
        } else {
            sh.yielded = Some(args.first().cloned().unwrap_or(Value::Undefined));
            ctx.request_suspend();
            Ok(Value::Undefined)
        }
    })
}

fn generator_data(this: &Value) -> Result<Rc<GeneratorData>, NativeError> {
    let Value::Object(obj) = this else {
        return Err(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "Generator",
        });
    };
    let native = obj.borrow().native.clone();
    native
        .and_then(|n| n.downcast::<GeneratorData>().ok())
        .ok_or(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "Generator",
        })
}

fn iteration_result(value: Value, done: bool) -> Value {
    let obj = Object::new_ref();
    {
        let mut obj = obj.borrow_mut();
        obj.set_field("value", value);
        obj.set_field("done", Value::Boolean(done));
    }
    Value::Object(obj)
}

/// `Generator.prototype.next(sent?)`.
pub fn next(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let data = generator_data(this)?;
    if data.done.get() {
        return Ok(iteration_result(Value::Undefined, true));
    }
    if data.started.get() {
        let mut sh = data.shared.borrow_mut();
        sh.resuming = true;
        sh.sent = args.first().cloned().unwrap_or(Value::Undefined);
    }
    data.started.set(true);

    let Some(mut fiber) = data.fiber.borrow_mut().take() else {
        data.done.set(true);
        return Ok(iteration_result(Value::Undefined, true));
    };
    let Some(vm) = ctx.as_any().downcast_mut::<VirtualMachine>() else {
        return Err(NativeError::thrown_message("generator resumed without a VM"));
    };
    match fiber.resume_on(vm) {
        FiberStep::Yielded => {
            *data.fiber.borrow_mut() = Some(fiber);
            let value = data
                .shared
                .borrow_mut()
                .yielded
                .take()
                .unwrap_or(Value::Undefined);
            Ok(iteration_result(value, false))
        }
        FiberStep::Done(value) => {
            data.done.set(true);
            Ok(iteration_result(value, true))
        }
        FiberStep::Failed(e) => {
            data.done.set(true);
            Err(NativeError::Thrown(e.thrown))
        }
    }
}

/// `Generator.prototype.return(value?)` - finishes the generator.
pub fn finish(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let data = generator_data(this)?;
    data.done.set(true);
    data.fiber.borrow_mut().take();
    Ok(iteration_result(
        args.first().cloned().unwrap_or(Value::Undefined),
        true,
    ))
}

/// The `done` prototype getter.
pub fn done(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let data = generator_data(this)?;
    Ok(Value::Boolean(data.done.get()))
}

/// Installs the generator prototype methods.
pub fn install_prototype(proto: &ObjectRef) {
    let mut proto = proto.borrow_mut();
    proto.set_field("next", Value::Function(Function::new_native("next", next)));
    proto.set_field(
        "return",
        Value::Function(Function::new_native("return", finish)),
    );
    proto.getters.insert(
        "done".to_string(),
        Value::Function(Function::new_native("done", done)),
    );
}
