//! Standard-library wiring.
//!
//! Pure logic lives in the builtins crate; this module installs it on an
//! interpreter's global environment and per-interpreter method suites,
//! and adds the scheduler-coupled pieces (timers, Generator).

use std::rc::Rc;
use std::time::{Duration, Instant};

use core_types::{Function, NativeContext, NativeError, NativeResult, Object, Value};
use fiber_runtime::FiberHandle;

use crate::generator;
use crate::vm::VirtualMachine;

/// Registers all standard globals on the VM.
pub fn initialize_stdlib(vm: &mut VirtualMachine) {
    let globals = vm.globals();

    // Method suites for primitive receivers
    for (name, f) in builtins::array::methods() {
        vm.suites.array.insert(name, Function::new_native(name, f));
    }
    for (name, f) in builtins::string::methods() {
        vm.suites.string.insert(name, Function::new_native(name, f));
    }
    for (name, f) in builtins::function::methods() {
        vm.suites
            .function
            .insert(name, Function::new_native(name, f));
    }

    // Object: constructor with statics, plus the shared prototype every
    // object can reach. The constructor's `prototype` field is that same
    // shared object, so literals and `new Object()` agree.
    let object_ctor = builtins::object::make_object_constructor();
    {
        let proto = vm.suites.object_prototype.clone();
        let mut proto = proto.borrow_mut();
        for (name, f) in builtins::object::prototype_methods() {
            proto.set_field(name, Value::Function(Function::new_native(name, f)));
        }
        proto.set_field("constructor", Value::Function(object_ctor.clone()));
    }
    object_ctor.set_field(
        "prototype",
        Value::Object(vm.suites.object_prototype.clone()),
    );
    globals.force_set("Object", Value::Function(object_ctor), false);

    globals.force_set("Array", Value::Function(builtins::array::make_array_constructor()), false);
    globals.force_set("console", Value::Object(builtins::console::make_console()), false);
    globals.force_set("Math", Value::Object(builtins::math::make_math()), false);
    globals.force_set("JSON", Value::Object(builtins::json::make_json()), false);
    globals.force_set("RegExp", Value::Function(builtins::regexp::make_regexp_constructor()), false);
    globals.force_set("Date", Value::Function(builtins::date::make_date_constructor()), false);
    globals.force_set("Map", Value::Function(builtins::map::make_map_constructor()), false);
    globals.force_set("System", Value::Object(builtins::system::make_system(Instant::now())), false);

    let errors = builtins::error::make_error_constructors();
    globals.force_set("Error", Value::Function(errors.error), false);
    globals.force_set("TypeError", Value::Function(errors.type_error), false);
    globals.force_set("RangeError", Value::Function(errors.range_error), false);

    for (name, f) in builtins::global_functions::functions() {
        globals.force_set(name, Value::Function(Function::new_native(name, f)), false);
    }

    globals.force_set("NaN", Value::Double(f64::NAN), true);
    globals.force_set("Infinity", Value::Double(f64::INFINITY), true);

    // Scheduler-coupled pieces
    generator::install_prototype(&vm.suites.generator_prototype);
    let generator_ctor = Function::new_native("Generator", generator_constructor);
    generator_ctor.set_field(
        "prototype",
        Value::Object(vm.suites.generator_prototype.clone()),
    );
    vm.suites
        .generator_prototype
        .borrow_mut()
        .set_field("constructor", Value::Function(generator_ctor.clone()));
    globals.force_set("Generator", Value::Function(generator_ctor), false);
    globals.force_set(
        "setTimeout",
        Value::Function(Function::new_native("setTimeout", set_timeout)),
        false,
    );
    globals.force_set(
        "clearTimeout",
        Value::Function(Function::new_native("clearTimeout", clear_timeout)),
        false,
    );
}

fn require_vm<'a>(ctx: &'a mut dyn NativeContext) -> Result<&'a mut VirtualMachine, NativeError> {
    ctx.as_any()
        .downcast_mut::<VirtualMachine>()
        .ok_or_else(|| NativeError::thrown_message("no VM in native context"))
}

/// `new Generator(fn, args...)` - a generator over an arbitrary script
/// function, the class behind `function*` values.
fn generator_constructor(
    ctx: &mut dyn NativeContext,
    _this: &Value,
    args: &[Value],
) -> NativeResult {
    let Some(Value::Function(f)) = args.first() else {
        return Err(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "function",
        });
    };
    let f = f.clone();
    let rest = args[1..].to_vec();
    let vm = require_vm(ctx)?;
    generator::make_generator(vm, &f, Value::Undefined, rest)
        .map_err(|e| NativeError::Thrown(e.thrown))
}

/// `setTimeout(callback, ms)` - registers a timer fiber that re-yields
/// until a monotonic deadline passes, then runs the callback. Returns a
/// handle accepted by `clearTimeout`.
fn set_timeout(ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    let Some(callback @ Value::Function(_)) = args.first() else {
        return Err(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "function",
        });
    };
    let callback = callback.clone();
    let millis = match args.get(1) {
        Some(v @ (Value::Integer(_) | Value::Double(_))) => v.to_number().max(0.0) as u64,
        None => 0,
        Some(_) => {
            return Err(NativeError::WrongTypeOfArg {
                index: 1,
                expected: "number",
            })
        }
    };
    let deadline = Instant::now() + Duration::from_millis(millis);

    let timer = Function::new_delegate("timer", move |ctx, _this, _args| {
        if Instant::now() < deadline {
            ctx.request_suspend();
            return Ok(Value::Undefined);
        }
        ctx.call_value(&callback, &Value::Undefined, &[])
    });

    let vm = require_vm(ctx)?;
    let handle = vm.add_fiber("timeout", Value::Function(timer), Value::Undefined, Vec::new());
    Ok(timer_handle_value(handle))
}

/// `clearTimeout(handle)` - true iff a pending timer was cancelled.
fn clear_timeout(ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    let handle = match args.first() {
        Some(Value::Object(obj)) => {
            let native = obj.borrow().native.clone();
            native.and_then(|n| n.downcast::<FiberHandle>().ok())
        }
        _ => None,
    };
    let Some(handle) = handle else {
        return Ok(Value::Boolean(false));
    };
    let vm = require_vm(ctx)?;
    Ok(Value::Boolean(vm.remove_fiber(&handle)))
}

fn timer_handle_value(handle: FiberHandle) -> Value {
    let obj = Object::new_ref();
    obj.borrow_mut().native = Some(Rc::new(handle));
    Value::Object(obj)
}
