//! Shared helpers for native implementations.

use std::rc::Rc;

use core_types::{Function, NativeError, NativeFunction, Object, ObjectRef, Value};

/// Builds an object whose fields are the given native functions.
pub fn native_object(methods: &[(&str, NativeFunction)]) -> ObjectRef {
    let obj = Object::new_ref();
    {
        let mut obj = obj.borrow_mut();
        for (name, f) in methods {
            obj.set_field(*name, Value::Function(Function::new_native(*name, *f)));
        }
    }
    obj
}

/// Installs native methods on a constructor's prototype object.
pub fn install_methods(ctor: &Rc<Function>, methods: &[(&str, NativeFunction)]) {
    let proto = ctor.prototype_object().expect("constructor prototype");
    let mut proto = proto.borrow_mut();
    for (name, f) in methods {
        proto.set_field(*name, Value::Function(Function::new_native(*name, *f)));
    }
}

/// The argument at `index`, or undefined.
pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// Requires at least `expected` arguments.
pub fn need_args(args: &[Value], expected: usize) -> Result<(), NativeError> {
    if args.len() < expected {
        return Err(NativeError::WrongNumberOfArgs {
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

/// The receiver as an object, or a wrong-type error.
pub fn this_object(this: &Value) -> Result<ObjectRef, NativeError> {
    match this {
        Value::Object(obj) => Ok(obj.clone()),
        _ => Err(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "object",
        }),
    }
}

/// The receiver as an array, or a wrong-type error.
pub fn this_array(this: &Value) -> Result<core_types::ArrayRef, NativeError> {
    match this {
        Value::Array(a) => Ok(a.clone()),
        _ => Err(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "array",
        }),
    }
}

/// The receiver as a string, or a wrong-type error.
pub fn this_string(this: &Value) -> Result<Rc<str>, NativeError> {
    match this {
        Value::String(s) => Ok(s.clone()),
        _ => Err(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "string",
        }),
    }
}

/// Argument `index` as a string.
pub fn string_arg(args: &[Value], index: usize) -> Result<Rc<str>, NativeError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(NativeError::WrongTypeOfArg {
            index,
            expected: "string",
        }),
    }
}

/// Argument `index` as an integer index, accepting doubles with integral
/// values.
pub fn int_arg(args: &[Value], index: usize) -> Result<i64, NativeError> {
    match args.get(index) {
        Some(Value::Integer(n)) => Ok(*n),
        Some(Value::Double(d)) if d.fract() == 0.0 => Ok(*d as i64),
        _ => Err(NativeError::WrongTypeOfArg {
            index,
            expected: "integer",
        }),
    }
}

/// Argument `index` as a number.
pub fn number_arg(args: &[Value], index: usize) -> Result<f64, NativeError> {
    match args.get(index) {
        Some(v @ (Value::Integer(_) | Value::Double(_))) => Ok(v.to_number()),
        _ => Err(NativeError::WrongTypeOfArg {
            index,
            expected: "number",
        }),
    }
}

/// Argument `index` as a function value.
pub fn function_arg(args: &[Value], index: usize) -> Result<Value, NativeError> {
    match args.get(index) {
        Some(f @ Value::Function(_)) => Ok(f.clone()),
        _ => Err(NativeError::WrongTypeOfArg {
            index,
            expected: "function",
        }),
    }
}
