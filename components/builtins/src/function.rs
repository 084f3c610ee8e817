//! The function method suite: call, apply, bind.

use core_types::{NativeContext, NativeError, NativeFunction, NativeResult, Value};

use crate::support::arg;

/// The per-interpreter function method suite.
pub fn methods() -> Vec<(&'static str, NativeFunction)> {
    vec![("call", call), ("apply", apply), ("bind", bind)]
}

fn require_function(this: &Value) -> Result<&Value, NativeError> {
    match this {
        Value::Function(_) => Ok(this),
        _ => Err(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "function",
        }),
    }
}

fn call(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let func = require_function(this)?;
    let bound_this = arg(args, 0);
    let rest = if args.is_empty() { &[] } else { &args[1..] };
    ctx.call_value(func, &bound_this, rest)
}

fn apply(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let func = require_function(this)?;
    let bound_this = arg(args, 0);
    let call_args = match args.get(1) {
        Some(Value::Array(items)) => items.borrow().clone(),
        Some(Value::Undefined) | Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(NativeError::WrongTypeOfArg {
                index: 1,
                expected: "array",
            })
        }
    };
    ctx.call_value(func, &bound_this, &call_args)
}

fn bind(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let Value::Function(func) = require_function(this)? else {
        unreachable!("require_function returned a non-function");
    };
    Ok(Value::Function(func.bind_this(arg(args, 0))))
}
