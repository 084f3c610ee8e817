//! The console object.

use core_types::{NativeContext, NativeResult, ObjectRef, Value};

use crate::support::native_object;

/// Builds the `console` global.
pub fn make_console() -> ObjectRef {
    native_object(&[("log", log), ("error", error), ("warn", warn)])
}

fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn log(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    println!("{}", join_args(args));
    Ok(Value::Undefined)
}

fn error(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    eprintln!("{}", join_args(args));
    Ok(Value::Undefined)
}

fn warn(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    eprintln!("{}", join_args(args));
    Ok(Value::Undefined)
}
