//! The RegExp native class, backed by the regex crate.
//!
//! Instances hang their compiled pattern off the object's native handle;
//! the runtime never looks inside it. The `i` flag translates to an
//! inline case-insensitivity group; `exec` is stateless (no lastIndex),
//! so the `g` flag is stored and reported but does not change matching.

use std::rc::Rc;

use core_types::{Function, NativeContext, NativeError, NativeResult, ObjectRef, Value};

use crate::support::{install_methods, need_args, string_arg, this_object};

/// The compiled payload attached to RegExp instances.
pub struct RegExpData {
    regex: regex::Regex,
    source: String,
    flags: String,
}

impl RegExpData {
    /// Compiles a pattern with script-level flags.
    pub fn compile(pattern: &str, flags: &str) -> Result<RegExpData, String> {
        let translated = if flags.contains('i') {
            format!("(?i){}", pattern)
        } else {
            pattern.to_string()
        };
        let regex = regex::Regex::new(&translated)
            .map_err(|e| format!("bad regular expression: {}", e))?;
        Ok(RegExpData {
            regex,
            source: pattern.to_string(),
            flags: flags.to_string(),
        })
    }
}

/// Builds the `RegExp` global constructor.
pub fn make_regexp_constructor() -> Rc<Function> {
    let ctor = Function::new_constructor("RegExp", constructor);
    install_methods(&ctor, &[("test", test), ("exec", exec)]);
    ctor
}

fn constructor(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let pattern = string_arg(args, 0)?;
    let flags = match args.get(1) {
        Some(Value::String(f)) => f.to_string(),
        Some(Value::Undefined) | None => String::new(),
        Some(_) => {
            return Err(NativeError::WrongTypeOfArg {
                index: 1,
                expected: "string",
            })
        }
    };
    let data = RegExpData::compile(&pattern, &flags).map_err(NativeError::thrown_message)?;

    let obj = this_object(this)?;
    {
        let mut obj = obj.borrow_mut();
        obj.set_field("source", Value::string(data.source.clone()));
        obj.set_field("flags", Value::string(data.flags.clone()));
        obj.native = Some(Rc::new(data));
    }
    Ok(Value::Undefined)
}

fn regexp_data(obj: &ObjectRef) -> Result<Rc<RegExpData>, NativeError> {
    let native = obj.borrow().native.clone();
    native
        .and_then(|n| n.downcast::<RegExpData>().ok())
        .ok_or(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "RegExp",
        })
}

fn test(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let data = regexp_data(&this_object(this)?)?;
    let text = string_arg(args, 0)?;
    Ok(Value::Boolean(data.regex.is_match(&text)))
}

fn exec(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let data = regexp_data(&this_object(this)?)?;
    let text = string_arg(args, 0)?;
    let Some(captures) = data.regex.captures(&text) else {
        return Ok(Value::Null);
    };
    let groups: Vec<Value> = captures
        .iter()
        .map(|group| match group {
            Some(m) => Value::string(m.as_str()),
            None => Value::Undefined,
        })
        .collect();
    Ok(Value::array(groups))
}
