//! The Array constructor and the array method suite.
//!
//! Suite methods receive the array as `this`; higher-order methods run
//! their callbacks through the reentrant VM via the native context.

use std::cmp::Ordering;
use std::rc::Rc;

use core_types::{Function, NativeContext, NativeError, NativeFunction, NativeResult, Value};

use crate::support::{function_arg, int_arg, need_args, this_array};

/// Builds the `Array` global.
pub fn make_array_constructor() -> Rc<Function> {
    Function::new_constructor("Array", constructor)
}

fn constructor(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    // Array(n) presizes with undefined; Array(a, b, ...) builds from the
    // arguments. The returned array supersedes the constructed `this`.
    if args.len() == 1 {
        if let Value::Integer(n) = args[0] {
            if n < 0 {
                return Err(NativeError::thrown_message("negative array length"));
            }
            return Ok(Value::array(vec![Value::Undefined; n as usize]));
        }
    }
    Ok(Value::array(args.to_vec()))
}

/// The per-interpreter array method suite.
pub fn methods() -> Vec<(&'static str, NativeFunction)> {
    vec![
        ("push", push),
        ("pop", pop),
        ("shift", shift),
        ("unshift", unshift),
        ("slice", slice),
        ("splice", splice),
        ("concat", concat),
        ("join", join),
        ("indexOf", index_of),
        ("lastIndexOf", last_index_of),
        ("includes", includes),
        ("reverse", reverse),
        ("sort", sort),
        ("map", map),
        ("filter", filter),
        ("forEach", for_each),
        ("reduce", reduce),
        ("some", some),
        ("every", every),
        ("find", find),
        ("findIndex", find_index),
    ]
}

/// Clamps a possibly-negative index to `[0, len]`.
fn clamp_index(index: i64, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub((-index) as usize)
    } else {
        (index as usize).min(len)
    }
}

fn push(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let array = this_array(this)?;
    array.borrow_mut().extend(args.iter().cloned());
    let len = array.borrow().len();
    Ok(Value::Integer(len as i64))
}

fn pop(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let array = this_array(this)?;
    let popped = array.borrow_mut().pop();
    Ok(popped.unwrap_or(Value::Undefined))
}

fn shift(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let array = this_array(this)?;
    let mut array = array.borrow_mut();
    if array.is_empty() {
        return Ok(Value::Undefined);
    }
    Ok(array.remove(0))
}

fn unshift(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let array = this_array(this)?;
    let mut array = array.borrow_mut();
    for (i, value) in args.iter().enumerate() {
        array.insert(i, value.clone());
    }
    Ok(Value::Integer(array.len() as i64))
}

fn slice(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let array = this_array(this)?;
    let array = array.borrow();
    let len = array.len();
    let start = match args.first() {
        Some(_) => clamp_index(int_arg(args, 0)?, len),
        None => 0,
    };
    let end = match args.get(1) {
        Some(_) => clamp_index(int_arg(args, 1)?, len),
        None => len,
    };
    let out = if start < end {
        array[start..end].to_vec()
    } else {
        Vec::new()
    };
    Ok(Value::array(out))
}

fn splice(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let array = this_array(this)?;
    let mut array = array.borrow_mut();
    let len = array.len();
    let start = clamp_index(int_arg(args, 0)?, len);
    let delete_count = match args.get(1) {
        Some(_) => (int_arg(args, 1)?.max(0) as usize).min(len - start),
        None => len - start,
    };
    let removed: Vec<Value> = array.splice(start..start + delete_count, args[2..].iter().cloned()).collect();
    Ok(Value::array(removed))
}

fn concat(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let array = this_array(this)?;
    let mut out = array.borrow().clone();
    for value in args {
        match value {
            Value::Array(other) => out.extend(other.borrow().iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    Ok(Value::array(out))
}

fn join(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let array = this_array(this)?;
    let separator = match args.first() {
        Some(v) => v.to_string(),
        None => ",".to_string(),
    };
    let joined = array
        .borrow()
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(Value::string(joined))
}

fn index_of(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let array = this_array(this)?;
    let found = array
        .borrow()
        .iter()
        .position(|v| v.strict_equals(&args[0]));
    Ok(Value::Integer(found.map_or(-1, |i| i as i64)))
}

fn last_index_of(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let array = this_array(this)?;
    let found = array
        .borrow()
        .iter()
        .rposition(|v| v.strict_equals(&args[0]));
    Ok(Value::Integer(found.map_or(-1, |i| i as i64)))
}

fn includes(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let array = this_array(this)?;
    let found = array.borrow().iter().any(|v| v.strict_equals(&args[0]));
    Ok(Value::Boolean(found))
}

fn reverse(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let array = this_array(this)?;
    array.borrow_mut().reverse();
    Ok(this.clone())
}

fn sort(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let array = this_array(this)?;
    let comparator = args.first().cloned();
    // Sort a snapshot so comparator callbacks can observe the array
    // without tripping a borrow
    let mut elements = array.borrow().clone();
    let mut failure = None;

    elements.sort_by(|a, b| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        match &comparator {
            Some(f @ Value::Function(_)) => {
                match ctx.call_value(f, &Value::Undefined, &[a.clone(), b.clone()]) {
                    Ok(result) => {
                        let n = result.to_number();
                        if n < 0.0 {
                            Ordering::Less
                        } else if n > 0.0 {
                            Ordering::Greater
                        } else {
                            Ordering::Equal
                        }
                    }
                    Err(e) => {
                        failure = Some(e);
                        Ordering::Equal
                    }
                }
            }
            _ => a.to_string().cmp(&b.to_string()),
        }
    });

    if let Some(e) = failure {
        return Err(e);
    }
    *array.borrow_mut() = elements;
    Ok(this.clone())
}

fn each_element(
    this: &Value,
    args: &[Value],
    mut visit: impl FnMut(Value, usize) -> Result<bool, NativeError>,
) -> Result<(), NativeError> {
    need_args(args, 1)?;
    let array = this_array(this)?;
    let _ = function_arg(args, 0)?;
    let len = array.borrow().len();
    for i in 0..len {
        let element = match array.borrow().get(i) {
            Some(v) => v.clone(),
            None => break, // the callback shrank the array
        };
        if !visit(element, i)? {
            break;
        }
    }
    Ok(())
}

fn map(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let callback = function_arg(args, 0)?;
    let mut out = Vec::new();
    each_element(this, args, |element, i| {
        let mapped = ctx.call_value(
            &callback,
            &Value::Undefined,
            &[element, Value::Integer(i as i64), this.clone()],
        )?;
        out.push(mapped);
        Ok(true)
    })?;
    Ok(Value::array(out))
}

fn filter(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let callback = function_arg(args, 0)?;
    let mut out = Vec::new();
    each_element(this, args, |element, i| {
        let keep = ctx.call_value(
            &callback,
            &Value::Undefined,
            &[element.clone(), Value::Integer(i as i64), this.clone()],
        )?;
        if keep.is_truthy() {
            out.push(element);
        }
        Ok(true)
    })?;
    Ok(Value::array(out))
}

fn for_each(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let callback = function_arg(args, 0)?;
    each_element(this, args, |element, i| {
        ctx.call_value(
            &callback,
            &Value::Undefined,
            &[element, Value::Integer(i as i64), this.clone()],
        )?;
        Ok(true)
    })?;
    Ok(Value::Undefined)
}

fn reduce(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let callback = function_arg(args, 0)?;
    let array = this_array(this)?;
    let len = array.borrow().len();

    let mut acc;
    let mut start;
    match args.get(1) {
        Some(initial) => {
            acc = initial.clone();
            start = 0;
        }
        None => {
            if len == 0 {
                return Err(NativeError::thrown_message(
                    "reduce of empty array with no initial value",
                ));
            }
            acc = array.borrow()[0].clone();
            start = 1;
        }
    }
    while start < array.borrow().len() {
        let element = array.borrow()[start].clone();
        acc = ctx.call_value(
            &callback,
            &Value::Undefined,
            &[acc, element, Value::Integer(start as i64), this.clone()],
        )?;
        start += 1;
    }
    Ok(acc)
}

fn some(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let callback = function_arg(args, 0)?;
    let mut found = false;
    each_element(this, args, |element, i| {
        let result = ctx.call_value(
            &callback,
            &Value::Undefined,
            &[element, Value::Integer(i as i64), this.clone()],
        )?;
        found = result.is_truthy();
        Ok(!found)
    })?;
    Ok(Value::Boolean(found))
}

fn every(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let callback = function_arg(args, 0)?;
    let mut all = true;
    each_element(this, args, |element, i| {
        let result = ctx.call_value(
            &callback,
            &Value::Undefined,
            &[element, Value::Integer(i as i64), this.clone()],
        )?;
        all = result.is_truthy();
        Ok(all)
    })?;
    Ok(Value::Boolean(all))
}

fn find(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let callback = function_arg(args, 0)?;
    let mut found = Value::Undefined;
    each_element(this, args, |element, i| {
        let result = ctx.call_value(
            &callback,
            &Value::Undefined,
            &[element.clone(), Value::Integer(i as i64), this.clone()],
        )?;
        if result.is_truthy() {
            found = element;
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(found)
}

fn find_index(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let callback = function_arg(args, 0)?;
    let mut found = -1i64;
    each_element(this, args, |element, i| {
        let result = ctx.call_value(
            &callback,
            &Value::Undefined,
            &[element, Value::Integer(i as i64), this.clone()],
        )?;
        if result.is_truthy() {
            found = i as i64;
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(Value::Integer(found))
}
