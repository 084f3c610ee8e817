//! The string method suite.
//!
//! Strings are immutable; every method returns a new value. Positions are
//! code-point based (the `length` field reported by the VM is the byte
//! length, per the value model).

use core_types::{NativeContext, NativeFunction, NativeResult, Value};

use crate::support::{arg, int_arg, need_args, string_arg, this_string};

/// The per-interpreter string method suite.
pub fn methods() -> Vec<(&'static str, NativeFunction)> {
    vec![
        ("charAt", char_at),
        ("charCodeAt", char_code_at),
        ("codePointAt", char_code_at),
        ("concat", concat),
        ("endsWith", ends_with),
        ("startsWith", starts_with),
        ("includes", includes),
        ("indexOf", index_of),
        ("lastIndexOf", last_index_of),
        ("padStart", pad_start),
        ("padEnd", pad_end),
        ("repeat", repeat),
        ("replace", replace),
        ("split", split),
        ("slice", slice),
        ("substring", substring),
        ("toLowerCase", to_lower_case),
        ("toUpperCase", to_upper_case),
        ("trim", trim),
        ("trimStart", trim_start),
        ("trimEnd", trim_end),
    ]
}

fn clamp_index(index: i64, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub((-index) as usize)
    } else {
        (index as usize).min(len)
    }
}

fn char_at(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let index = int_arg(args, 0)?;
    Ok(match Value::string_index(&s, index) {
        Some(c) => Value::string(c),
        None => Value::string(""),
    })
}

fn char_code_at(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let index = int_arg(args, 0)?;
    Ok(match Value::string_index(&s, index) {
        Some(c) => Value::Integer(c.chars().next().map_or(0, |ch| ch as i64)),
        None => Value::Double(f64::NAN),
    })
}

fn concat(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let mut out = this_string(this)?.to_string();
    for value in args {
        out.push_str(&value.to_string());
    }
    Ok(Value::string(out))
}

fn ends_with(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let suffix = string_arg(args, 0)?;
    Ok(Value::Boolean(s.ends_with(suffix.as_ref())))
}

fn starts_with(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let prefix = string_arg(args, 0)?;
    Ok(Value::Boolean(s.starts_with(prefix.as_ref())))
}

fn includes(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let needle = string_arg(args, 0)?;
    Ok(Value::Boolean(s.contains(needle.as_ref())))
}

/// Byte offset to code-point index.
fn code_point_position(s: &str, byte_offset: usize) -> i64 {
    s[..byte_offset].chars().count() as i64
}

fn index_of(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let needle = string_arg(args, 0)?;
    Ok(Value::Integer(match s.find(needle.as_ref()) {
        Some(offset) => code_point_position(&s, offset),
        None => -1,
    }))
}

fn last_index_of(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let needle = string_arg(args, 0)?;
    Ok(Value::Integer(match s.rfind(needle.as_ref()) {
        Some(offset) => code_point_position(&s, offset),
        None => -1,
    }))
}

fn pad(s: &str, target: usize, padding: &str, at_start: bool) -> String {
    let len = s.chars().count();
    if len >= target || padding.is_empty() {
        return s.to_string();
    }
    let mut fill = String::new();
    let mut pad_chars = padding.chars().cycle();
    for _ in 0..target - len {
        fill.push(pad_chars.next().unwrap());
    }
    if at_start {
        format!("{}{}", fill, s)
    } else {
        format!("{}{}", s, fill)
    }
}

fn pad_start(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let target = int_arg(args, 0)?.max(0) as usize;
    let padding = match args.get(1) {
        Some(p) => p.to_string(),
        None => " ".to_string(),
    };
    Ok(Value::string(pad(&s, target, &padding, true)))
}

fn pad_end(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let target = int_arg(args, 0)?.max(0) as usize;
    let padding = match args.get(1) {
        Some(p) => p.to_string(),
        None => " ".to_string(),
    };
    Ok(Value::string(pad(&s, target, &padding, false)))
}

fn repeat(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let s = this_string(this)?;
    let count = int_arg(args, 0)?;
    if count < 0 {
        return Err(core_types::NativeError::thrown_message(
            "repeat count must not be negative",
        ));
    }
    Ok(Value::string(s.repeat(count as usize)))
}

fn replace(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 2)?;
    let s = this_string(this)?;
    let from = string_arg(args, 0)?;
    let to = arg(args, 1).to_string();
    Ok(Value::string(s.replacen(from.as_ref(), &to, 1)))
}

fn split(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let s = this_string(this)?;
    let Some(separator) = args.first() else {
        return Ok(Value::array(vec![Value::String(s)]));
    };
    let separator = separator.to_string();
    let parts: Vec<Value> = if separator.is_empty() {
        s.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        s.split(separator.as_str()).map(Value::string).collect()
    };
    Ok(Value::array(parts))
}

fn slice(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let s = this_string(this)?;
    let chars: Vec<char> = s.chars().collect();
    let start = match args.first() {
        Some(_) => clamp_index(int_arg(args, 0)?, chars.len()),
        None => 0,
    };
    let end = match args.get(1) {
        Some(_) => clamp_index(int_arg(args, 1)?, chars.len()),
        None => chars.len(),
    };
    let out: String = if start < end {
        chars[start..end].iter().collect()
    } else {
        String::new()
    };
    Ok(Value::string(out))
}

fn substring(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let s = this_string(this)?;
    let chars: Vec<char> = s.chars().collect();
    let mut start = match args.first() {
        Some(_) => int_arg(args, 0)?.max(0) as usize,
        None => 0,
    }
    .min(chars.len());
    let mut end = match args.get(1) {
        Some(_) => int_arg(args, 1)?.max(0) as usize,
        None => chars.len(),
    }
    .min(chars.len());
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }
    Ok(Value::string(chars[start..end].iter().collect::<String>()))
}

fn to_lower_case(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::string(this_string(this)?.to_lowercase()))
}

fn to_upper_case(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::string(this_string(this)?.to_uppercase()))
}

fn trim(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::string(this_string(this)?.trim()))
}

fn trim_start(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::string(this_string(this)?.trim_start()))
}

fn trim_end(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::string(this_string(this)?.trim_end()))
}
