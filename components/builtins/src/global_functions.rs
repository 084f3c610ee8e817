//! Free functions registered as globals: isdefined, isFinite, isNaN,
//! parseFloat, parseInt.

use core_types::{NativeContext, NativeFunction, NativeResult, Value};

use crate::support::{arg, need_args, string_arg};

/// The free-function surface, minus the timer functions (which need the
/// scheduler and live with the interpreter wiring).
pub fn functions() -> Vec<(&'static str, NativeFunction)> {
    vec![
        ("isdefined", isdefined),
        ("isFinite", is_finite),
        ("isNaN", is_nan),
        ("parseFloat", parse_float),
        ("parseInt", parse_int),
    ]
}

/// `isdefined(name)` - whether an identifier is bound in the global
/// scope chain.
fn isdefined(ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let name = string_arg(args, 0)?;
    Ok(Value::Boolean(ctx.globals().is_declared(&name)))
}

fn is_finite(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    Ok(Value::Boolean(arg(args, 0).to_number().is_finite()))
}

fn is_nan(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    Ok(Value::Boolean(arg(args, 0).to_number().is_nan()))
}

fn parse_float(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let text = arg(args, 0).to_string();
    let trimmed = text.trim();
    // Parse the longest numeric prefix
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    let mut seen_dot = false;
    let mut seen_exp = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'0'..=b'9' => end = i + 1,
            b'+' | b'-' if i == 0 => {}
            b'+' | b'-' if i > 0 && (bytes[i - 1] == b'e' || bytes[i - 1] == b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if !seen_exp && end > 0 => seen_exp = true,
            _ => break,
        }
    }
    if end == 0 {
        return Ok(Value::Double(f64::NAN));
    }
    Ok(Value::Double(
        trimmed[..end].parse::<f64>().unwrap_or(f64::NAN),
    ))
}

fn parse_int(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let text = arg(args, 0).to_string();
    let mut s = text.trim();

    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    let mut radix = match args.get(1) {
        Some(Value::Integer(r)) if (2..=36).contains(r) => *r as u32,
        Some(Value::Integer(_)) => return Ok(Value::Double(f64::NAN)),
        _ => 10,
    };
    if (radix == 16 || args.get(1).is_none()) && (s.starts_with("0x") || s.starts_with("0X")) {
        radix = 16;
        s = &s[2..];
    }

    // Longest valid digit prefix
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return Ok(Value::Double(f64::NAN));
    }
    match i64::from_str_radix(&s[..end], radix) {
        Ok(n) => Ok(Value::Integer(if negative { -n } else { n })),
        Err(_) => Ok(Value::Double(f64::NAN)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tests_support::DummyContext;

    #[test]
    fn test_parse_int() {
        let mut ctx = DummyContext;
        let t = Value::Undefined;
        assert_eq!(
            parse_int(&mut ctx, &t, &[Value::string("42px")]).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            parse_int(&mut ctx, &t, &[Value::string("-17")]).unwrap(),
            Value::Integer(-17)
        );
        assert_eq!(
            parse_int(&mut ctx, &t, &[Value::string("ff"), Value::Integer(16)]).unwrap(),
            Value::Integer(255)
        );
        assert_eq!(
            parse_int(&mut ctx, &t, &[Value::string("0x1A")]).unwrap(),
            Value::Integer(26)
        );
        assert_eq!(
            parse_int(&mut ctx, &t, &[Value::string("zap")]).unwrap().type_of(),
            "double"
        );
    }

    #[test]
    fn test_parse_float() {
        let mut ctx = DummyContext;
        let t = Value::Undefined;
        assert_eq!(
            parse_float(&mut ctx, &t, &[Value::string("3.5rem")]).unwrap(),
            Value::Double(3.5)
        );
        assert_eq!(
            parse_float(&mut ctx, &t, &[Value::string("-2e2!")]).unwrap(),
            Value::Double(-200.0)
        );
        assert!(parse_float(&mut ctx, &t, &[Value::string("abc")])
            .unwrap()
            .to_number()
            .is_nan());
    }

    #[test]
    fn test_is_nan_is_finite() {
        let mut ctx = DummyContext;
        let t = Value::Undefined;
        assert_eq!(
            is_nan(&mut ctx, &t, &[Value::string("zap")]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            is_finite(&mut ctx, &t, &[Value::Integer(5)]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            is_finite(&mut ctx, &t, &[Value::Double(f64::INFINITY)]).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_isdefined_consults_globals() {
        let mut ctx = DummyContext;
        // DummyContext returns a fresh empty global environment
        assert_eq!(
            isdefined(&mut ctx, &Value::Undefined, &[Value::string("nope")]).unwrap(),
            Value::Boolean(false)
        );
    }
}
