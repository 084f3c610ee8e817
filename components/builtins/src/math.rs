//! The Math object.

use core_types::{NativeContext, NativeError, NativeResult, ObjectRef, Value};

use crate::support::{native_object, need_args, number_arg};

/// Builds the `Math` global.
pub fn make_math() -> ObjectRef {
    let math = native_object(&[
        ("abs", abs),
        ("acos", |c, t, a| unary(c, t, a, f64::acos)),
        ("asin", |c, t, a| unary(c, t, a, f64::asin)),
        ("atan", |c, t, a| unary(c, t, a, f64::atan)),
        ("atan2", atan2),
        ("ceil", |c, t, a| unary(c, t, a, f64::ceil)),
        ("cos", |c, t, a| unary(c, t, a, f64::cos)),
        ("exp", |c, t, a| unary(c, t, a, f64::exp)),
        ("floor", |c, t, a| unary(c, t, a, f64::floor)),
        ("log", |c, t, a| unary(c, t, a, f64::ln)),
        ("log2", |c, t, a| unary(c, t, a, f64::log2)),
        ("log10", |c, t, a| unary(c, t, a, f64::log10)),
        ("max", max),
        ("min", min),
        ("pow", pow),
        ("round", |c, t, a| unary(c, t, a, f64::round)),
        ("sign", |c, t, a| unary(c, t, a, sign)),
        ("sin", |c, t, a| unary(c, t, a, f64::sin)),
        ("sqrt", |c, t, a| unary(c, t, a, f64::sqrt)),
        ("tan", |c, t, a| unary(c, t, a, f64::tan)),
        ("trunc", |c, t, a| unary(c, t, a, f64::trunc)),
    ]);
    {
        let mut math = math.borrow_mut();
        math.set_field("PI", Value::Double(std::f64::consts::PI));
        math.set_field("E", Value::Double(std::f64::consts::E));
        math.set_field("LN2", Value::Double(std::f64::consts::LN_2));
        math.set_field("LN10", Value::Double(std::f64::consts::LN_10));
        math.set_field("SQRT2", Value::Double(std::f64::consts::SQRT_2));
    }
    math
}

fn sign(n: f64) -> f64 {
    if n.is_nan() {
        f64::NAN
    } else if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        n
    }
}

fn unary(
    _ctx: &mut dyn NativeContext,
    _this: &Value,
    args: &[Value],
    f: impl Fn(f64) -> f64,
) -> NativeResult {
    need_args(args, 1)?;
    Ok(Value::Double(f(number_arg(args, 0)?)))
}

fn abs(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    match &args[0] {
        Value::Integer(n) => Ok(Value::Integer(n.wrapping_abs())),
        Value::Double(d) => Ok(Value::Double(d.abs())),
        _ => Err(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "number",
        }),
    }
}

fn atan2(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 2)?;
    Ok(Value::Double(number_arg(args, 0)?.atan2(number_arg(args, 1)?)))
}

fn pow(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 2)?;
    Ok(Value::Double(number_arg(args, 0)?.powf(number_arg(args, 1)?)))
}

fn max(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let mut best = f64::NEG_INFINITY;
    for i in 0..args.len() {
        let n = number_arg(args, i)?;
        if n.is_nan() {
            return Ok(Value::Double(f64::NAN));
        }
        best = best.max(n);
    }
    Ok(Value::Double(best))
}

fn min(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let mut best = f64::INFINITY;
    for i in 0..args.len() {
        let n = number_arg(args, i)?;
        if n.is_nan() {
            return Ok(Value::Double(f64::NAN));
        }
        best = best.min(n);
    }
    Ok(Value::Double(best))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyContext;
    impl NativeContext for DummyContext {
        fn call_value(&mut self, _f: &Value, _t: &Value, _a: &[Value]) -> NativeResult {
            Ok(Value::Undefined)
        }
        fn globals(&self) -> std::rc::Rc<core_types::Environment> {
            core_types::Environment::new_global()
        }
        fn request_suspend(&mut self) {}
        fn as_any(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_abs_preserves_integer_kind() {
        let mut ctx = DummyContext;
        assert_eq!(
            abs(&mut ctx, &Value::Undefined, &[Value::Integer(-4)]).unwrap(),
            Value::Integer(4)
        );
        assert_eq!(
            abs(&mut ctx, &Value::Undefined, &[Value::Double(-4.5)]).unwrap(),
            Value::Double(4.5)
        );
    }

    #[test]
    fn test_max_min() {
        let mut ctx = DummyContext;
        let args = [Value::Integer(3), Value::Double(7.5), Value::Integer(-2)];
        assert_eq!(
            max(&mut ctx, &Value::Undefined, &args).unwrap(),
            Value::Double(7.5)
        );
        assert_eq!(
            min(&mut ctx, &Value::Undefined, &args).unwrap(),
            Value::Double(-2.0)
        );
    }

    #[test]
    fn test_wrong_arg_type() {
        let mut ctx = DummyContext;
        assert!(matches!(
            pow(&mut ctx, &Value::Undefined, &[Value::string("x"), Value::Integer(2)]),
            Err(NativeError::WrongTypeOfArg { index: 0, .. })
        ));
    }

    #[test]
    fn test_constants_present() {
        let math = make_math();
        assert_eq!(
            math.borrow().get_own("PI"),
            Some(Value::Double(std::f64::consts::PI))
        );
    }
}
