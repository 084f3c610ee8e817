//! Operator semantics shared by the dispatch loop.
//!
//! Integer/integer arithmetic stays integer with 64-bit wrap-around,
//! except division, which is integer only when exact. Any double operand
//! promotes. Bitwise operators coerce through 32-bit semantics. Division
//! and remainder never raise; integer division by zero promotes to the
//! IEEE result.

use core_types::Value;

/// `+`: string concatenation when either operand is a string, otherwise
/// numeric addition.
pub fn add(a: &Value, b: &Value) -> Value {
    if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
        return Value::string(format!("{}{}", a, b));
    }
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Value::Integer(x.wrapping_add(*y)),
        _ => Value::Double(a.to_number() + b.to_number()),
    }
}

/// `-`
pub fn sub(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Value::Integer(x.wrapping_sub(*y)),
        _ => Value::Double(a.to_number() - b.to_number()),
    }
}

/// `*`
pub fn mul(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Value::Integer(x.wrapping_mul(*y)),
        _ => Value::Double(a.to_number() * b.to_number()),
    }
}

/// `/`: integer iff the divisor divides the dividend exactly.
pub fn div(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) if *y != 0 && x % y == 0 => {
            Value::Integer(x.wrapping_div(*y))
        }
        _ => Value::Double(a.to_number() / b.to_number()),
    }
}

/// `%`
pub fn rem(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) if *y != 0 => Value::Integer(x.wrapping_rem(*y)),
        _ => Value::Double(a.to_number() % b.to_number()),
    }
}

/// `**`: integer for non-negative integer exponents, double otherwise.
pub fn pow(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) if *y >= 0 => {
            let exp = (*y).min(u32::MAX as i64) as u32;
            Value::Integer(x.wrapping_pow(exp))
        }
        _ => Value::Double(a.to_number().powf(b.to_number())),
    }
}

/// Unary `-`
pub fn negate(a: &Value) -> Value {
    match a {
        Value::Integer(n) => Value::Integer(n.wrapping_neg()),
        Value::Double(d) => Value::Double(-d),
        other => Value::Double(-other.to_number()),
    }
}

/// `~`
pub fn bit_not(a: &Value) -> Value {
    Value::Integer(!a.to_int32() as i64)
}

/// `&`
pub fn bit_and(a: &Value, b: &Value) -> Value {
    Value::Integer((a.to_int32() & b.to_int32()) as i64)
}

/// `|`
pub fn bit_or(a: &Value, b: &Value) -> Value {
    Value::Integer((a.to_int32() | b.to_int32()) as i64)
}

/// `^`
pub fn bit_xor(a: &Value, b: &Value) -> Value {
    Value::Integer((a.to_int32() ^ b.to_int32()) as i64)
}

/// `<<`
pub fn shl(a: &Value, b: &Value) -> Value {
    Value::Integer((a.to_int32().wrapping_shl(b.to_uint32() & 31)) as i64)
}

/// `>>`
pub fn shr(a: &Value, b: &Value) -> Value {
    Value::Integer((a.to_int32().wrapping_shr(b.to_uint32() & 31)) as i64)
}

/// `>>>`: unsigned 32-bit right shift.
pub fn ushr(a: &Value, b: &Value) -> Value {
    Value::Integer((a.to_uint32().wrapping_shr(b.to_uint32() & 31)) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        assert_eq!(
            add(&Value::Integer(2), &Value::Integer(3)),
            Value::Integer(5)
        );
        assert_eq!(
            mul(&Value::Integer(4), &Value::Integer(5)),
            Value::Integer(20)
        );
        assert_eq!(
            pow(&Value::Integer(2), &Value::Integer(10)),
            Value::Integer(1024)
        );
    }

    #[test]
    fn test_double_promotes() {
        assert_eq!(
            add(&Value::Integer(1), &Value::Double(0.5)),
            Value::Double(1.5)
        );
        assert_eq!(
            pow(&Value::Integer(2), &Value::Integer(-1)),
            Value::Double(0.5)
        );
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            add(&Value::string("n="), &Value::Integer(3)),
            Value::string("n=3")
        );
        assert_eq!(
            add(&Value::Integer(3), &Value::string("!")),
            Value::string("3!")
        );
    }

    #[test]
    fn test_division_exactness() {
        assert_eq!(div(&Value::Integer(6), &Value::Integer(3)), Value::Integer(2));
        assert_eq!(
            div(&Value::Integer(7), &Value::Integer(2)),
            Value::Double(3.5)
        );
    }

    #[test]
    fn test_division_by_zero_promotes() {
        assert_eq!(
            div(&Value::Integer(1), &Value::Integer(0)),
            Value::Double(f64::INFINITY)
        );
        let nan = div(&Value::Integer(0), &Value::Integer(0));
        assert!(matches!(nan, Value::Double(d) if d.is_nan()));
        let nan = rem(&Value::Integer(5), &Value::Integer(0));
        assert!(matches!(nan, Value::Double(d) if d.is_nan()));
    }

    #[test]
    fn test_integer_overflow_wraps() {
        assert_eq!(
            add(&Value::Integer(i64::MAX), &Value::Integer(1)),
            Value::Integer(i64::MIN)
        );
        assert_eq!(
            mul(&Value::Integer(i64::MAX), &Value::Integer(2)),
            Value::Integer(-2)
        );
    }

    #[test]
    fn test_bitwise_32_bit_semantics() {
        assert_eq!(
            shl(&Value::Integer(1), &Value::Integer(33)),
            Value::Integer(2)
        );
        assert_eq!(
            ushr(&Value::Integer(-1), &Value::Integer(0)),
            Value::Integer(u32::MAX as i64)
        );
        assert_eq!(
            shr(&Value::Integer(-8), &Value::Integer(1)),
            Value::Integer(-4)
        );
        assert_eq!(
            bit_and(&Value::Integer(0x1_0000_00FF), &Value::Integer(0x0F)),
            Value::Integer(0x0F)
        );
        assert_eq!(bit_not(&Value::Integer(0)), Value::Integer(-1));
    }
}
