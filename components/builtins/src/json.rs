//! JSON object methods, bridged through serde_json.

use std::rc::Rc;

use core_types::{NativeContext, NativeError, NativeResult, Object, ObjectRef, Value};

use crate::support::{native_object, need_args, string_arg};

/// Builds the `JSON` global.
pub fn make_json() -> ObjectRef {
    native_object(&[("parse", parse_native), ("stringify", stringify_native)])
}

fn parse_native(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let text = string_arg(args, 0)?;
    parse(&text).map_err(NativeError::thrown_message)
}

fn stringify_native(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let rendered = stringify(&args[0]).map_err(NativeError::thrown_message)?;
    Ok(Value::string(rendered))
}

/// Parses JSON text into a script value.
///
/// Numbers that are exactly representable as 64-bit integers become
/// integers; everything else becomes a double.
pub fn parse(text: &str) -> Result<Value, String> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("JSON parse error: {}", e))?;
    Ok(json_to_value(&json))
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => {
            Value::array(items.iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => {
            let obj = Object::new_ref();
            {
                let mut obj = obj.borrow_mut();
                for (key, item) in map {
                    obj.set_field(key.clone(), json_to_value(item));
                }
            }
            Value::Object(obj)
        }
    }
}

/// Serializes a script value to JSON text.
///
/// Undefined and function fields are skipped; non-finite numbers render
/// as null; cycles are reported as an error.
pub fn stringify(value: &Value) -> Result<String, String> {
    let mut seen = Vec::new();
    let json = value_to_json(value, &mut seen)?
        .ok_or_else(|| "cannot stringify undefined".to_string())?;
    serde_json::to_string(&json).map_err(|e| format!("JSON stringify error: {}", e))
}

fn value_to_json(
    value: &Value,
    seen: &mut Vec<*const ()>,
) -> Result<Option<serde_json::Value>, String> {
    match value {
        Value::Undefined | Value::Function(_) => Ok(None),
        Value::Null => Ok(Some(serde_json::Value::Null)),
        Value::Boolean(b) => Ok(Some(serde_json::Value::Bool(*b))),
        Value::Integer(n) => Ok(Some(serde_json::Value::from(*n))),
        Value::Double(d) => {
            if d.is_finite() {
                Ok(Some(
                    serde_json::Number::from_f64(*d)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null),
                ))
            } else {
                Ok(Some(serde_json::Value::Null))
            }
        }
        Value::String(s) => Ok(Some(serde_json::Value::String(s.to_string()))),
        Value::Array(items) => {
            let ptr = Rc::as_ptr(items) as *const ();
            if seen.contains(&ptr) {
                return Err("cannot stringify circular structure".to_string());
            }
            seen.push(ptr);
            let mut out = Vec::new();
            for item in items.borrow().iter() {
                // Unserializable array elements become null, as in JSON.stringify
                out.push(value_to_json(item, seen)?.unwrap_or(serde_json::Value::Null));
            }
            seen.pop();
            Ok(Some(serde_json::Value::Array(out)))
        }
        Value::Object(obj) => {
            let ptr = Rc::as_ptr(obj) as *const ();
            if seen.contains(&ptr) {
                return Err("cannot stringify circular structure".to_string());
            }
            seen.push(ptr);
            let mut out = serde_json::Map::new();
            for (key, field) in obj.borrow().fields.iter() {
                if let Some(json) = value_to_json(field, seen)? {
                    out.insert(key.clone(), json);
                }
            }
            seen.pop();
            Ok(Some(serde_json::Value::Object(out)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse("3").unwrap(), Value::Integer(3));
        assert_eq!(parse("3.5").unwrap(), Value::Double(3.5));
        assert_eq!(parse("-7").unwrap(), Value::Integer(-7));
    }

    #[test]
    fn test_parse_nested() {
        let value = parse(r#"{"a":[1,2,3],"b":"x"}"#).unwrap();
        let Value::Object(obj) = value else {
            panic!("expected object");
        };
        let a = obj.borrow().get_own("a").unwrap();
        let Value::Array(items) = a else {
            panic!("expected array");
        };
        assert_eq!(items.borrow()[2], Value::Integer(3));
    }

    #[test]
    fn test_parse_error() {
        assert!(parse("{oops").is_err());
    }

    #[test]
    fn test_stringify_tree() {
        let obj = Object::new_ref();
        obj.borrow_mut().set_field("a", Value::array(vec![
            Value::Integer(1),
            Value::string("two"),
            Value::Null,
        ]));
        obj.borrow_mut().set_field("b", Value::Boolean(true));
        let text = stringify(&Value::Object(obj)).unwrap();
        assert_eq!(text, r#"{"a":[1,"two",null],"b":true}"#);
    }

    #[test]
    fn test_stringify_skips_undefined_fields() {
        let obj = Object::new_ref();
        obj.borrow_mut().set_field("keep", Value::Integer(1));
        obj.borrow_mut().set_field("drop", Value::Undefined);
        assert_eq!(stringify(&Value::Object(obj)).unwrap(), r#"{"keep":1}"#);
    }

    #[test]
    fn test_stringify_detects_cycles() {
        let obj = Object::new_ref();
        obj.borrow_mut().set_field("me", Value::Object(obj.clone()));
        assert!(stringify(&Value::Object(obj)).is_err());
    }

    #[test]
    fn test_round_trip_preserves_tree_data() {
        let source = r#"{"a":[1,2.5,"x",true,null],"b":{"c":[]}}"#;
        let value = parse(source).unwrap();
        let text = stringify(&value).unwrap();
        assert_eq!(parse(&text).unwrap().to_string(), value.to_string());
    }
}
