//! Error constructors.
//!
//! `Error`, `TypeError` and `RangeError` share one mechanism: the
//! constructor stores the message on the instance, and the prototype
//! carries the error name and a `toString`. Subclass prototypes chain to
//! `Error.prototype` so `instanceof Error` holds for every kind.

use std::rc::Rc;

use core_types::{Function, NativeContext, NativeResult, Object, Value};

/// The three error constructors, prototype-chained.
pub struct ErrorConstructors {
    /// The base `Error`
    pub error: Rc<Function>,
    /// `TypeError`, chained to Error.prototype
    pub type_error: Rc<Function>,
    /// `RangeError`, chained to Error.prototype
    pub range_error: Rc<Function>,
}

/// Builds the error constructor family.
pub fn make_error_constructors() -> ErrorConstructors {
    let error = make_error_kind("Error");
    let type_error = make_error_kind("TypeError");
    let range_error = make_error_kind("RangeError");

    let base_proto = error.prototype_object().expect("Error prototype");
    for sub in [&type_error, &range_error] {
        let proto = sub.prototype_object().expect("error prototype");
        proto.borrow_mut().prototype = Some(base_proto.clone());
    }
    ErrorConstructors {
        error,
        type_error,
        range_error,
    }
}

fn make_error_kind(name: &'static str) -> Rc<Function> {
    let ctor = Function::new_delegate(name, move |_ctx, this, args| {
        let message = match args.first() {
            Some(v) => Value::string(v.to_string()),
            None => Value::string(""),
        };
        match this {
            Value::Object(obj) => {
                obj.borrow_mut().set_field("message", message);
                Ok(Value::Undefined)
            }
            _ => {
                // Called without `new`: produce a detached error object
                let obj = Object::new_ref();
                obj.borrow_mut().set_field("name", Value::string(name));
                obj.borrow_mut().set_field("message", message);
                Ok(Value::Object(obj))
            }
        }
    });
    core_types::attach_constructor_prototype(&ctor);
    let proto = ctor.prototype_object().expect("constructor prototype");
    {
        let mut proto = proto.borrow_mut();
        proto.set_field("name", Value::string(name));
        proto.set_field(
            "toString",
            Value::Function(Function::new_native("toString", error_to_string)),
        );
    }
    ctor
}

fn error_to_string(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let Value::Object(obj) = this else {
        return Ok(Value::string("Error"));
    };
    let name = core_types::lookup_field(obj, "name")
        .map(|v| v.to_string())
        .unwrap_or_else(|| "Error".to_string());
    let message = core_types::lookup_field(obj, "message")
        .map(|v| v.to_string())
        .unwrap_or_default();
    Ok(Value::string(if message.is_empty() {
        name
    } else {
        format!("{}: {}", name, message)
    }))
}
