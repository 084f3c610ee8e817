//! The Object constructor and its statics.

use std::rc::Rc;

use core_types::{Function, NativeContext, NativeError, NativeResult, Object, Value};

use crate::support::{arg, function_arg, need_args, string_arg, this_object};

/// Builds the `Object` global: a constructor carrying the static method
/// surface.
pub fn make_object_constructor() -> Rc<Function> {
    let ctor = Function::new_constructor("Object", constructor);
    let statics: &[(&str, core_types::NativeFunction)] = &[
        ("keys", keys),
        ("values", values),
        ("entries", entries),
        ("getOwnPropertyNames", keys),
        ("create", create),
        ("assign", assign),
        ("getPrototypeOf", get_prototype_of),
        ("setPrototypeOf", set_prototype_of),
        ("setGetter", set_getter),
        ("setSetter", set_setter),
    ];
    for (name, f) in statics {
        ctor.set_field(*name, Value::Function(Function::new_native(*name, *f)));
    }
    ctor
}

fn constructor(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    match this {
        // Invoked through `new`: the VM already built the object
        Value::Object(_) => Ok(Value::Undefined),
        _ => Ok(Value::Object(Object::new_ref())),
    }
}

fn object_arg(args: &[Value], index: usize) -> Result<core_types::ObjectRef, NativeError> {
    match args.get(index) {
        Some(Value::Object(obj)) => Ok(obj.clone()),
        _ => Err(NativeError::WrongTypeOfArg {
            index,
            expected: "object",
        }),
    }
}

fn keys(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let obj = object_arg(args, 0)?;
    let keys = obj
        .borrow()
        .own_keys()
        .into_iter()
        .map(Value::string)
        .collect();
    Ok(Value::array(keys))
}

fn values(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let obj = object_arg(args, 0)?;
    let values = obj.borrow().fields.values().cloned().collect();
    Ok(Value::array(values))
}

fn entries(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let obj = object_arg(args, 0)?;
    let entries = obj
        .borrow()
        .fields
        .iter()
        .map(|(k, v)| Value::array(vec![Value::string(k.clone()), v.clone()]))
        .collect();
    Ok(Value::array(entries))
}

fn create(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let obj = Object::new_ref();
    match &args[0] {
        Value::Object(proto) => obj.borrow_mut().prototype = Some(proto.clone()),
        Value::Null => {}
        _ => {
            return Err(NativeError::WrongTypeOfArg {
                index: 0,
                expected: "object or null",
            })
        }
    }
    Ok(Value::Object(obj))
}

fn assign(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let target = object_arg(args, 0)?;
    for source in &args[1..] {
        if let Value::Object(source) = source {
            let fields: Vec<(String, Value)> = source
                .borrow()
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut target = target.borrow_mut();
            for (key, value) in fields {
                target.set_field(key, value);
            }
        }
    }
    Ok(args[0].clone())
}

fn get_prototype_of(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let obj = object_arg(args, 0)?;
    let proto = obj.borrow().prototype.clone();
    Ok(match proto {
        Some(p) => Value::Object(p),
        None => Value::Null,
    })
}

fn set_prototype_of(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 2)?;
    let obj = object_arg(args, 0)?;
    match &args[1] {
        Value::Object(proto) => obj.borrow_mut().prototype = Some(proto.clone()),
        Value::Null => obj.borrow_mut().prototype = None,
        _ => {
            return Err(NativeError::WrongTypeOfArg {
                index: 1,
                expected: "object or null",
            })
        }
    }
    Ok(args[0].clone())
}

fn set_getter(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 3)?;
    let obj = object_arg(args, 0)?;
    let name = string_arg(args, 1)?;
    let func = function_arg(args, 2)?;
    obj.borrow_mut().getters.insert(name.to_string(), func);
    Ok(args[0].clone())
}

fn set_setter(_ctx: &mut dyn NativeContext, _this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 3)?;
    let obj = object_arg(args, 0)?;
    let name = string_arg(args, 1)?;
    let func = function_arg(args, 2)?;
    obj.borrow_mut().setters.insert(name.to_string(), func);
    Ok(args[0].clone())
}

/// Methods available on every object through the shared object
/// prototype.
pub fn prototype_methods() -> Vec<(&'static str, core_types::NativeFunction)> {
    vec![
        ("hasOwnProperty", has_own_property),
        ("toString", to_string),
    ]
}

fn has_own_property(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let obj = this_object(this)?;
    let key = arg(args, 0).to_string();
    let has_own = obj.borrow().has_own(&key);
    Ok(Value::Boolean(has_own))
}

fn to_string(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::string(this.to_string()))
}
