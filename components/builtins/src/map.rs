//! The Map native class: insertion-ordered key/value storage with keys of
//! any value kind, compared by strict equality.

use std::cell::RefCell;
use std::rc::Rc;

use core_types::{Function, NativeContext, NativeError, NativeResult, ObjectRef, Value};

use crate::support::{function_arg, install_methods, need_args, this_object};

struct MapData {
    entries: RefCell<Vec<(Value, Value)>>,
}

/// Builds the `Map` global constructor.
pub fn make_map_constructor() -> Rc<Function> {
    let ctor = Function::new_constructor("Map", constructor);
    install_methods(
        &ctor,
        &[
            ("set", set),
            ("get", get),
            ("has", has),
            ("delete", delete),
            ("clear", clear),
            ("keys", keys),
            ("values", values),
            ("entries", entries),
            ("forEach", for_each),
        ],
    );
    // `size` reads as a property through a prototype getter
    let proto = ctor.prototype_object().expect("Map prototype");
    proto.borrow_mut().getters.insert(
        "size".to_string(),
        Value::Function(Function::new_native("size", size)),
    );
    ctor
}

fn constructor(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let obj = this_object(this)?;
    obj.borrow_mut().native = Some(Rc::new(MapData {
        entries: RefCell::new(Vec::new()),
    }));
    Ok(Value::Undefined)
}

fn map_data(obj: &ObjectRef) -> Result<Rc<MapData>, NativeError> {
    let native = obj.borrow().native.clone();
    native
        .and_then(|n| n.downcast::<MapData>().ok())
        .ok_or(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "Map",
        })
}

fn position(data: &MapData, key: &Value) -> Option<usize> {
    data.entries
        .borrow()
        .iter()
        .position(|(k, _)| k.strict_equals(key))
}

fn set(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 2)?;
    let data = map_data(&this_object(this)?)?;
    let key = args[0].clone();
    let value = args[1].clone();
    match position(&data, &key) {
        Some(i) => data.entries.borrow_mut()[i].1 = value,
        None => data.entries.borrow_mut().push((key, value)),
    }
    Ok(this.clone())
}

fn get(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let data = map_data(&this_object(this)?)?;
    Ok(match position(&data, &args[0]) {
        Some(i) => data.entries.borrow()[i].1.clone(),
        None => Value::Undefined,
    })
}

fn has(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let data = map_data(&this_object(this)?)?;
    Ok(Value::Boolean(position(&data, &args[0]).is_some()))
}

fn delete(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let data = map_data(&this_object(this)?)?;
    match position(&data, &args[0]) {
        Some(i) => {
            data.entries.borrow_mut().remove(i);
            Ok(Value::Boolean(true))
        }
        None => Ok(Value::Boolean(false)),
    }
}

fn clear(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let data = map_data(&this_object(this)?)?;
    data.entries.borrow_mut().clear();
    Ok(Value::Undefined)
}

fn size(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let data = map_data(&this_object(this)?)?;
    let len = data.entries.borrow().len();
    Ok(Value::Integer(len as i64))
}

fn keys(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let data = map_data(&this_object(this)?)?;
    let keys = data.entries.borrow().iter().map(|(k, _)| k.clone()).collect();
    Ok(Value::array(keys))
}

fn values(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let data = map_data(&this_object(this)?)?;
    let values = data.entries.borrow().iter().map(|(_, v)| v.clone()).collect();
    Ok(Value::array(values))
}

fn entries(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let data = map_data(&this_object(this)?)?;
    let entries = data
        .entries
        .borrow()
        .iter()
        .map(|(k, v)| Value::array(vec![k.clone(), v.clone()]))
        .collect();
    Ok(Value::array(entries))
}

fn for_each(ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    need_args(args, 1)?;
    let callback = function_arg(args, 0)?;
    let data = map_data(&this_object(this)?)?;
    let snapshot: Vec<(Value, Value)> = data.entries.borrow().clone();
    for (key, value) in snapshot {
        ctx.call_value(&callback, &Value::Undefined, &[value, key, this.clone()])?;
    }
    Ok(Value::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tests_support::DummyContext;
    use core_types::Object;

    fn new_map() -> Value {
        let obj = Object::new_ref();
        let mut ctx = DummyContext;
        constructor(&mut ctx, &Value::Object(obj.clone()), &[]).unwrap();
        Value::Object(obj)
    }

    #[test]
    fn test_set_get_overwrite() {
        let mut ctx = DummyContext;
        let m = new_map();
        set(&mut ctx, &m, &[Value::string("k"), Value::Integer(1)]).unwrap();
        set(&mut ctx, &m, &[Value::string("k"), Value::Integer(2)]).unwrap();
        assert_eq!(
            get(&mut ctx, &m, &[Value::string("k")]).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(size(&mut ctx, &m, &[]).unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_object_keys_by_identity() {
        let mut ctx = DummyContext;
        let m = new_map();
        let key = Value::Object(Object::new_ref());
        set(&mut ctx, &m, &[key.clone(), Value::Integer(1)]).unwrap();
        assert_eq!(
            has(&mut ctx, &m, &[key.clone()]).unwrap(),
            Value::Boolean(true)
        );
        let other = Value::Object(Object::new_ref());
        assert_eq!(has(&mut ctx, &m, &[other]).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_delete_and_clear() {
        let mut ctx = DummyContext;
        let m = new_map();
        set(&mut ctx, &m, &[Value::Integer(1), Value::string("a")]).unwrap();
        assert_eq!(
            delete(&mut ctx, &m, &[Value::Integer(1)]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            delete(&mut ctx, &m, &[Value::Integer(1)]).unwrap(),
            Value::Boolean(false)
        );
        set(&mut ctx, &m, &[Value::Integer(2), Value::string("b")]).unwrap();
        clear(&mut ctx, &m, &[]).unwrap();
        assert_eq!(size(&mut ctx, &m, &[]).unwrap(), Value::Integer(0));
    }

    #[test]
    fn test_keys_preserve_insertion_order() {
        let mut ctx = DummyContext;
        let m = new_map();
        set(&mut ctx, &m, &[Value::string("z"), Value::Integer(1)]).unwrap();
        set(&mut ctx, &m, &[Value::string("a"), Value::Integer(2)]).unwrap();
        let Value::Array(keys) = keys(&mut ctx, &m, &[]).unwrap() else {
            panic!("expected array");
        };
        let keys = keys.borrow();
        assert_eq!(keys[0], Value::string("z"));
        assert_eq!(keys[1], Value::string("a"));
    }
}
