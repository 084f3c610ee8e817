//! Prototype-chained objects.
//!
//! An object is an insertion-ordered mapping from string keys to values,
//! with an optional prototype, per-key getter/setter slots, and an opaque
//! native handle for host-backed classes.

use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::function::Function;
use crate::value::Value;

/// Shared reference to an object.
pub type ObjectRef = Rc<RefCell<Object>>;

/// A Mudscript object.
///
/// Field iteration order is insertion order; scripts rely on this. Getters
/// and setters are stored separately from plain fields and hold function
/// values. The `native` handle is owned by the host and the runtime never
/// assumes anything about its structure.
pub struct Object {
    /// Plain fields, in insertion order
    pub fields: IndexMap<String, Value>,
    /// Per-key getter functions
    pub getters: IndexMap<String, Value>,
    /// Per-key setter functions
    pub setters: IndexMap<String, Value>,
    /// Prototype link, or None at the end of the chain
    pub prototype: Option<ObjectRef>,
    /// Opaque host-owned handle for native-backed objects
    pub native: Option<Rc<dyn Any>>,
}

impl Object {
    /// Creates an empty object with no prototype.
    pub fn new() -> Object {
        Object {
            fields: IndexMap::new(),
            getters: IndexMap::new(),
            setters: IndexMap::new(),
            prototype: None,
            native: None,
        }
    }

    /// Creates an empty shared object.
    pub fn new_ref() -> ObjectRef {
        Rc::new(RefCell::new(Object::new()))
    }

    /// Creates an empty shared object whose prototype is `proto`.
    pub fn with_prototype(proto: ObjectRef) -> ObjectRef {
        let obj = Object::new_ref();
        obj.borrow_mut().prototype = Some(proto);
        obj
    }

    /// Reads an own field, ignoring the prototype chain and accessors.
    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.fields.get(key).cloned()
    }

    /// Returns true if this object has an own field named `key`.
    pub fn has_own(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Writes an own field on this object.
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Removes an own field; returns true if one was present.
    pub fn delete_field(&mut self, key: &str) -> bool {
        self.fields.shift_remove(key).is_some()
    }

    /// Own field keys in insertion order.
    pub fn own_keys(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

impl Default for Object {
    fn default() -> Self {
        Object::new()
    }
}

/// Walks the prototype chain of `obj` looking for a plain field.
///
/// Accessor slots are not consulted; use [`find_getter`] first when getter
/// semantics apply.
pub fn lookup_field(obj: &ObjectRef, key: &str) -> Option<Value> {
    let mut current = Some(obj.clone());
    while let Some(node) = current {
        let node_ref = node.borrow();
        if let Some(v) = node_ref.fields.get(key) {
            return Some(v.clone());
        }
        current = node_ref.prototype.clone();
    }
    None
}

/// Walks the prototype chain looking for a getter for `key`.
pub fn find_getter(obj: &ObjectRef, key: &str) -> Option<Value> {
    let mut current = Some(obj.clone());
    while let Some(node) = current {
        let node_ref = node.borrow();
        if let Some(g) = node_ref.getters.get(key) {
            return Some(g.clone());
        }
        current = node_ref.prototype.clone();
    }
    None
}

/// Walks the prototype chain looking for a setter for `key`.
pub fn find_setter(obj: &ObjectRef, key: &str) -> Option<Value> {
    let mut current = Some(obj.clone());
    while let Some(node) = current {
        let node_ref = node.borrow();
        if let Some(s) = node_ref.setters.get(key) {
            return Some(s.clone());
        }
        current = node_ref.prototype.clone();
    }
    None
}

/// True iff some object on `obj`'s prototype chain has a `constructor`
/// field that is reference-identical to `ctor`. This is the `instanceof`
/// walk.
pub fn chain_has_constructor(obj: &ObjectRef, ctor: &Rc<Function>) -> bool {
    let mut current = Some(obj.clone());
    while let Some(node) = current {
        let node_ref = node.borrow();
        if let Some(Value::Function(f)) = node_ref.fields.get("constructor") {
            if Rc::ptr_eq(f, ctor) {
                return true;
            }
        }
        current = node_ref.prototype.clone();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionKind, NativeError};
    use crate::Value;

    fn noop_native() -> Rc<Function> {
        Function::new_native("noop", |_, _, _| Ok(Value::Undefined))
    }

    #[test]
    fn test_field_order_is_insertion_order() {
        let obj = Object::new_ref();
        obj.borrow_mut().set_field("z", Value::Integer(1));
        obj.borrow_mut().set_field("a", Value::Integer(2));
        obj.borrow_mut().set_field("m", Value::Integer(3));
        assert_eq!(obj.borrow().own_keys(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_prototype_chain_lookup() {
        let proto = Object::new_ref();
        proto.borrow_mut().set_field("shared", Value::Integer(7));
        let obj = Object::with_prototype(proto.clone());

        assert_eq!(lookup_field(&obj, "shared"), Some(Value::Integer(7)));
        assert!(!obj.borrow().has_own("shared"));

        // Writes land on the target, never on the chain
        obj.borrow_mut().set_field("shared", Value::Integer(9));
        assert_eq!(lookup_field(&obj, "shared"), Some(Value::Integer(9)));
        assert_eq!(proto.borrow().get_own("shared"), Some(Value::Integer(7)));
    }

    #[test]
    fn test_getter_found_through_chain() {
        let proto = Object::new_ref();
        let getter = noop_native();
        proto
            .borrow_mut()
            .getters
            .insert("x".to_string(), Value::Function(getter.clone()));
        let obj = Object::with_prototype(proto);

        match find_getter(&obj, "x") {
            Some(Value::Function(f)) => assert!(Rc::ptr_eq(&f, &getter)),
            other => panic!("expected getter, got {:?}", other),
        }
        assert!(find_setter(&obj, "x").is_none());
    }

    #[test]
    fn test_chain_has_constructor() {
        let ctor = noop_native();
        assert!(matches!(ctor.kind(), FunctionKind::Native(_)));

        let proto = Object::new_ref();
        proto
            .borrow_mut()
            .set_field("constructor", Value::Function(ctor.clone()));
        let obj = Object::with_prototype(proto);

        assert!(chain_has_constructor(&obj, &ctor));
        let other = noop_native();
        assert!(!chain_has_constructor(&obj, &other));
    }

    #[test]
    fn test_delete_field() {
        let obj = Object::new_ref();
        obj.borrow_mut().set_field("k", Value::Integer(1));
        assert!(obj.borrow_mut().delete_field("k"));
        assert!(!obj.borrow_mut().delete_field("k"));
    }

    #[allow(dead_code)]
    fn native_error_is_exported() -> NativeError {
        NativeError::Thrown(Value::Undefined)
    }
}
