//! Function values and the native-call contract.
//!
//! A function is one of three variants: a script function (bytecode plus
//! parameter names plus a captured closure environment), a plain native
//! function, or a native delegate carrying host state. Functions are
//! first-class values, double as object constructors through their
//! `prototype` field, and may carry arbitrary fields.

use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::chunk::Chunk;
use crate::environment::Environment;
use crate::object::{Object, ObjectRef};
use crate::value::Value;

/// Failure modes of a native call.
///
/// Any error raised by a native function becomes a script-level runtime
/// exception: `Thrown` carries the exception value directly, while the
/// argument errors synthesize a message string as the thrown value.
#[derive(Debug, Clone)]
pub enum NativeError {
    /// The carried value is the exception to throw
    Thrown(Value),
    /// The call received the wrong number of arguments
    WrongNumberOfArgs {
        /// How many arguments the function requires
        expected: usize,
        /// How many were supplied
        actual: usize,
    },
    /// An argument had the wrong type
    WrongTypeOfArg {
        /// Zero-based argument position
        index: usize,
        /// Human-readable expected kind
        expected: &'static str,
    },
}

impl NativeError {
    /// Convenience for throwing a string message.
    pub fn thrown_message(message: impl Into<String>) -> NativeError {
        NativeError::Thrown(Value::string(message))
    }
}

/// Result of a native call.
pub type NativeResult = Result<Value, NativeError>;

/// The services the VM exposes to native functions.
///
/// Natives receive this instead of the raw VM so that pure standard-library
/// code can live outside the interpreter crate. `call_value` re-enters the
/// VM for script callbacks; `request_suspend` asks the scheduler to park
/// the current fiber (the re-executed call will re-invoke the native);
/// `as_any` is the escape hatch interpreter-level natives use to reach
/// their own machinery.
pub trait NativeContext {
    /// Calls a function value (script or native) to completion.
    fn call_value(&mut self, func: &Value, this: &Value, args: &[Value]) -> NativeResult;

    /// The shared global environment.
    fn globals(&self) -> Rc<Environment>;

    /// Requests suspension of the current fiber at this call.
    fn request_suspend(&mut self);

    /// Downcast access to the concrete VM.
    fn as_any(&mut self) -> &mut dyn Any;
}

/// A plain native function.
pub type NativeFunction = fn(&mut dyn NativeContext, &Value, &[Value]) -> NativeResult;

/// A native delegate: a boxed callable carrying host state.
pub type NativeCallable = dyn Fn(&mut dyn NativeContext, &Value, &[Value]) -> NativeResult;

/// The script-function payload: bytecode, parameter names, and the
/// captured environment.
#[derive(Clone)]
pub struct ScriptFunction {
    /// Compiled bytecode shared with the constant table template
    pub chunk: Rc<Chunk>,
    /// Parameter names, bound positionally at call time
    pub arg_names: Vec<String>,
    /// The defining environment, captured when the function value is loaded
    pub closure: RefCell<Option<Rc<Environment>>>,
    /// True for `function*` generator functions
    pub is_generator: bool,
}

/// The three function variants.
#[derive(Clone)]
pub enum FunctionKind {
    /// Bytecode function with closure capture
    Script(ScriptFunction),
    /// Host function pointer
    Native(NativeFunction),
    /// Host callable with captured state
    NativeDelegate(Rc<NativeCallable>),
}

/// A function value.
pub struct Function {
    name: String,
    kind: FunctionKind,
    bound_this: RefCell<Option<Value>>,
    fields: RefCell<IndexMap<String, Value>>,
}

impl Function {
    /// Creates a script-function template for the constant table.
    ///
    /// Templates carry no closure environment and no prototype; both are
    /// attached by [`Function::bind_environment`] when the value is loaded.
    pub fn new_script(
        name: impl Into<String>,
        arg_names: Vec<String>,
        chunk: Rc<Chunk>,
        is_generator: bool,
    ) -> Rc<Function> {
        Rc::new(Function {
            name: name.into(),
            kind: FunctionKind::Script(ScriptFunction {
                chunk,
                arg_names,
                closure: RefCell::new(None),
                is_generator,
            }),
            bound_this: RefCell::new(None),
            fields: RefCell::new(IndexMap::new()),
        })
    }

    /// Creates a plain native function.
    pub fn new_native(name: impl Into<String>, f: NativeFunction) -> Rc<Function> {
        Rc::new(Function {
            name: name.into(),
            kind: FunctionKind::Native(f),
            bound_this: RefCell::new(None),
            fields: RefCell::new(IndexMap::new()),
        })
    }

    /// Creates a native delegate from a closure.
    pub fn new_delegate<F>(name: impl Into<String>, f: F) -> Rc<Function>
    where
        F: Fn(&mut dyn NativeContext, &Value, &[Value]) -> NativeResult + 'static,
    {
        Rc::new(Function {
            name: name.into(),
            kind: FunctionKind::NativeDelegate(Rc::new(f)),
            bound_this: RefCell::new(None),
            fields: RefCell::new(IndexMap::new()),
        })
    }

    /// Creates a native function usable as a constructor: a fresh
    /// `prototype` object with a back-pointing `constructor` field is
    /// attached.
    pub fn new_constructor(name: impl Into<String>, f: NativeFunction) -> Rc<Function> {
        let func = Function::new_native(name, f);
        attach_constructor_prototype(&func);
        func
    }

    /// The function's name (empty for anonymous functions).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The function variant.
    pub fn kind(&self) -> &FunctionKind {
        &self.kind
    }

    /// True for `function*` script functions.
    pub fn is_generator(&self) -> bool {
        matches!(
            &self.kind,
            FunctionKind::Script(s) if s.is_generator
        )
    }

    /// The permanently bound `this`, if any.
    pub fn bound_this(&self) -> Option<Value> {
        self.bound_this.borrow().clone()
    }

    /// Reads a field of the function object.
    pub fn get_field(&self, key: &str) -> Option<Value> {
        self.fields.borrow().get(key).cloned()
    }

    /// Writes a field of the function object.
    pub fn set_field(&self, key: impl Into<String>, value: Value) {
        self.fields.borrow_mut().insert(key.into(), value);
    }

    /// Removes a field; returns true if one was present.
    pub fn delete_field(&self, key: &str) -> bool {
        self.fields.borrow_mut().shift_remove(key).is_some()
    }

    /// Field keys in insertion order.
    pub fn field_keys(&self) -> Vec<String> {
        self.fields.borrow().keys().cloned().collect()
    }

    /// The function's `prototype` field when it is an object.
    pub fn prototype_object(&self) -> Option<ObjectRef> {
        match self.fields.borrow().get("prototype") {
            Some(Value::Object(o)) => Some(o.clone()),
            _ => None,
        }
    }

    /// Copy-for-closure: a shallow clone of a script-function template,
    /// rebound to `env`, with a fresh constructor prototype.
    ///
    /// The clone shares bytecode and argument names with the template; the
    /// constant table itself is never mutated.
    pub fn bind_environment(self: &Rc<Self>, env: Rc<Environment>) -> Rc<Function> {
        let kind = match &self.kind {
            FunctionKind::Script(s) => FunctionKind::Script(ScriptFunction {
                chunk: s.chunk.clone(),
                arg_names: s.arg_names.clone(),
                closure: RefCell::new(Some(env)),
                is_generator: s.is_generator,
            }),
            other => other.clone(),
        };
        let func = Rc::new(Function {
            name: self.name.clone(),
            kind,
            bound_this: RefCell::new(self.bound_this.borrow().clone()),
            fields: RefCell::new(IndexMap::new()),
        });
        attach_constructor_prototype(&func);
        func
    }

    /// A clone of this function with `this` permanently bound, sharing
    /// code and closure. This is the machinery behind `Function.bind`.
    pub fn bind_this(self: &Rc<Self>, this: Value) -> Rc<Function> {
        Rc::new(Function {
            name: self.name.clone(),
            kind: self.kind.clone(),
            bound_this: RefCell::new(Some(this)),
            fields: RefCell::new(self.fields.borrow().clone()),
        })
    }
}

/// Attaches a fresh `prototype` object whose `constructor` field points
/// back at `func`.
pub fn attach_constructor_prototype(func: &Rc<Function>) {
    let proto = Object::new_ref();
    proto
        .borrow_mut()
        .set_field("constructor", Value::Function(func.clone()));
    func.set_field("prototype", Value::Object(proto));
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            FunctionKind::Script(s) => {
                if s.is_generator {
                    "generator"
                } else {
                    "script"
                }
            }
            FunctionKind::Native(_) => "native",
            FunctionKind::NativeDelegate(_) => "native-delegate",
        };
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_template_rebind_shares_chunk() {
        let chunk = Rc::new(Chunk::new());
        let template = Function::new_script("f", vec!["a".to_string()], chunk.clone(), false);
        let env = Environment::new_global();
        let bound = template.bind_environment(env.clone());

        match (template.kind(), bound.kind()) {
            (FunctionKind::Script(t), FunctionKind::Script(b)) => {
                assert!(Rc::ptr_eq(&t.chunk, &b.chunk));
                assert!(t.closure.borrow().is_none());
                assert!(Rc::ptr_eq(b.closure.borrow().as_ref().unwrap(), &env));
            }
            _ => panic!("expected script functions"),
        }
    }

    #[test]
    fn test_rebind_attaches_fresh_prototype() {
        let template = Function::new_script("f", vec![], Rc::new(Chunk::new()), false);
        assert!(template.prototype_object().is_none());

        let bound = template.bind_environment(Environment::new_global());
        let proto = bound.prototype_object().expect("prototype attached");
        match proto.borrow().get_own("constructor") {
            Some(Value::Function(c)) => assert!(Rc::ptr_eq(&c, &bound)),
            other => panic!("expected constructor field, got {:?}", other),
        };
    }

    #[test]
    fn test_bind_this() {
        let f = Function::new_native("f", |_, this, _| Ok(this.clone()));
        assert!(f.bound_this().is_none());
        let bound = f.bind_this(Value::Integer(7));
        assert_eq!(bound.bound_this(), Some(Value::Integer(7)));
    }

    #[test]
    fn test_generator_flag() {
        let g = Function::new_script("g", vec![], Rc::new(Chunk::new()), true);
        assert!(g.is_generator());
        let f = Function::new_native("f", |_, _, _| Ok(Value::Undefined));
        assert!(!f.is_generator());
    }
}
