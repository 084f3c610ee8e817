//! Lexical environments.
//!
//! An environment is a mapping from identifier to binding (value plus const
//! flag), a parent pointer to the enclosing scope, and a depth. The global
//! environment has depth zero and no parent.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// A variable binding.
#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    is_const: bool,
}

/// Errors raised by declaration and assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvError {
    /// The identifier is already declared in this scope
    Redeclaration(String),
    /// The identifier is not declared in any enclosing scope
    Undeclared(String),
    /// The identifier is a const binding
    ConstAssignment(String),
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::Redeclaration(name) => {
                write!(f, "variable '{}' is already declared", name)
            }
            EnvError::Undeclared(name) => write!(f, "variable '{}' is not declared", name),
            EnvError::ConstAssignment(name) => {
                write!(f, "cannot assign to const variable '{}'", name)
            }
        }
    }
}

/// A lexical scope.
pub struct Environment {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Environment>>,
    depth: usize,
}

impl Environment {
    /// Creates the global environment (depth 0, no parent).
    pub fn new_global() -> Rc<Environment> {
        Rc::new(Environment {
            vars: RefCell::new(HashMap::new()),
            parent: None,
            depth: 0,
        })
    }

    /// Opens a child scope of `parent`.
    pub fn child(parent: &Rc<Environment>) -> Rc<Environment> {
        Rc::new(Environment {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
            depth: parent.depth + 1,
        })
    }

    /// The enclosing scope, or None for the global environment.
    pub fn parent(&self) -> Option<Rc<Environment>> {
        self.parent.clone()
    }

    /// Scope nesting depth; 0 is global.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Walks to the root (global) environment.
    pub fn global(self: &Rc<Self>) -> Rc<Environment> {
        let mut current = self.clone();
        while let Some(parent) = current.parent.clone() {
            current = parent;
        }
        current
    }

    /// Declares a binding in this scope.
    ///
    /// Redeclaration in the same scope is an error, except at global scope
    /// when the existing binding currently holds `undefined` (which a
    /// previous `x = undefined` unbind may have left behind as a fresh
    /// `var`).
    pub fn declare(&self, name: &str, value: Value, is_const: bool) -> Result<(), EnvError> {
        let mut vars = self.vars.borrow_mut();
        if let Some(existing) = vars.get(name) {
            let replaceable = self.depth == 0 && matches!(existing.value, Value::Undefined);
            if !replaceable {
                return Err(EnvError::Redeclaration(name.to_string()));
            }
        }
        vars.insert(name.to_string(), Binding { value, is_const });
        Ok(())
    }

    /// Looks an identifier up through the scope chain.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Some(binding.value.clone());
        }
        match &self.parent {
            Some(parent) => parent.lookup(name),
            None => None,
        }
    }

    /// True iff the identifier is declared in this scope or any enclosing
    /// one.
    pub fn is_declared(&self, name: &str) -> bool {
        if self.vars.borrow().contains_key(name) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_declared(name),
            None => false,
        }
    }

    /// Assigns to an existing binding found through the scope chain.
    ///
    /// Const bindings reject assignment. Assigning `undefined` removes the
    /// binding from the scope where it was found.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), EnvError> {
        {
            let mut vars = self.vars.borrow_mut();
            if let Some(binding) = vars.get_mut(name) {
                if binding.is_const {
                    return Err(EnvError::ConstAssignment(name.to_string()));
                }
                if matches!(value, Value::Undefined) {
                    vars.remove(name);
                } else {
                    binding.value = value;
                }
                return Ok(());
            }
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(EnvError::Undeclared(name.to_string())),
        }
    }

    /// Sets a binding in this scope unconditionally, bypassing declaration
    /// and const rules. This is the host's hook for injecting globals.
    pub fn force_set(&self, name: &str, value: Value, is_const: bool) {
        self.vars
            .borrow_mut()
            .insert(name.to_string(), Binding { value, is_const });
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("depth", &self.depth)
            .field("bindings", &self.vars.borrow().len())
            .finish()
    }
}
