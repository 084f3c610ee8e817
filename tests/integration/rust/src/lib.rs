//! Shared helpers for workspace-level integration tests.

use core_types::{MudError, Value};
use interpreter::Interpreter;

/// Evaluates a source string in a fresh interpreter with the full
/// standard library.
pub fn eval(source: &str) -> Result<Value, MudError> {
    let mut interp = Interpreter::new(false, false);
    interp.initialize_stdlib();
    interp.evaluate(source)
}

/// Evaluates, panicking on failure.
pub fn eval_ok(source: &str) -> Value {
    eval(source).unwrap_or_else(|e| panic!("evaluation failed for {:?}: {}", source, e))
}

/// The elements of an array result.
pub fn array_values(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.borrow().clone(),
        other => panic!("expected array, got {:?}", other),
    }
}
