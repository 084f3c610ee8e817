//! The System object: clocks and the collector hook.

use std::time::Instant;

use core_types::{Function, NativeContext, NativeResult, ObjectRef, Object, Value};

use crate::date::current_millis;

/// Builds the `System` global.
///
/// The monotonic clock is anchored to `start`, which the interpreter
/// creates at stdlib initialization so every interpreter instance has
/// its own epoch.
pub fn make_system(start: Instant) -> ObjectRef {
    let system = Object::new_ref();
    {
        let mut system = system.borrow_mut();
        system.set_field(
            "currentTimeMillis",
            Value::Function(Function::new_native("currentTimeMillis", current_time_millis)),
        );
        system.set_field(
            "monotonicMillis",
            Value::Function(Function::new_delegate("monotonicMillis", move |_ctx, _this, _args| {
                Ok(Value::Integer(start.elapsed().as_millis() as i64))
            })),
        );
        system.set_field(
            "gc",
            Value::Function(Function::new_native("gc", gc)),
        );
    }
    system
}

fn current_time_millis(_ctx: &mut dyn NativeContext, _this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::Integer(current_millis()))
}

/// Reclamation is reference counting; there is nothing to trigger.
fn gc(_ctx: &mut dyn NativeContext, _this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tests_support::DummyContext;

    #[test]
    fn test_monotonic_clock_is_anchored() {
        let system = make_system(Instant::now());
        let Some(Value::Function(mono)) = system.borrow().get_own("monotonicMillis") else {
            panic!("expected monotonicMillis");
        };
        let mut ctx = DummyContext;
        let core_types::FunctionKind::NativeDelegate(f) = mono.kind() else {
            panic!("expected delegate");
        };
        let Value::Integer(elapsed) =
            f(&mut ctx as &mut dyn NativeContext, &Value::Undefined, &[]).unwrap()
        else {
            panic!("expected integer");
        };
        assert!(elapsed >= 0);
        assert!(elapsed < 10_000);
    }

    #[test]
    fn test_shape() {
        let system = make_system(Instant::now());
        let system = system.borrow();
        assert!(system.get_own("currentTimeMillis").is_some());
        assert!(system.get_own("gc").is_some());
    }
}
