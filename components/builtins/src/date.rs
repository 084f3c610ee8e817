//! The Date native class, backed by chrono.
//!
//! Instances store a millisecond epoch timestamp in their native handle;
//! field accessors decompose it in UTC.

use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Datelike, Timelike, Utc};
use core_types::{Function, NativeContext, NativeError, NativeResult, ObjectRef, Value};

use crate::support::{install_methods, this_object};

struct DateData {
    millis: i64,
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Builds the `Date` global constructor.
pub fn make_date_constructor() -> Rc<Function> {
    let ctor = Function::new_constructor("Date", constructor);
    ctor.set_field(
        "now",
        Value::Function(Function::new_native("now", |_, _, _| {
            Ok(Value::Integer(current_millis()))
        })),
    );
    install_methods(
        &ctor,
        &[
            ("getTime", get_time),
            ("getFullYear", get_full_year),
            ("getMonth", get_month),
            ("getDate", get_date),
            ("getHours", get_hours),
            ("getMinutes", get_minutes),
            ("getSeconds", get_seconds),
            ("toISOString", to_iso_string),
        ],
    );
    ctor
}

fn constructor(_ctx: &mut dyn NativeContext, this: &Value, args: &[Value]) -> NativeResult {
    let millis = match args.first() {
        None | Some(Value::Undefined) => current_millis(),
        Some(Value::Integer(ms)) => *ms,
        Some(Value::Double(ms)) => *ms as i64,
        Some(_) => {
            return Err(NativeError::WrongTypeOfArg {
                index: 0,
                expected: "number",
            })
        }
    };
    let obj = this_object(this)?;
    obj.borrow_mut().native = Some(Rc::new(DateData { millis }));
    Ok(Value::Undefined)
}

fn date_data(obj: &ObjectRef) -> Result<Rc<DateData>, NativeError> {
    let native = obj.borrow().native.clone();
    native
        .and_then(|n| n.downcast::<DateData>().ok())
        .ok_or(NativeError::WrongTypeOfArg {
            index: 0,
            expected: "Date",
        })
}

fn date_time(this: &Value) -> Result<DateTime<Utc>, NativeError> {
    let data = date_data(&this_object(this)?)?;
    DateTime::<Utc>::from_timestamp_millis(data.millis).ok_or_else(|| {
        NativeError::thrown_message("Date timestamp out of range")
    })
}

fn get_time(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let data = date_data(&this_object(this)?)?;
    Ok(Value::Integer(data.millis))
}

fn get_full_year(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::Integer(date_time(this)?.year() as i64))
}

fn get_month(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    // Zero-based, like the script-facing convention
    Ok(Value::Integer(date_time(this)?.month0() as i64))
}

fn get_date(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::Integer(date_time(this)?.day() as i64))
}

fn get_hours(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::Integer(date_time(this)?.hour() as i64))
}

fn get_minutes(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::Integer(date_time(this)?.minute() as i64))
}

fn get_seconds(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    Ok(Value::Integer(date_time(this)?.second() as i64))
}

fn to_iso_string(_ctx: &mut dyn NativeContext, this: &Value, _args: &[Value]) -> NativeResult {
    let dt = date_time(this)?;
    Ok(Value::string(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()))
}
