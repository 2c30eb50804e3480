//! Bus payload → RPC value coercion
//!
//! Used by every write path towards the controller. The target type comes
//! from the datapoint descriptor; without one the value is passed through
//! untyped.

use hmbridge_core::{DataType, DatapointDescriptor, RpcValue};
use serde_json::{Map, Value};

use crate::error::{ConvError, ConvResult};
use crate::lenient;

/// Pick the value to coerce out of a raw payload
///
/// A payload starting with `{` is read as JSON and its `val` member used
/// (`null` when absent). If it does not parse, the whole payload is taken as
/// plain text.
pub fn extract_value(payload: &str) -> Value {
    if payload.starts_with('{') {
        match serde_json::from_str::<Value>(payload) {
            Ok(doc) => doc.get("val").cloned().unwrap_or(Value::Null),
            Err(_) => Value::String(payload.to_string()),
        }
    } else {
        Value::String(payload.to_string())
    }
}

/// Coerce a raw payload for a datapoint
pub fn coerce_payload(payload: &str, desc: Option<&DatapointDescriptor>) -> RpcValue {
    coerce(&extract_value(payload), desc)
}

/// Coerce an extracted value to the RPC type the datapoint declares
pub fn coerce(value: &Value, desc: Option<&DatapointDescriptor>) -> RpcValue {
    let Some(desc) = desc else {
        return untyped(value);
    };

    match desc.data_type {
        DataType::Bool | DataType::Action => RpcValue::Bool(to_bool(value)),
        DataType::Float => {
            let v = lenient::leading_float(value).unwrap_or(0.0);
            RpcValue::Double(clamp(v, desc))
        }
        DataType::Enum => {
            let index = value
                .as_str()
                .and_then(|label| desc.enum_index(label))
                .map(|i| Value::from(i as u64));
            to_integer(index.as_ref().unwrap_or(value), desc)
        }
        DataType::Integer => to_integer(value, desc),
        DataType::String => RpcValue::String(lenient::to_text(value)),
        DataType::Unknown => untyped(value),
    }
}

/// Parse a bulk paramset payload into its datapoint → value members
///
/// Anything but a JSON object is rejected so no partial write happens.
pub fn parse_bulk_payload(payload: &str) -> ConvResult<Map<String, Value>> {
    let doc: Value =
        serde_json::from_str(payload).map_err(|e| ConvError::InvalidJson(e.to_string()))?;
    match doc {
        Value::Object(members) => Ok(members),
        _ => Err(ConvError::NotAnObject),
    }
}

/// Text form of one bulk member, coerced like a single-value payload
///
/// ```
/// # use hmbridge_conv::stringify_value;
/// # use serde_json::json;
/// assert_eq!(stringify_value(&json!(50)), "50");
/// assert_eq!(stringify_value(&json!("UP")), "UP");
/// ```
pub fn stringify_value(value: &Value) -> String {
    lenient::to_text(value)
}

fn to_bool(value: &Value) -> bool {
    if value.as_str() == Some("false") {
        return false;
    }
    match lenient::to_number(value) {
        Some(n) => n != 0.0 && !n.is_nan(),
        None => lenient::is_truthy(value),
    }
}

fn to_integer(value: &Value, desc: &DatapointDescriptor) -> RpcValue {
    let v = lenient::leading_int(value).unwrap_or(0) as f64;
    // Float to int casts saturate, so out-of-range bounds cannot wrap
    RpcValue::Int(clamp(v, desc) as i32)
}

fn clamp(mut v: f64, desc: &DatapointDescriptor) -> f64 {
    if let Some(min) = desc.min {
        if v < min {
            v = min;
        }
    }
    if let Some(max) = desc.max {
        if v > max {
            v = max;
        }
    }
    v
}

fn untyped(value: &Value) -> RpcValue {
    match value {
        Value::Null => RpcValue::String(String::new()),
        other => RpcValue::from_json(other),
    }
}
