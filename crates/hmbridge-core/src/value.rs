//! Typed RPC values
//!
//! Both wire protocols (BIN-RPC and XML-RPC) share the same value model. A
//! double is always a distinct variant, so a value such as `50.0` is never
//! mistaken for an integer when it is written back to the controller.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde_json::{Number, Value};

/// A value as transported by the controller's RPC dialects
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RpcValue {
    Bool(bool),
    Int(i32),
    /// Explicit double; encoders always emit the floating point wire type
    Double(f64),
    String(String),
    Base64(Vec<u8>),
    /// ISO 8601 timestamp as sent by XML-RPC (`dateTime.iso8601`)
    DateTime(String),
    Array(Vec<RpcValue>),
    Struct(BTreeMap<String, RpcValue>),
    #[default]
    Nil,
}

impl RpcValue {
    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            RpcValue::Bool(_) => "bool",
            RpcValue::Int(_) => "int",
            RpcValue::Double(_) => "double",
            RpcValue::String(_) => "string",
            RpcValue::Base64(_) => "base64",
            RpcValue::DateTime(_) => "dateTime",
            RpcValue::Array(_) => "array",
            RpcValue::Struct(_) => "struct",
            RpcValue::Nil => "nil",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::String(s) | RpcValue::DateTime(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            RpcValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of ints, doubles and bools
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RpcValue::Int(i) => Some(f64::from(*i)),
            RpcValue::Double(d) => Some(*d),
            RpcValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RpcValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RpcValue]> {
        match self {
            RpcValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, RpcValue>> {
        match self {
            RpcValue::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Loose truth value: zero, empty and nil are false
    pub fn is_truthy(&self) -> bool {
        match self {
            RpcValue::Bool(b) => *b,
            RpcValue::Int(i) => *i != 0,
            RpcValue::Double(d) => *d != 0.0 && !d.is_nan(),
            RpcValue::String(s) => !s.is_empty(),
            RpcValue::Nil => false,
            _ => true,
        }
    }

    /// Look up a struct member
    pub fn get(&self, key: &str) -> Option<&RpcValue> {
        self.as_struct().and_then(|members| members.get(key))
    }

    /// Convert to JSON for bus payloads and descriptor parsing
    ///
    /// Base64 data is emitted as its encoded string; non-finite doubles become
    /// `null` since JSON cannot represent them.
    pub fn to_json(&self) -> Value {
        match self {
            RpcValue::Bool(b) => Value::Bool(*b),
            RpcValue::Int(i) => Value::Number((*i).into()),
            RpcValue::Double(d) => Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            RpcValue::String(s) | RpcValue::DateTime(s) => Value::String(s.clone()),
            RpcValue::Base64(data) => Value::String(BASE64_STANDARD.encode(data)),
            RpcValue::Array(items) => Value::Array(items.iter().map(RpcValue::to_json).collect()),
            RpcValue::Struct(members) => Value::Object(
                members
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            RpcValue::Nil => Value::Null,
        }
    }

    /// Convert untyped JSON into an RPC value
    ///
    /// Integral numbers that fit into 32 bits become `Int`, every other number
    /// becomes `Double`.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RpcValue::Nil,
            Value::Bool(b) => RpcValue::Bool(*b),
            Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => RpcValue::Int(i),
                None => RpcValue::Double(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => RpcValue::String(s.clone()),
            Value::Array(items) => RpcValue::Array(items.iter().map(RpcValue::from_json).collect()),
            Value::Object(members) => RpcValue::Struct(
                members
                    .iter()
                    .map(|(k, v)| (k.clone(), RpcValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for RpcValue {
    fn from(value: bool) -> Self {
        RpcValue::Bool(value)
    }
}

impl From<i32> for RpcValue {
    fn from(value: i32) -> Self {
        RpcValue::Int(value)
    }
}

impl From<f64> for RpcValue {
    fn from(value: f64) -> Self {
        RpcValue::Double(value)
    }
}

impl From<&str> for RpcValue {
    fn from(value: &str) -> Self {
        RpcValue::String(value.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(value: String) -> Self {
        RpcValue::String(value)
    }
}

impl From<Vec<RpcValue>> for RpcValue {
    fn from(value: Vec<RpcValue>) -> Self {
        RpcValue::Array(value)
    }
}

impl From<BTreeMap<String, RpcValue>> for RpcValue {
    fn from(value: BTreeMap<String, RpcValue>) -> Self {
        RpcValue::Struct(value)
    }
}
