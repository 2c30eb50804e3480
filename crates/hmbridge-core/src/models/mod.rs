//! Shared data models for controller metadata

mod device;
mod paramset;

pub use device::*;
pub use paramset::*;

use serde::{Deserialize, Deserializer};

/// Treat an empty string the same as an absent field
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Accept any JSON value and keep it only when it is a number
///
/// The controller reports `MIN`/`MAX` as booleans or strings for non-numeric
/// datapoints.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}
