//! RPC event value → bus status payload

use hmbridge_core::{DataType, DatapointDescriptor, RpcValue};
use serde::Serialize;
use serde_json::Value;

/// Unit as reported by controllers that mangle the degree sign
const MANGLED_CELSIUS: &str = "\u{FFFD}C";

/// Status payload published for every event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPayload {
    pub val: Value,
    /// Event receive time (ms since epoch)
    pub ts: i64,
    /// Time the value last changed (ms since epoch)
    pub lc: i64,
    pub hm: EventMeta,
}

/// Controller-side metadata attached to a status payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMeta {
    #[serde(rename = "ADDRESS")]
    pub address: String,
    #[serde(rename = "UNIT", skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "ENUM", skip_serializing_if = "Option::is_none")]
    pub enum_label: Option<String>,
}

impl EventPayload {
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Build the status payload for an event
pub fn event_payload(
    address: &str,
    value: &RpcValue,
    desc: Option<&DatapointDescriptor>,
    ts: i64,
    lc: i64,
) -> EventPayload {
    let unit = desc.and_then(|d| d.unit.as_deref()).and_then(fix_unit);
    let enum_label = desc
        .filter(|d| d.data_type == DataType::Enum)
        .and_then(|d| value.as_f64().and_then(|i| d.enum_label(i as i64)))
        .map(str::to_string);

    EventPayload {
        val: value.to_json(),
        ts,
        lc,
        hm: EventMeta {
            address: address.to_string(),
            unit,
            enum_label,
        },
    }
}

/// Normalize a declared unit; empty and quoted-empty units are dropped
///
/// ```
/// # use hmbridge_conv::fix_unit;
/// assert_eq!(fix_unit("\u{FFFD}C").as_deref(), Some("°C"));
/// assert_eq!(fix_unit("%").as_deref(), Some("%"));
/// assert_eq!(fix_unit("\"\""), None);
/// ```
pub fn fix_unit(unit: &str) -> Option<String> {
    match unit {
        "" | "\"\"" => None,
        MANGLED_CELSIUS => Some("°C".to_string()),
        other => Some(other.to_string()),
    }
}

/// Whether a status publish is retained; actions are momentary
pub fn is_retained(retain: bool, desc: Option<&DatapointDescriptor>) -> bool {
    retain && desc.map_or(true, |d| d.data_type != DataType::Action)
}
