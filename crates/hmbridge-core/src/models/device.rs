//! Device and channel descriptors

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::empty_as_none;
use crate::error::DescriptorError;
use crate::value::RpcValue;

/// Key shared by all channels with an identical paramset shape
///
/// Built as `parentType/version/type`. Paramset descriptions are fetched once
/// per key, never once per channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamsetTypeKey(String);

impl ParamsetTypeKey {
    pub fn new(parent_type: &str, version: i32, type_name: &str) -> Self {
        Self(format!("{}/{}/{}", parent_type, version, type_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParamsetTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A controller device or one of its channels, as announced by `newDevices`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    #[serde(rename = "ADDRESS")]
    pub address: String,
    /// Set for channels only; root devices have no parent type
    #[serde(
        rename = "PARENT_TYPE",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_type: Option<String>,
    #[serde(rename = "VERSION", default)]
    pub version: i32,
    #[serde(rename = "TYPE", default)]
    pub type_name: String,
    #[serde(
        rename = "PARENT",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent: Option<String>,
    #[serde(rename = "CHILDREN", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// Paramset kinds this device exposes (e.g. `MASTER`, `VALUES`)
    #[serde(rename = "PARAMSETS", default)]
    pub paramsets: Vec<String>,
    /// Remaining fields are kept verbatim for persistence and metadata publishing
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DeviceDescriptor {
    /// Parse a descriptor struct received over RPC
    pub fn from_rpc(value: &RpcValue) -> Result<Self, DescriptorError> {
        if value.as_struct().is_none() {
            return Err(DescriptorError::UnexpectedType {
                expected: "struct",
                actual: value.type_name(),
            });
        }
        Ok(serde_json::from_value(value.to_json())?)
    }

    /// Channels carry behaviour paramsets; root devices do not
    pub fn is_channel(&self) -> bool {
        self.parent_type.is_some()
    }

    pub fn paramset_type_key(&self) -> ParamsetTypeKey {
        ParamsetTypeKey::new(
            self.parent_type.as_deref().unwrap_or_default(),
            self.version,
            &self.type_name,
        )
    }

    /// The `{ADDRESS, VERSION}` entry answered to `listDevices`
    pub fn summary(&self) -> RpcValue {
        let mut members = BTreeMap::new();
        members.insert("ADDRESS".to_string(), RpcValue::from(self.address.as_str()));
        members.insert("VERSION".to_string(), RpcValue::Int(self.version));
        RpcValue::Struct(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel_value() -> RpcValue {
        RpcValue::from_json(&json!({
            "ADDRESS": "ABC1234:1",
            "PARENT": "ABC1234",
            "PARENT_TYPE": "HmIP-BROLL",
            "TYPE": "SHUTTER_VIRTUAL_RECEIVER",
            "VERSION": 12,
            "PARAMSETS": ["MASTER", "VALUES", "LINK"],
            "FLAGS": 1
        }))
    }

    #[test]
    fn test_from_rpc_channel() {
        let dev = DeviceDescriptor::from_rpc(&channel_value()).unwrap();
        assert_eq!(dev.address, "ABC1234:1");
        assert!(dev.is_channel());
        assert_eq!(
            dev.paramset_type_key().as_str(),
            "HmIP-BROLL/12/SHUTTER_VIRTUAL_RECEIVER"
        );
        assert_eq!(dev.paramsets, vec!["MASTER", "VALUES", "LINK"]);
        assert_eq!(dev.extra.get("FLAGS"), Some(&json!(1)));
    }

    #[test]
    fn test_root_device_has_no_parent_type() {
        let value = RpcValue::from_json(&json!({
            "ADDRESS": "ABC1234",
            "PARENT": "",
            "PARENT_TYPE": "",
            "TYPE": "HmIP-BROLL",
            "VERSION": 12,
            "CHILDREN": ["ABC1234:0", "ABC1234:1"],
            "PARAMSETS": ["MASTER"]
        }));
        let dev = DeviceDescriptor::from_rpc(&value).unwrap();
        assert!(!dev.is_channel());
        assert_eq!(dev.parent, None);
        assert_eq!(dev.children.len(), 2);
    }

    #[test]
    fn test_persisted_form_roundtrips_extra_fields() {
        let dev = DeviceDescriptor::from_rpc(&channel_value()).unwrap();
        let stored = serde_json::to_value(&dev).unwrap();
        assert_eq!(stored["PARENT_TYPE"], json!("HmIP-BROLL"));
        assert_eq!(stored["FLAGS"], json!(1));
        let restored: DeviceDescriptor = serde_json::from_value(stored).unwrap();
        assert_eq!(restored, dev);
    }

    #[test]
    fn test_from_rpc_rejects_non_struct() {
        let err = DeviceDescriptor::from_rpc(&RpcValue::from("ABC")).unwrap_err();
        assert!(matches!(err, DescriptorError::UnexpectedType { .. }));
    }

    #[test]
    fn test_summary() {
        let dev = DeviceDescriptor::from_rpc(&channel_value()).unwrap();
        let summary = dev.summary();
        assert_eq!(summary.get("ADDRESS"), Some(&RpcValue::from("ABC1234:1")));
        assert_eq!(summary.get("VERSION"), Some(&RpcValue::Int(12)));
    }
}
