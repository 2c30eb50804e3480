//! Paramset and datapoint descriptors

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::lenient_number;
use crate::error::DescriptorError;
use crate::value::RpcValue;

/// Datapoint may be read
pub const OPERATION_READ: u32 = 1;
/// Datapoint may be written
pub const OPERATION_WRITE: u32 = 2;
/// Datapoint emits events
pub const OPERATION_EVENT: u32 = 4;

/// Declared type of a datapoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Bool,
    Float,
    Integer,
    Enum,
    String,
    /// Momentary trigger (key presses); never retained on the bus
    Action,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Bool => "BOOL",
            DataType::Float => "FLOAT",
            DataType::Integer => "INTEGER",
            DataType::Enum => "ENUM",
            DataType::String => "STRING",
            DataType::Action => "ACTION",
            DataType::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Shape of a single datapoint, as returned by `getParamsetDescription`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatapointDescriptor {
    #[serde(rename = "TYPE")]
    pub data_type: DataType,
    /// Bitmask of [`OPERATION_READ`], [`OPERATION_WRITE`], [`OPERATION_EVENT`]
    #[serde(rename = "OPERATIONS", default)]
    pub operations: u32,
    #[serde(
        rename = "MIN",
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub min: Option<f64>,
    #[serde(
        rename = "MAX",
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub max: Option<f64>,
    #[serde(rename = "UNIT", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// ENUM labels, addressed by zero-based index
    #[serde(rename = "VALUE_LIST", default, skip_serializing_if = "Option::is_none")]
    pub value_list: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DatapointDescriptor {
    /// Minimal descriptor, mostly useful for tests and defaults
    pub fn new(data_type: DataType, operations: u32) -> Self {
        Self {
            data_type,
            operations,
            min: None,
            max: None,
            unit: None,
            value_list: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_value_list<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.value_list = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_readable(&self) -> bool {
        self.operations & OPERATION_READ != 0
    }

    pub fn is_writable(&self) -> bool {
        self.operations & OPERATION_WRITE != 0
    }

    /// Index of an ENUM label in the value list
    pub fn enum_index(&self, label: &str) -> Option<usize> {
        self.value_list
            .as_ref()
            .and_then(|labels| labels.iter().position(|l| l == label))
    }

    /// ENUM label at a given index
    pub fn enum_label(&self, index: i64) -> Option<&str> {
        let index = usize::try_from(index).ok()?;
        self.value_list
            .as_ref()
            .and_then(|labels| labels.get(index))
            .map(String::as_str)
    }
}

/// Datapoint name → descriptor for one paramset kind
pub type Paramset = BTreeMap<String, DatapointDescriptor>;

/// Paramset kind (`VALUES`, `MASTER`, ...) → paramset, for one [`ParamsetTypeKey`]
///
/// [`ParamsetTypeKey`]: super::ParamsetTypeKey
pub type ParamsetDescriptor = BTreeMap<String, Paramset>;

/// Parse a `getParamsetDescription` answer
///
/// Entries the controller describes in an unexpected shape are skipped with a
/// warning so one odd datapoint does not lose the whole paramset.
pub fn paramset_from_rpc(value: &RpcValue) -> Result<Paramset, DescriptorError> {
    let members = value
        .as_struct()
        .ok_or_else(|| DescriptorError::UnexpectedType {
            expected: "struct",
            actual: value.type_name(),
        })?;

    let mut paramset = Paramset::new();
    for (name, member) in members {
        match serde_json::from_value::<DatapointDescriptor>(member.to_json()) {
            Ok(desc) => {
                paramset.insert(name.clone(), desc);
            }
            Err(e) => warn!(datapoint = %name, error = %e, "Skipping malformed datapoint description"),
        }
    }
    Ok(paramset)
}
