//! Address ↔ display name mapping

use std::collections::{BTreeMap, HashMap};

/// Bidirectional mapping between channel addresses and display names
///
/// Lookups never fail: an unknown address is displayed as itself, and an
/// unknown name is treated as an address.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: BTreeMap<String, String>,
    addresses: HashMap<String, String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an `address → name` map
    pub fn from_map(names: BTreeMap<String, String>) -> Self {
        let addresses = names
            .iter()
            .map(|(address, name)| (name.clone(), address.clone()))
            .collect();
        Self { names, addresses }
    }

    /// Parse an `{"ADDRESS": "name", ...}` JSON object; non-string values are skipped
    pub fn from_json(value: &serde_json::Value) -> Self {
        let names = value
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Self::from_map(names)
    }

    pub fn display_name<'a>(&'a self, address: &'a str) -> &'a str {
        self.names.get(address).map(String::as_str).unwrap_or(address)
    }

    pub fn resolve_address<'a>(&'a self, name: &'a str) -> &'a str {
        self.addresses.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.names
    }
}
