//! Device and paramset descriptor cache

use std::collections::{BTreeMap, HashMap};

use hmbridge_core::{
    paramset_from_rpc, DatapointDescriptor, DescriptorError, DeviceDescriptor, Paramset,
    ParamsetDescriptor, ParamsetTypeKey, RpcValue,
};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::fetch_queue::FetchJob;

/// Paramset kind carrying the live datapoints of a channel
pub const VALUES_PARAMSET: &str = "VALUES";

/// Persistence key of one interface's device map
pub fn devices_key(ccu_address: &str, interface: &str) -> String {
    format!("devices_{}_{}", ccu_address, interface)
}

/// Persistence key of the paramset descriptor cache
pub fn paramsets_key(ccu_address: &str) -> String {
    format!("paramsetDescriptions_{}", ccu_address)
}

/// Result of looking up the descriptor of an incoming event
#[derive(Debug, Clone, PartialEq)]
pub enum EventDescriptor {
    Found(DatapointDescriptor),
    /// The device's type key was never fetched
    NoDescriptor(ParamsetTypeKey),
    /// Fetched, but without a `VALUES` paramset
    NoValues(ParamsetTypeKey),
    NoDatapoint(ParamsetTypeKey),
}

impl EventDescriptor {
    pub fn descriptor(&self) -> Option<&DatapointDescriptor> {
        match self {
            EventDescriptor::Found(desc) => Some(desc),
            _ => None,
        }
    }
}

/// Per-interface device maps plus the shared paramset descriptor cache
#[derive(Default)]
pub struct MetadataRegistry {
    devices: RwLock<HashMap<String, BTreeMap<String, DeviceDescriptor>>>,
    paramsets: RwLock<BTreeMap<ParamsetTypeKey, ParamsetDescriptor>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an interface's devices with a persisted `address → descriptor` map
    pub fn load_devices(&self, interface: &str, persisted: &Value) -> Result<usize, DescriptorError> {
        let map: BTreeMap<String, DeviceDescriptor> = serde_json::from_value(persisted.clone())?;
        let count = map.len();
        self.devices.write().insert(interface.to_string(), map);
        Ok(count)
    }

    /// Replace the paramset cache with a persisted one
    pub fn load_paramsets(&self, persisted: &Value) -> Result<usize, DescriptorError> {
        let cache: BTreeMap<ParamsetTypeKey, ParamsetDescriptor> =
            serde_json::from_value(persisted.clone())?;
        let count = cache.len();
        *self.paramsets.write() = cache;
        Ok(count)
    }

    /// Insert or replace devices by address
    pub fn upsert_devices(&self, interface: &str, descriptors: Vec<DeviceDescriptor>) {
        let mut devices = self.devices.write();
        let map = devices.entry(interface.to_string()).or_default();
        for desc in descriptors {
            map.insert(desc.address.clone(), desc);
        }
    }

    pub fn remove_devices(&self, interface: &str, addresses: &[String]) {
        if let Some(map) = self.devices.write().get_mut(interface) {
            for address in addresses {
                map.remove(address);
            }
        }
    }

    pub fn device_count(&self, interface: &str) -> usize {
        self.devices.read().get(interface).map_or(0, BTreeMap::len)
    }

    pub fn device(&self, interface: &str, address: &str) -> Option<DeviceDescriptor> {
        self.devices
            .read()
            .get(interface)
            .and_then(|map| map.get(address))
            .cloned()
    }

    /// Interface owning `address`; with duplicates the last interface by name wins
    pub fn find_interface(&self, address: &str) -> Option<String> {
        let devices = self.devices.read();
        let mut interfaces: Vec<&String> = devices.keys().collect();
        interfaces.sort();
        interfaces
            .into_iter()
            .filter(|iface| devices[*iface].contains_key(address))
            .last()
            .cloned()
    }

    /// Interface and descriptor of `address`
    pub fn locate(&self, address: &str) -> Option<(String, DeviceDescriptor)> {
        let interface = self.find_interface(address)?;
        let desc = self.device(&interface, address)?;
        Some((interface, desc))
    }

    /// `{ADDRESS, VERSION}` of every known device, answered to `listDevices`
    pub fn summaries(&self, interface: &str) -> Vec<RpcValue> {
        self.devices
            .read()
            .get(interface)
            .map(|map| map.values().map(DeviceDescriptor::summary).collect())
            .unwrap_or_default()
    }

    /// Snapshot of one interface's devices for persistence
    pub fn devices_json(&self, interface: &str) -> Value {
        let devices = self.devices.read();
        let empty = BTreeMap::new();
        serde_json::to_value(devices.get(interface).unwrap_or(&empty)).unwrap_or(Value::Null)
    }

    pub fn paramsets_json(&self) -> Value {
        serde_json::to_value(&*self.paramsets.read()).unwrap_or(Value::Null)
    }

    /// Devices of an interface, ordered by address
    pub fn devices(&self, interface: &str) -> Vec<DeviceDescriptor> {
        self.devices
            .read()
            .get(interface)
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Claim every channel type key not yet in the cache
    ///
    /// Claimed keys get an empty placeholder so later rebuilds skip them,
    /// and one job per declared paramset kind is returned.
    pub fn claim_missing(&self, interface: &str) -> Vec<FetchJob> {
        let devices = self.devices.read();
        let Some(map) = devices.get(interface) else {
            return Vec::new();
        };

        let mut paramsets = self.paramsets.write();
        let mut jobs = Vec::new();
        for desc in map.values().filter(|d| d.is_channel()) {
            let key = desc.paramset_type_key();
            if paramsets.contains_key(&key) {
                continue;
            }
            debug!(interface, type_key = %key, kinds = ?desc.paramsets, "Unknown paramset type");
            paramsets.insert(key.clone(), ParamsetDescriptor::new());
            jobs.extend(desc.paramsets.iter().map(|kind| FetchJob {
                address: desc.address.clone(),
                kind: kind.clone(),
                type_key: key.clone(),
            }));
        }
        jobs
    }

    /// Store a fetched `getParamsetDescription` answer
    pub fn set_paramset(&self, key: &ParamsetTypeKey, kind: &str, value: &RpcValue) {
        match paramset_from_rpc(value) {
            Ok(paramset) => {
                self.paramsets
                    .write()
                    .entry(key.clone())
                    .or_default()
                    .insert(kind.to_string(), paramset);
            }
            Err(e) => warn!(type_key = %key, kind, error = %e, "Discarding paramset description"),
        }
    }

    pub fn paramset_count(&self) -> usize {
        self.paramsets.read().len()
    }

    /// Paramset `kind` of a type key, if fetched
    pub fn paramset(&self, key: &ParamsetTypeKey, kind: &str) -> Option<Paramset> {
        self.paramsets
            .read()
            .get(key)
            .and_then(|desc| desc.get(kind))
            .cloned()
    }

    pub fn paramset_descriptor(&self, key: &ParamsetTypeKey) -> Option<ParamsetDescriptor> {
        self.paramsets.read().get(key).cloned()
    }

    pub fn datapoint(
        &self,
        key: &ParamsetTypeKey,
        kind: &str,
        datapoint: &str,
    ) -> Option<DatapointDescriptor> {
        self.paramsets
            .read()
            .get(key)
            .and_then(|desc| desc.get(kind))
            .and_then(|paramset| paramset.get(datapoint))
            .cloned()
    }

    /// Descriptor of a `VALUES` datapoint, distinguishing why it is missing
    pub fn event_descriptor(&self, key: &ParamsetTypeKey, datapoint: &str) -> EventDescriptor {
        let paramsets = self.paramsets.read();
        let Some(desc) = paramsets.get(key) else {
            return EventDescriptor::NoDescriptor(key.clone());
        };
        let Some(values) = desc.get(VALUES_PARAMSET) else {
            return EventDescriptor::NoValues(key.clone());
        };
        match values.get(datapoint) {
            Some(dp) => EventDescriptor::Found(dp.clone()),
            None => EventDescriptor::NoDatapoint(key.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn descriptor(value: Value) -> DeviceDescriptor {
        serde_json::from_value(value).unwrap()
    }

    fn shutter_devices() -> Vec<DeviceDescriptor> {
        vec![
            descriptor(json!({"ADDRESS": "ABC1234", "TYPE": "HmIP-BROLL", "VERSION": 12,
                              "PARAMSETS": ["MASTER"], "CHILDREN": ["ABC1234:1"]})),
            descriptor(json!({"ADDRESS": "ABC1234:1", "PARENT": "ABC1234",
                              "PARENT_TYPE": "HmIP-BROLL", "TYPE": "SHUTTER", "VERSION": 12,
                              "PARAMSETS": ["MASTER", "VALUES"]})),
            descriptor(json!({"ADDRESS": "DEF5678:1", "PARENT": "DEF5678",
                              "PARENT_TYPE": "HmIP-BROLL", "TYPE": "SHUTTER", "VERSION": 12,
                              "PARAMSETS": ["MASTER", "VALUES"]})),
        ]
    }

    #[test]
    fn test_keys() {
        assert_eq!(devices_key("10.0.0.5", "rfd"), "devices_10.0.0.5_rfd");
        assert_eq!(paramsets_key("10.0.0.5"), "paramsetDescriptions_10.0.0.5");
    }

    #[test]
    fn test_claim_missing_once_per_type_key() {
        let registry = MetadataRegistry::new();
        registry.upsert_devices("hmip", shutter_devices());

        let jobs = registry.claim_missing("hmip");
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.address == "ABC1234:1"));
        assert_eq!(jobs[0].type_key.as_str(), "HmIP-BROLL/12/SHUTTER");
        assert_eq!(jobs[1].kind, "VALUES");

        assert!(registry.claim_missing("hmip").is_empty());
        assert!(registry.claim_missing("rfd").is_empty());
    }

    #[test]
    fn test_event_descriptor_lookup() {
        let registry = MetadataRegistry::new();
        registry.upsert_devices("hmip", shutter_devices());
        let key = ParamsetTypeKey::new("HmIP-BROLL", 12, "SHUTTER");
        assert_eq!(
            registry.event_descriptor(&key, "LEVEL"),
            EventDescriptor::NoDescriptor(key.clone())
        );

        registry.claim_missing("hmip");
        assert_eq!(
            registry.event_descriptor(&key, "LEVEL"),
            EventDescriptor::NoValues(key.clone())
        );

        registry.set_paramset(
            &key,
            VALUES_PARAMSET,
            &RpcValue::from_json(&json!({"LEVEL": {"TYPE": "FLOAT", "OPERATIONS": 7}})),
        );
        assert!(registry.event_descriptor(&key, "LEVEL").descriptor().is_some());
        assert_eq!(
            registry.event_descriptor(&key, "STOP"),
            EventDescriptor::NoDatapoint(key.clone())
        );
        assert!(registry.datapoint(&key, VALUES_PARAMSET, "LEVEL").unwrap().is_writable());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let registry = MetadataRegistry::new();
        registry.upsert_devices("hmip", shutter_devices());
        registry.remove_devices("hmip", &["DEF5678:1".to_string()]);
        let snapshot = registry.devices_json("hmip");

        let restored = MetadataRegistry::new();
        assert_eq!(restored.load_devices("hmip", &snapshot).unwrap(), 2);
        assert_eq!(restored.find_interface("ABC1234:1").as_deref(), Some("hmip"));
        assert_eq!(restored.find_interface("DEF5678:1"), None);
        assert_eq!(restored.summaries("hmip")[0].get("VERSION"), Some(&RpcValue::Int(12)));
    }
}
