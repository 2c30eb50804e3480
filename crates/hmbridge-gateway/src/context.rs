//! State shared by the dispatcher, the router and the interface tasks

use std::collections::HashMap;
use std::sync::Arc;

use hmbridge_core::topics::{connected_topic, metadata_topic};
use hmbridge_core::{BlobStore, LogicLayer, MessageBus, NameTable, RpcValue};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::connection::InterfaceConnection;
use crate::fetch_queue::FetchQueue;
use crate::registry::{devices_key, paramsets_key, MetadataRegistry};
use crate::timers::DebounceTimers;
use crate::values::ValueTracker;

/// Everything the gateway knows, owned in one place
///
/// Locks guard short synchronous sections only and are never held across
/// an `.await`.
pub struct GatewayContext {
    pub(crate) config: GatewayConfig,
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) store: Arc<dyn BlobStore>,
    pub(crate) logic: Arc<dyn LogicLayer>,
    pub(crate) registry: MetadataRegistry,
    pub(crate) values: ValueTracker,
    pub(crate) names: RwLock<NameTable>,
    pub(crate) connections: HashMap<String, Arc<InterfaceConnection>>,
    pub(crate) fetch_queues: HashMap<String, FetchQueue>,
    /// Channel address → last `WORKING`/`DIRECTION` reading
    pub(crate) working: Mutex<HashMap<String, bool>>,
    pub(crate) notworking_timers: DebounceTimers<String>,
    pub(crate) rebuild_timers: DebounceTimers<String>,
    /// Last published aggregate; `None` before the first publish
    pub(crate) all_connected: Mutex<Option<bool>>,
}

impl GatewayContext {
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn connection(&self, interface: &str) -> Option<&Arc<InterfaceConnection>> {
        self.connections.get(interface)
    }

    /// Publish, logging instead of failing
    pub(crate) async fn publish(&self, topic: &str, payload: String, retain: bool) {
        match self.bus.publish(topic, payload, retain).await {
            Ok(()) => debug!(topic, retain, "Published"),
            Err(e) => error!(topic, error = %e, "Publish failed"),
        }
    }

    /// Display name of an address
    pub(crate) fn display_name(&self, address: &str) -> String {
        self.names.read().display_name(address).to_string()
    }

    /// Address behind a topic segment
    pub(crate) fn resolve_address(&self, segment: &str) -> String {
        self.names.read().resolve_address(segment).to_string()
    }

    /// Every configured interface is registered
    pub fn all_connected(&self) -> bool {
        !self.connections.is_empty() && self.connections.values().all(|c| c.is_connected())
    }

    fn connected_payload(all_connected: bool) -> String {
        if all_connected { "2" } else { "1" }.to_string()
    }

    /// Republish `{name}/connected` if the aggregate changed
    pub(crate) async fn refresh_connected(&self) {
        let current = self.all_connected();
        let changed = {
            let mut last = self.all_connected.lock();
            let changed = *last != Some(current);
            *last = Some(current);
            changed
        };
        if changed {
            info!(all_connected = current, "Interface aggregate changed");
            self.publish(
                &connected_topic(&self.config.name),
                Self::connected_payload(current),
                self.config.retain,
            )
            .await;
        }
    }

    /// Publish the current aggregate regardless of change
    pub(crate) async fn announce_connected(&self) {
        let current = self.all_connected();
        *self.all_connected.lock() = Some(current);
        self.publish(
            &connected_topic(&self.config.name),
            Self::connected_payload(current),
            self.config.retain,
        )
        .await;
    }

    /// Load persisted device maps and the paramset cache
    pub(crate) async fn load_persisted(&self) {
        let ccu = &self.config.ccu_address;
        for interface in self.connections.keys() {
            let key = devices_key(ccu, interface);
            match self.store.load(&key).await {
                Ok(Some(value)) => match self.registry.load_devices(interface, &value) {
                    Ok(count) => info!(interface = %interface, count, "Loaded devices"),
                    Err(e) => warn!(key = %key, error = %e, "Ignoring persisted devices"),
                },
                Ok(None) => debug!(key = %key, "No persisted devices"),
                Err(e) => error!(key = %key, error = %e, "Loading devices failed"),
            }
        }

        let key = paramsets_key(ccu);
        match self.store.load(&key).await {
            Ok(Some(value)) => match self.registry.load_paramsets(&value) {
                Ok(count) => info!(count, "Loaded paramset descriptions"),
                Err(e) => warn!(key = %key, error = %e, "Ignoring persisted paramset descriptions"),
            },
            Ok(None) => debug!(key = %key, "No persisted paramset descriptions"),
            Err(e) => error!(key = %key, error = %e, "Loading paramset descriptions failed"),
        }
    }

    pub(crate) async fn persist_devices(&self, interface: &str) {
        let key = devices_key(&self.config.ccu_address, interface);
        debug!(key = %key, count = self.registry.device_count(interface), "Saving devices");
        if let Err(e) = self.store.save(&key, &self.registry.devices_json(interface)).await {
            error!(key = %key, error = %e, "Saving devices failed");
        }
    }

    pub(crate) async fn persist_paramsets(&self) {
        let key = paramsets_key(&self.config.ccu_address);
        debug!(key = %key, "Saving paramset descriptions");
        if let Err(e) = self.store.save(&key, &self.registry.paramsets_json()).await {
            error!(key = %key, error = %e, "Saving paramset descriptions failed");
        }
    }

    /// Rebuild the fetch queue of `interface` once it has been quiet for a while
    pub(crate) fn schedule_rebuild(self: &Arc<Self>, interface: &str) {
        let ctx = Arc::clone(self);
        let iface = interface.to_string();
        self.rebuild_timers.schedule(
            interface.to_string(),
            self.config.rebuild_delay,
            async move { ctx.rebuild(&iface).await },
        );
    }

    /// Queue fetches for unknown type keys and drain unless a drain is running
    pub async fn rebuild(&self, interface: &str) {
        let (Some(queue), Some(conn)) = (
            self.fetch_queues.get(interface),
            self.connections.get(interface),
        ) else {
            error!(interface, "Fetch queue requested for unknown interface");
            return;
        };

        info!(
            interface,
            devices = self.registry.device_count(interface),
            "Rebuilding paramset fetch queue"
        );
        let jobs = self.registry.claim_missing(interface);
        if !queue.enqueue(jobs) {
            debug!(interface, pending = queue.len(), "Appended to running fetch queue");
            return;
        }

        while let Some(job) = queue.next() {
            debug!(interface, address = %job.address, kind = %job.kind, type_key = %job.type_key,
                   "getParamsetDescription");
            let params = vec![
                RpcValue::from(job.address.as_str()),
                RpcValue::from(job.kind.as_str()),
            ];
            match conn.client().call("getParamsetDescription", params).await {
                Ok(value) => self.registry.set_paramset(&job.type_key, &job.kind, &value),
                Err(e) => warn!(interface, address = %job.address, kind = %job.kind, error = %e,
                                "getParamsetDescription failed"),
            }
            tokio::time::sleep(self.config.fetch_delay).await;
        }

        info!(interface, count = self.registry.paramset_count(), "Paramset descriptions complete");
        self.persist_paramsets().await;
        if self.config.publish_metadata {
            self.publish_metadata(interface).await;
        }
    }

    /// Publish `db/extend/{name}/<address>` for every device of an interface
    pub(crate) async fn publish_metadata(&self, interface: &str) {
        info!(interface, "Publishing metadata");
        for device in self.registry.devices(interface) {
            let mut native = serde_json::to_value(&device).unwrap_or(Value::Null);
            if let (Value::Object(map), Some(desc)) = (
                &mut native,
                self.registry.paramset_descriptor(&device.paramset_type_key()),
            ) {
                map.insert(
                    "PARAMSET_DESCRIPTIONS".to_string(),
                    serde_json::to_value(desc).unwrap_or(Value::Null),
                );
            }
            let payload = json!({
                "name": self.display_name(&device.address),
                "type": if device.is_channel() { "channel" } else { "device" },
                "interface": "homematic",
                "native": native,
            });
            self.publish(
                &metadata_topic(&self.config.name, &device.address),
                payload.to_string(),
                false,
            )
            .await;
        }
    }
}
