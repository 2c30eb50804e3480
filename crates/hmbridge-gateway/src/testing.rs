//! In-memory collaborators for tests and dry runs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hmbridge_core::{BlobStore, BusError, LogicLayer, MessageBus, StoreError};
use parking_lot::Mutex;
use serde_json::Value;

/// One publish seen by [`RecordingBus`]
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl Published {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.payload).unwrap_or(Value::Null)
    }
}

/// Message bus that records publishes
#[derive(Default)]
pub struct RecordingBus {
    published: Mutex<Vec<Published>>,
    offline: AtomicBool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    /// Publishes to `topic`, oldest first
    pub fn on_topic(&self, topic: &str) -> Vec<Published> {
        self.published
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }

    /// Make publishes fail
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<(), BusError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BusError::NotConnected);
        }
        self.published.lock().push(Published {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }
}

/// Blob store backed by a map
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Value>>,
    saves: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, key: &str, value: Value) -> Self {
        self.blobs.lock().insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.blobs.lock().get(key).cloned()
    }

    /// Keys in the order they were saved
    pub fn saves(&self) -> Vec<String> {
        self.saves.lock().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.blobs.lock().insert(key.to_string(), value.clone());
        self.saves.lock().push(key.to_string());
        Ok(())
    }
}

/// Logic layer call seen by [`RecordingLogic`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicCall {
    Set { name: String, payload: String },
    Command(String),
    TriggerPoll,
}

/// Logic layer that records what it was asked to do
#[derive(Default)]
pub struct RecordingLogic {
    calls: Mutex<Vec<LogicCall>>,
}

impl RecordingLogic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<LogicCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LogicLayer for RecordingLogic {
    async fn set(&self, name: &str, payload: &str) {
        self.calls.lock().push(LogicCall::Set {
            name: name.to_string(),
            payload: payload.to_string(),
        });
    }

    async fn command(&self, name: &str) {
        self.calls.lock().push(LogicCall::Command(name.to_string()));
    }

    async fn trigger_poll(&self) {
        self.calls.lock().push(LogicCall::TriggerPoll);
    }
}
