//! Persistence abstraction

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Keyed JSON blob storage for descriptor caches
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Load a blob; `Ok(None)` when the key has never been saved
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}
