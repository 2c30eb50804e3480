//! Message bus abstraction

use async_trait::async_trait;

use crate::error::BusError;

/// Publish side of the message bus
///
/// The bus client owns its own reconnect behaviour; the gateway only
/// publishes and is told about lifecycle changes.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<(), BusError>;
}
