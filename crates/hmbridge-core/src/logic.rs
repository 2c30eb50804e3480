//! Logic layer (controller scripting engine) hooks

use async_trait::async_trait;
use tracing::debug;

/// Collaborator that owns variables, programs and name sync on the controller
#[async_trait]
pub trait LogicLayer: Send + Sync {
    /// Write a variable or start a program by name
    async fn set(&self, name: &str, payload: &str);

    /// Run a named command (e.g. `regasync`)
    async fn command(&self, name: &str);

    /// Re-read variables and programs after the configured trigger fired
    async fn trigger_poll(&self);
}

/// Logic layer that only logs what it was asked to do
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLogicLayer;

#[async_trait]
impl LogicLayer for NoLogicLayer {
    async fn set(&self, name: &str, payload: &str) {
        debug!(name, payload, "Logic layer disabled, ignoring set");
    }

    async fn command(&self, name: &str) {
        debug!(name, "Logic layer disabled, ignoring command");
    }

    async fn trigger_poll(&self) {
        debug!("Logic layer disabled, ignoring poll trigger");
    }
}
