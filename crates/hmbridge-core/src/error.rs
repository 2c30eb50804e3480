//! Common error types for the gateway collaborators

use thiserror::Error;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors raised by RPC clients, servers and codecs
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    /// Could not establish the underlying connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport has no open connection
    #[error("Not connected")]
    NotConnected,

    /// Reading or writing on an open connection failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote side answered with a fault
    #[error("RPC fault {code}: {message}")]
    Fault { code: i32, message: String },

    /// Malformed frame or document
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No answer within the allotted time
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl RpcError {
    /// Build a fault with the generic "method failed" code
    pub fn fault(message: impl Into<String>) -> Self {
        RpcError::Fault {
            code: -1,
            message: message.into(),
        }
    }
}

/// Errors raised by the message bus adapter
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Bus not connected")]
    NotConnected,
}

/// Errors raised by blob stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while reading descriptors sent by the controller
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid descriptor: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("expected {expected}, got {actual}")]
    UnexpectedType {
        expected: &'static str,
        actual: &'static str,
    },
}
