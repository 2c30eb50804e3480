//! Gateway error types

use hmbridge_conv::ConvError;
use hmbridge_core::RpcError;
use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised while routing bus commands and controller callbacks
///
/// These never escape the engine: they are logged where a command or
/// callback enters it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unknown interface: {0}")]
    UnknownInterface(String),

    #[error("Not writeable: {address} {paramset}.{datapoint}")]
    NotWriteable {
        address: String,
        paramset: String,
        datapoint: String,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] ConvError),

    #[error("Invalid parameters for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}

impl GatewayError {
    pub fn invalid_params(method: &str, reason: impl Into<String>) -> Self {
        GatewayError::InvalidParams {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}
