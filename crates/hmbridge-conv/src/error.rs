//! Error types for value conversion

use thiserror::Error;

/// Result type for conversion operations
pub type ConvResult<T> = Result<T, ConvError>;

/// Conversion errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConvError {
    /// Payload could not be parsed as JSON
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    /// Bulk writes require a JSON object of datapoint → value
    #[error("Payload is not a JSON object")]
    NotAnObject,
}
