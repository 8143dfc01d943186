//! Error types and utilities for NATS operations.

use std::time::Duration;

/// Result type for all NATS operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for NATS operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// NATS client/connection errors
    #[error("NATS connection error: {0}")]
    Connection(#[from] async_nats::Error),

    /// Serialization errors when sending or receiving messages
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timeout
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Message delivery failed
    #[error("Message delivery failed to subject '{subject}': {reason}")]
    DeliveryFailed { subject: String, reason: String },

    /// Invalid configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Generic operation error with context
    #[error("NATS operation failed: {operation} - {details}")]
    Operation { operation: String, details: String },
}

impl Error {
    /// Create a delivery failed error
    pub fn delivery_failed(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Create an operation error with context
    pub fn operation(op: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Operation {
            operation: op.into(),
            details: details.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a timeout error with the given duration
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { timeout: duration }
    }
}

impl From<Error> for nvisy_core::Error {
    fn from(error: Error) -> Self {
        let base = match &error {
            Error::Serialization(_) => nvisy_core::Error::serialization(),
            Error::Timeout { .. } => nvisy_core::Error::timeout(),
            Error::InvalidConfig { .. } => nvisy_core::Error::configuration(),
            _ => nvisy_core::Error::storage(),
        };
        base.with_message(error.to_string()).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::ErrorKind;

    use super::*;

    #[test]
    fn maps_onto_store_error_kinds() {
        let error: nvisy_core::Error = Error::timeout(Duration::from_secs(3)).into();
        assert_eq!(error.kind(), ErrorKind::Timeout);

        let error: nvisy_core::Error = Error::operation("kv_put", "bucket gone").into();
        assert_eq!(error.kind(), ErrorKind::Storage);
        assert!(error.to_string().contains("bucket gone"));
    }
}
