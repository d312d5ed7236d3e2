//! Core error types for the CoinPulse edge service.
//!
//! This module defines storage-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use coinpulse_upstream::{ErrorEnvelope, ErrorKind, FetchError, InvalidResourceKey};
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the edge service.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageFailure),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] FetchError),

    #[error("Invalid upstream payload for {resource_key}: {message}")]
    InvalidPayload {
        resource_key: String,
        message: String,
    },

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn invalid_payload(resource_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            resource_key: resource_key.into(),
            message: message.into(),
        }
    }

    /// Client-facing envelope for upstream-side failures.
    ///
    /// Returns `None` for errors that are not upstream failures (bad input,
    /// storage, configuration); callers map those themselves.
    pub fn upstream_envelope(&self) -> Option<ErrorEnvelope> {
        match self {
            Error::Upstream(e) => Some(e.envelope()),
            Error::InvalidPayload {
                resource_key,
                message,
            } => Some(ErrorEnvelope {
                kind: ErrorKind::InvalidUpstreamPayload,
                message: format!("Upstream returned an unusable payload for {}", resource_key),
                detail: Some(message.clone()),
                retry_after_seconds: None,
            }),
            _ => None,
        }
    }

    /// Whether a stale cache entry may be served in place of this error.
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(self, Error::Upstream(_) | Error::InvalidPayload { .. })
    }
}

/// Storage-agnostic failure of the key-value layer.
///
/// Uses `String` details so the storage crate can convert Diesel/SQLite
/// errors into this type without leaking them.
#[derive(Error, Debug)]
pub enum StorageFailure {
    #[error("Failed to connect to storage: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create connection pool: {0}")]
    PoolCreationFailed(String),

    #[error("Storage query failed: {0}")]
    QueryFailed(String),

    #[error("Storage migration failed: {0}")]
    MigrationFailed(String),

    #[error("Stored value is malformed: {0}")]
    Malformed(String),

    #[error("Internal storage error: {0}")]
    Internal(String),
}

/// Validation errors for client input.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported {field} '{value}'")]
    Unsupported { field: &'static str, value: String },

    #[error(transparent)]
    ResourceKey(#[from] InvalidResourceKey),
}

impl From<InvalidResourceKey> for Error {
    fn from(err: InvalidResourceKey) -> Self {
        Error::Validation(ValidationError::ResourceKey(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(StorageFailure::Malformed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_errors_map_to_invalid_upstream_payload() {
        let err = Error::invalid_payload("price:bitcoin:usd", "missing price");
        let envelope = err.upstream_envelope().unwrap();

        assert_eq!(envelope.kind, ErrorKind::InvalidUpstreamPayload);
        assert_eq!(envelope.detail.as_deref(), Some("missing price"));
        assert!(err.allows_stale_fallback());
    }

    #[test]
    fn test_storage_errors_have_no_upstream_envelope() {
        let err = Error::from(StorageFailure::QueryFailed("locked".to_string()));

        assert!(err.upstream_envelope().is_none());
        assert!(!err.allows_stale_fallback());
    }
}
