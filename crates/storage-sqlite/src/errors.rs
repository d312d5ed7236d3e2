//! Storage-specific error types for SQLite operations.
//!
//! This module provides error types that wrap Diesel-specific errors and convert
//! them to the storage-agnostic error types defined in `coinpulse_core`.

use coinpulse_core::errors::{Error, StorageFailure};
use diesel::result::Error as DieselError;
use thiserror::Error;

/// Storage-specific errors that wrap Diesel and r2d2 types.
///
/// These errors are internal to the storage layer and are converted to
/// `coinpulse_core::Error` before being returned to callers.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    CoreError(String),
}

/// Convert core Error to StorageError (for the write actor transaction wrapper)
impl From<Error> for StorageError {
    fn from(err: Error) -> Self {
        StorageError::CoreError(err.to_string())
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let failure = match err {
            StorageError::ConnectionFailed(e) => StorageFailure::ConnectionFailed(e.to_string()),
            StorageError::PoolError(e) => StorageFailure::PoolCreationFailed(e.to_string()),
            StorageError::QueryFailed(e) => StorageFailure::QueryFailed(e.to_string()),
            StorageError::MigrationFailed(e) => StorageFailure::MigrationFailed(e),
            StorageError::Io(e) => StorageFailure::ConnectionFailed(e.to_string()),
            // Already a stringified core error
            StorageError::CoreError(e) => StorageFailure::Internal(e),
        };
        Error::Storage(failure)
    }
}

/// Extension trait for converting Diesel Results to core Results.
pub trait IntoCore<T> {
    fn into_core(self) -> coinpulse_core::Result<T>;
}

impl<T> IntoCore<T> for std::result::Result<T, DieselError> {
    fn into_core(self) -> coinpulse_core::Result<T> {
        self.map_err(|e| StorageError::QueryFailed(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, r2d2::Error> {
    fn into_core(self) -> coinpulse_core::Result<T> {
        self.map_err(|e| StorageError::PoolError(e).into())
    }
}
