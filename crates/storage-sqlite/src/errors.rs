//! Error types for the sqlite storage crate.

use thiserror::Error;

/// Errors raised by the storage layer. Converted into the core error type
/// at the crate boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database query failed: {0}")]
    Diesel(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl From<StorageError> for taskstack_core::errors::Error {
    fn from(err: StorageError) -> Self {
        taskstack_core::errors::Error::Database(taskstack_core::errors::DatabaseError::QueryFailed(
            err.to_string(),
        ))
    }
}
