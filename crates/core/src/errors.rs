//! Error types for the taskstack core.

use thiserror::Error;

/// Result type alias used across the core.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage-layer failure categories surfaced through the core error type.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A query against the local store failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Anything else the storage layer could not express more precisely.
    #[error("{0}")]
    Internal(String),
}

/// Failure reported by a remote executor call.
///
/// Carried back to the caller of a direct online write; absorbed and
/// counted when it happens during a background drain.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    /// Backend error code, when the API provided one.
    pub code: Option<String>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

/// Errors that can occur in the sync core.
#[derive(Debug, Error)]
pub enum Error {
    /// Local store failure.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Remote call failure during a direct online write.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Payload or snapshot (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The referenced entity is not present in the local projection.
    #[error("Not found: {0}")]
    NotFound(String),
}
