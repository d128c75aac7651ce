//! Error types for the remote executor crate.

use thiserror::Error;

/// Result type alias for remote API operations.
pub type Result<T> = std::result::Result<T, RemoteApiError>;

/// Errors that can occur while talking to the backend.
#[derive(Debug, Error)]
pub enum RemoteApiError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success HTTP response from the backend
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The backend answered 200 but reported query-level errors
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// The response body did not carry the expected data shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteApiError {
    /// Create an API error from status and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RemoteApiError> for taskstack_core::errors::RemoteError {
    fn from(err: RemoteApiError) -> Self {
        match err.status_code() {
            Some(status) => taskstack_core::errors::RemoteError::with_code(
                err.to_string(),
                status.to_string(),
            ),
            None => taskstack_core::errors::RemoteError::new(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_carries_status_into_core_code() {
        let err = RemoteApiError::api(422, "validation failed");
        let core: taskstack_core::errors::RemoteError = err.into();
        assert_eq!(core.code.as_deref(), Some("422"));
    }
}
