//! Error types for session storage

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Session not found
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
