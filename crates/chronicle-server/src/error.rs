// crates/chronicle-server/src/error.rs
// Standardized error types for Chronicle

use thiserror::Error;

/// Main error type for the Chronicle library
#[derive(Error, Debug)]
pub enum ChronicleError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid input: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("decay batch failed: {0}")]
    DecayBatch(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using ChronicleError
pub type Result<T> = std::result::Result<T, ChronicleError>;

impl ChronicleError {
    /// Build a validation error naming the offending field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ChronicleError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Convert to user-facing string for MCP tool boundaries
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }
}

impl From<String> for ChronicleError {
    fn from(s: String) -> Self {
        ChronicleError::Other(s)
    }
}

impl From<tokio::task::JoinError> for ChronicleError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            ChronicleError::Cancelled
        } else {
            ChronicleError::Other(err.to_string())
        }
    }
}

impl From<ChronicleError> for String {
    fn from(err: ChronicleError) -> Self {
        err.to_string()
    }
}
