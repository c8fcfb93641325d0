//! # KV Errors
//!
//! Error types shared by every storage backend and the bulk orchestrators.

use thiserror::Error;

/// Result type for key-value operations
pub type KvResult<T> = Result<T, KvError>;

/// Key-value storage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    // ==================
    // Validation Errors
    // ==================
    /// Key is empty, `.`, `..`, or too long
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Any other malformed input (TTL, batch size, conflicting options)
    #[error("{0}")]
    Validation(String),

    /// Cursor could not be decoded or belongs to another prefix
    #[error("Invalid cursor")]
    InvalidCursor,

    // ==================
    // Lookup Errors
    // ==================
    /// Single-key read found nothing
    #[error("Key not found: {0}")]
    NotFound(String),

    // ==================
    // Backend Errors
    // ==================
    /// Backend rejected the call as rate limited; transient
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Any other lower-level fault (connectivity, constraint violation)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl KvError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            KvError::InvalidKey(_) => 400,
            KvError::Validation(_) => 400,
            KvError::InvalidCursor => 400,
            KvError::NotFound(_) => 404,
            KvError::RateLimited(_) => 429,
            KvError::Storage(_) => 500,
        }
    }

    /// Whether a retry of the same call may succeed
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, KvError::RateLimited(_))
    }

    /// Whether the caller supplied bad input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            KvError::InvalidKey(_) | KvError::Validation(_) | KvError::InvalidCursor
        )
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        KvError::Storage(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        KvError::Validation(msg.into())
    }
}

impl From<rusqlite::Error> for KvError {
    fn from(err: rusqlite::Error) -> Self {
        KvError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for KvError {
    fn from(err: tokio::task::JoinError) -> Self {
        KvError::Storage(format!("Storage task failed: {}", err))
    }
}
