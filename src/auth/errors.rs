//! # Auth Errors
//!
//! Error types for request authentication. Messages name a category only;
//! they never echo the presented token or signature.

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    // ==================
    // Client Errors
    // ==================
    /// Neither a bearer token nor a complete signature header pair
    #[error("Missing authentication")]
    MissingCredentials,

    /// Bearer token does not match the configured secret
    #[error("Invalid token")]
    InvalidToken,

    /// Timestamp unparseable or outside the replay window
    #[error("Timestamp expired")]
    TimestampExpired,

    /// HMAC signature does not match
    #[error("Invalid signature")]
    InvalidSignature,

    // ==================
    // Server Errors
    // ==================
    /// No shared secret configured on this server
    #[error("Authentication not configured")]
    NotConfigured,
}

impl AuthError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MissingCredentials => 401,
            AuthError::InvalidToken => 401,
            AuthError::TimestampExpired => 401,
            AuthError::InvalidSignature => 401,
            AuthError::NotConfigured => 500,
        }
    }

    /// Short hint returned alongside the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            AuthError::MissingCredentials => Some(
                "Send 'Authorization: Bearer <secret>' or 'X-Signature' with 'X-Timestamp'",
            ),
            AuthError::TimestampExpired => {
                Some("X-Timestamp must be epoch milliseconds within 5 minutes of server time")
            }
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
