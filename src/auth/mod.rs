//! # Auth Module
//!
//! Shared-secret request authentication: bearer tokens, or HMAC-SHA256
//! request signatures with a replay window.

pub mod errors;
pub mod crypto;
pub mod gate;

pub use errors::{AuthError, AuthResult};
pub use crypto::sign_request;
pub use gate::{AuthGate, AuthMode, AuthRequest, PUBLIC_PATHS, SIGNATURE_WINDOW_MS};
