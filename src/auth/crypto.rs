//! # Cryptographic Utilities
//!
//! Request signing and secret comparison.
//!
//! ## Invariants
//! - Constant-time comparison for every secret-derived value
//! - The canonical message is `METHOD ++ PATH ++ TIMESTAMP ++ BODY` with no
//!   delimiters

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

/// Constant-time comparison of two byte slices
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Constant-time comparison of two strings
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Build the canonical message a request signature covers
pub fn canonical_message(method: &str, path: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut message =
        Vec::with_capacity(method.len() + path.len() + timestamp.len() + body.len());
    message.extend_from_slice(method.as_bytes());
    message.extend_from_slice(path.as_bytes());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    message
}

/// Lower-case hex HMAC-SHA256 of `message` under `secret`
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> AuthResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| AuthError::NotConfigured)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signature a client sends in `X-Signature`
pub fn sign_request(
    secret: &str,
    method: &str,
    path: &str,
    timestamp: i64,
    body: &[u8],
) -> AuthResult<String> {
    let ts = timestamp.to_string();
    let message = canonical_message(method, path, &ts, body);
    hmac_sha256_hex(secret.as_bytes(), &message)
}

/// Case-insensitive, constant-time check of a presented hex signature
pub fn signature_matches(expected_hex: &str, presented_hex: &str) -> bool {
    let presented = presented_hex.trim().to_ascii_lowercase();
    constant_time_str_eq(expected_hex, &presented)
}
