//! # Auth Gate
//!
//! Per-request credential check run before any storage operation.
//!
//! Two credential shapes are accepted:
//!
//! | Mode | Headers |
//! |------|---------|
//! | Bearer | `Authorization: Bearer <secret>` |
//! | Signature | `X-Signature: <hex hmac>` + `X-Timestamp: <epoch ms>` |
//!
//! In signature mode the timestamp window is checked before the signature,
//! so a stale request is refused even when correctly signed.

use std::fmt;
use std::sync::Arc;

use crate::kv::Clock;

use super::crypto::{canonical_message, constant_time_str_eq, hmac_sha256_hex, signature_matches};
use super::errors::{AuthError, AuthResult};

/// Allowed clock skew between client and server, in milliseconds
pub const SIGNATURE_WINDOW_MS: i64 = 300_000;

/// Paths reachable without credentials (GET/HEAD only)
pub const PUBLIC_PATHS: &[&str] = &["/", "/health", "/version"];

/// The parts of a request the gate inspects
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthRequest<'a> {
    pub method: &'a str,
    /// URI path without the query string
    pub path: &'a str,
    /// Raw request body, exactly as received
    pub body: &'a [u8],
    pub authorization: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub timestamp: Option<&'a str>,
}

/// How a request was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Public,
    Bearer,
    Signature,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Public => "public",
            AuthMode::Bearer => "bearer",
            AuthMode::Signature => "signature",
        }
    }
}

#[derive(Clone)]
pub struct AuthGate {
    secret: Option<String>,
    window_ms: i64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("configured", &self.secret.is_some())
            .field("window_ms", &self.window_ms)
            .finish()
    }
}

impl AuthGate {
    /// An empty secret counts as not configured
    pub fn new(secret: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            window_ms: SIGNATURE_WINDOW_MS,
            clock,
        }
    }

    pub fn with_window_ms(mut self, window_ms: i64) -> Self {
        self.window_ms = window_ms;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn is_public(method: &str, path: &str) -> bool {
        matches!(method, "GET" | "HEAD") && PUBLIC_PATHS.contains(&path)
    }

    /// Admit or reject a request
    pub fn verify(&self, request: &AuthRequest<'_>) -> AuthResult<AuthMode> {
        if Self::is_public(request.method, request.path) {
            return Ok(AuthMode::Public);
        }

        let secret = self.secret.as_deref().ok_or(AuthError::NotConfigured)?;

        if let Some(token) = request.authorization.and_then(|h| h.strip_prefix("Bearer ")) {
            return if constant_time_str_eq(token, secret) {
                Ok(AuthMode::Bearer)
            } else {
                Err(AuthError::InvalidToken)
            };
        }

        match (request.signature, request.timestamp) {
            (Some(signature), Some(timestamp)) => {
                self.verify_signature(secret, request, signature, timestamp)?;
                Ok(AuthMode::Signature)
            }
            _ => Err(AuthError::MissingCredentials),
        }
    }

    fn verify_signature(
        &self,
        secret: &str,
        request: &AuthRequest<'_>,
        signature: &str,
        timestamp: &str,
    ) -> AuthResult<()> {
        let timestamp = timestamp.trim();
        let sent_at: i64 = timestamp.parse().map_err(|_| AuthError::TimestampExpired)?;
        let skew = self.clock.now_millis().saturating_sub(sent_at).saturating_abs();
        if skew > self.window_ms {
            return Err(AuthError::TimestampExpired);
        }

        let body: &[u8] = match request.method {
            "GET" | "HEAD" => b"",
            _ => request.body,
        };
        let message = canonical_message(request.method, request.path, timestamp, body);
        let expected = hmac_sha256_hex(secret.as_bytes(), &message)?;

        if signature_matches(&expected, signature) {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::crypto::sign_request;
    use crate::kv::ManualClock;

    const NOW: i64 = 1_700_000_000_000;
    const SECRET: &str = "test-secret";

    fn gate() -> AuthGate {
        AuthGate::new(Some(SECRET.to_string()), Arc::new(ManualClock::new(NOW)))
    }

    fn signed<'a>(
        method: &'a str,
        path: &'a str,
        body: &'a [u8],
        sig: &'a str,
        ts: &'a str,
    ) -> AuthRequest<'a> {
        AuthRequest {
            method,
            path,
            body,
            signature: Some(sig),
            timestamp: Some(ts),
            ..Default::default()
        }
    }

    #[test]
    fn test_public_paths_skip_auth() {
        let unconfigured = AuthGate::new(None, Arc::new(ManualClock::new(NOW)));
        let req = AuthRequest {
            method: "GET",
            path: "/health",
            ..Default::default()
        };
        assert_eq!(unconfigured.verify(&req), Ok(AuthMode::Public));

        // only reads are public
        let post = AuthRequest {
            method: "POST",
            path: "/health",
            ..Default::default()
        };
        assert_eq!(gate().verify(&post), Err(AuthError::MissingCredentials));
    }

    #[test]
    fn test_unconfigured_secret_is_server_error() {
        let gate = AuthGate::new(Some(String::new()), Arc::new(ManualClock::new(NOW)));
        let req = AuthRequest {
            method: "GET",
            path: "/kv/a",
            authorization: Some("Bearer anything"),
            ..Default::default()
        };
        assert_eq!(gate.verify(&req), Err(AuthError::NotConfigured));
    }

    #[test]
    fn test_bearer_requires_full_match() {
        let mut req = AuthRequest {
            method: "GET",
            path: "/kv/a",
            authorization: Some("Bearer test-secret"),
            ..Default::default()
        };
        assert_eq!(gate().verify(&req), Ok(AuthMode::Bearer));

        req.authorization = Some("Bearer test-sec");
        assert_eq!(gate().verify(&req), Err(AuthError::InvalidToken));

        req.authorization = Some("Bearer test-secret-and-more");
        assert_eq!(gate().verify(&req), Err(AuthError::InvalidToken));

        // surrounding whitespace is part of the token
        req.authorization = Some("Bearer  test-secret ");
        assert_eq!(gate().verify(&req), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_missing_credentials() {
        let req = AuthRequest {
            method: "GET",
            path: "/kv/a",
            ..Default::default()
        };
        assert_eq!(gate().verify(&req), Err(AuthError::MissingCredentials));

        // half a signature pair is no credential at all
        let half = AuthRequest {
            method: "GET",
            path: "/kv/a",
            signature: Some("abc"),
            ..Default::default()
        };
        assert_eq!(gate().verify(&half), Err(AuthError::MissingCredentials));
    }

    #[test]
    fn test_valid_signature_admits() {
        let body = br#"{"value":"x"}"#;
        let sig = sign_request(SECRET, "PUT", "/kv/a", NOW, body).unwrap();
        let ts = NOW.to_string();
        let req = signed("PUT", "/kv/a", body, &sig, &ts);
        assert_eq!(gate().verify(&req), Ok(AuthMode::Signature));

        let upper = sig.to_uppercase();
        let req = signed("PUT", "/kv/a", body, &upper, &ts);
        assert_eq!(gate().verify(&req), Ok(AuthMode::Signature));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let sig = sign_request(SECRET, "PUT", "/kv/a", NOW, br#"{"value":"x"}"#).unwrap();
        let ts = NOW.to_string();
        let req = signed("PUT", "/kv/a", br#"{"value":"y"}"#, &sig, &ts);
        assert_eq!(gate().verify(&req), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_get_signs_empty_body() {
        let sig = sign_request(SECRET, "GET", "/kv/a", NOW, b"").unwrap();
        let ts = NOW.to_string();
        let req = signed("GET", "/kv/a", b"ignored", &sig, &ts);
        assert_eq!(gate().verify(&req), Ok(AuthMode::Signature));
    }

    #[test]
    fn test_stale_signature_rejected_even_when_correct() {
        let sent = NOW - 301_000;
        let sig = sign_request(SECRET, "GET", "/kv/a", sent, b"").unwrap();
        let ts = sent.to_string();
        let req = signed("GET", "/kv/a", b"", &sig, &ts);
        assert_eq!(gate().verify(&req), Err(AuthError::TimestampExpired));

        // a wrong signature on a stale request still reports the timestamp
        let req = signed("GET", "/kv/a", b"", "00", &ts);
        assert_eq!(gate().verify(&req), Err(AuthError::TimestampExpired));
    }

    #[test]
    fn test_window_edges() {
        for sent in [NOW - 300_000, NOW + 300_000] {
            let sig = sign_request(SECRET, "DELETE", "/kv/a", sent, b"").unwrap();
            let ts = sent.to_string();
            let req = signed("DELETE", "/kv/a", b"", &sig, &ts);
            assert_eq!(gate().verify(&req), Ok(AuthMode::Signature));
        }

        let future = NOW + 300_001;
        let sig = sign_request(SECRET, "DELETE", "/kv/a", future, b"").unwrap();
        let ts = future.to_string();
        let req = signed("DELETE", "/kv/a", b"", &sig, &ts);
        assert_eq!(gate().verify(&req), Err(AuthError::TimestampExpired));
    }

    #[test]
    fn test_non_numeric_timestamp() {
        let req = signed("GET", "/kv/a", b"", "abcd", "yesterday");
        assert_eq!(gate().verify(&req), Err(AuthError::TimestampExpired));
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", gate());
        assert!(!rendered.contains(SECRET));
    }
}
