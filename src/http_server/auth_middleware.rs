//! Authentication middleware
//!
//! Buffers the body once so the signature covers the exact received bytes,
//! then hands the same bytes on to the handler.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use tracing::{debug, warn};

use crate::auth::{AuthGate, AuthRequest};

use super::errors::ApiError;
use super::server::AppState;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    if AuthGate::is_public(&method, &path) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) if exceeds_limit(&err) => {
            return ApiError::payload_too_large(state.max_body_bytes).into_response()
        }
        Err(err) => {
            warn!(method = %method, path = %path, error = %err, "failed to read request body");
            return ApiError::bad_request("Failed to read request body").into_response();
        }
    };

    let verdict = state.gate.verify(&AuthRequest {
        method: &method,
        path: &path,
        body: &bytes,
        authorization: header(&parts.headers, "authorization"),
        signature: header(&parts.headers, SIGNATURE_HEADER),
        timestamp: header(&parts.headers, TIMESTAMP_HEADER),
    });

    match verdict {
        Ok(mode) => {
            debug!(method = %method, path = %path, mode = mode.as_str(), "request admitted");
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        Err(err) => {
            warn!(method = %method, path = %path, reason = %err, "request rejected");
            ApiError::from(err).into_response()
        }
    }
}
