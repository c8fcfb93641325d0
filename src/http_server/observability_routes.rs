//! Observability HTTP Routes
//!
//! Unauthenticated liveness and build information.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::server::AppState;

pub const SERVICE_NAME: &str = "kvgate";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
    pub authenticated: bool,
}

pub fn observability_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: state.backend.name(),
    })
}

async fn version_handler() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn index_handler(State(state): State<AppState>) -> Json<IndexResponse> {
    Json(IndexResponse {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        backend: state.backend.name(),
        authenticated: state.gate.is_configured(),
    })
}
