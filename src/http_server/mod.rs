//! # HTTP Server Module
//!
//! Axum server exposing the KV gateway.
//!
//! # Endpoints
//!
//! - `/`, `/health`, `/version` - unauthenticated service info
//! - `/kv/*` - key-value operations (bearer or signed requests)

pub mod auth_middleware;
pub mod config;
pub mod errors;
pub mod kv_routes;
pub mod observability_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ErrorResponse};
pub use server::{AppState, HttpServer};
