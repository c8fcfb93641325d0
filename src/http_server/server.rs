//! # HTTP Server
//!
//! Combines the KV and observability routers behind the auth middleware.
//!
//! Layer order, outermost first: trace, CORS, body limit, auth, handlers.
//! CORS preflights are answered before authentication runs.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::AuthGate;
use crate::bulk::{BatchReadAggregator, BulkDeleteAggregator, BulkWriteOrchestrator};
use crate::kv::{Clock, KvBackend};

use super::auth_middleware::require_auth;
use super::config::{HttpServerConfig, DEFAULT_MAX_BODY_BYTES};
use super::kv_routes::kv_routes;
use super::observability_routes::observability_routes;

// ==================
// Shared State
// ==================

/// State shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub backend: Arc<dyn KvBackend>,
    pub clock: Arc<dyn Clock>,
    pub gate: Arc<AuthGate>,
    pub writer: Arc<BulkWriteOrchestrator>,
    pub deleter: Arc<BulkDeleteAggregator>,
    pub reader: Arc<BatchReadAggregator>,
    /// Buffering limit for bodies the auth middleware reads
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>, gate: AuthGate) -> Self {
        Self {
            writer: Arc::new(BulkWriteOrchestrator::new(backend.clone(), clock.clone())),
            deleter: Arc::new(BulkDeleteAggregator::new(backend.clone())),
            reader: Arc::new(BatchReadAggregator::new(backend.clone())),
            gate: Arc::new(gate),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            backend,
            clock,
        }
    }

    /// Replace the bulk writer, e.g. to change its retry policy
    pub fn with_writer(mut self, writer: BulkWriteOrchestrator) -> Self {
        self.writer = Arc::new(writer);
        self
    }
}

// ==================
// Server
// ==================

pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: AppState) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, state: AppState) -> Router {
        let state = AppState {
            max_body_bytes: config.max_body_bytes,
            ..state
        };

        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(observability_routes())
            .merge(kv_routes())
            .layer(middleware::from_fn_with_state(state.clone(), require_auth))
            .layer(DefaultBodyLimit::max(config.max_body_bytes))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until ctrl-c
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "kvgate listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("kvgate stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }
}
