//! Shared helpers for HTTP integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use kvgate::auth::AuthGate;
use kvgate::bulk::{BulkWriteOrchestrator, ManualSleeper};
use kvgate::http_server::{AppState, HttpServer, HttpServerConfig};
use kvgate::kv::{HostedBackend, KvBackend, ManualClock, MemoryNamespace, RelationalBackend};
use serde_json::Value;
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret";
pub const NOW_MS: i64 = 1_700_000_000_000;

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub sleeper: Arc<ManualSleeper>,
}

pub fn app_with(
    backend: Arc<dyn KvBackend>,
    clock: Arc<ManualClock>,
    secret: Option<&str>,
) -> TestApp {
    app_with_config(backend, clock, secret, HttpServerConfig::default())
}

pub fn app_with_config(
    backend: Arc<dyn KvBackend>,
    clock: Arc<ManualClock>,
    secret: Option<&str>,
    config: HttpServerConfig,
) -> TestApp {
    let sleeper = Arc::new(ManualSleeper::new(clock.clone()));
    let writer =
        BulkWriteOrchestrator::new(backend.clone(), clock.clone()).with_sleeper(sleeper.clone());
    let gate = AuthGate::new(secret.map(str::to_string), clock.clone());
    let state = AppState::new(backend, clock.clone(), gate).with_writer(writer);
    let router = HttpServer::new(config, state).router();
    TestApp {
        router,
        clock,
        sleeper,
    }
}

pub fn relational_app() -> TestApp {
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let backend = RelationalBackend::open_in_memory(clock.clone()).unwrap();
    app_with(Arc::new(backend), clock, Some(SECRET))
}

pub fn hosted_app(write_interval_ms: i64) -> TestApp {
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let namespace = MemoryNamespace::new(clock.clone(), write_interval_ms);
    let backend = HostedBackend::new(Arc::new(namespace));
    app_with(Arc::new(backend), clock, Some(SECRET))
}

/// Request carrying the bearer secret and an optional JSON body
pub fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", SECRET));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send a request and decode the JSON response body (`Null` when empty)
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}
