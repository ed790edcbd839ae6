//! Shared helpers for API integration tests.
//!
//! Tests run the real router over the in-memory stores and the scripted
//! fake provider, so they exercise the same middleware stack (CORS,
//! request ID, timeout, tracing, panic recovery) that production uses,
//! without a database.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use atelier_api::config::ServerConfig;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_pipeline::queue::DispatchQueue;
use atelier_pipeline::{JobEventBus, JobService, PipelineConfig, PipelineContext};
use atelier_provider::FakeProvider;
use atelier_store::blob::MemoryBlobStore;
use atelier_store::memory::{MemoryAssetStore, MemoryJobStore, MemoryTokenLedger};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// Millisecond-scale pipeline timings, for the tests that start the
/// runtime and drive a job end to end.
pub fn fast_pipeline_config() -> PipelineConfig {
    let mut config = PipelineConfig {
        worker_count: 2,
        scan_interval: Duration::from_millis(5),
        submit_retry_delay: Duration::from_millis(5),
        ..Default::default()
    };
    config.poll_policy.initial_delay = Duration::from_millis(5);
    config.poll_policy.max_delay = Duration::from_millis(10);
    config.poll_policy.jitter = 0.0;
    config
}

/// Build the application router over fresh in-memory state.
///
/// The returned context is the same one behind the router, so tests can
/// reach past HTTP when they need to (driving the pipeline runtime,
/// inspecting the ledger). The fake provider succeeds on the first poll
/// of every job; nothing talks to it unless the runtime is started.
pub fn build_test_app() -> (Router, Arc<PipelineContext>) {
    let ctx = Arc::new(PipelineContext {
        jobs: Arc::new(MemoryJobStore::new()),
        ledger: Arc::new(MemoryTokenLedger::new()),
        assets: Arc::new(MemoryAssetStore::new()),
        blobs: Arc::new(MemoryBlobStore::new()),
        provider: Arc::new(FakeProvider::always_succeeding()),
        queue: Arc::new(DispatchQueue::new()),
        bus: Arc::new(JobEventBus::default()),
        config: fast_pipeline_config(),
    });

    let config = test_config();
    let state = AppState {
        service: JobService::new(ctx.clone()),
        pool: None,
        config: Arc::new(config.clone()),
    };

    (build_app_router(state, &config), ctx)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Send a GET request to the app and return the raw response.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Send a POST request with a JSON body and return the raw response.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Send a DELETE request and return the raw response.
pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
