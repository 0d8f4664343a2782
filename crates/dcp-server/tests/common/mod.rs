// crates/dcp-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Helpers
// Description: In-memory router fixtures and request helpers.
// Purpose: Drive the HTTP API through tower without binding sockets.
// Dependencies: axum, dcp-core, dcp-server, tower
// ============================================================================

//! ## Overview
//! The harness wires an in-memory engine, a memory audit sink, and a
//! settable clock into the real router.

#![allow(dead_code, reason = "Helpers are shared across several test crates.")]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::body::to_bytes;
use axum::http::Request;
use axum::http::StatusCode;
use axum::response::Response;
use dcp_core::DecisionEngine;
use dcp_core::EngineConfig;
use dcp_core::InMemoryDecisionStore;
use dcp_core::PolicyCatalog;
use dcp_core::PolicyError;
use dcp_core::PolicyRegistry;
use dcp_core::SharedDecisionStore;
use dcp_core::Timestamp;
use dcp_server::AppState;
use dcp_server::MemoryAuditSink;
use dcp_server::RateLimiter;
use dcp_server::ServiceMetrics;
use dcp_server::router;
use serde_json::Value;
use serde_json::json;
use tower::ServiceExt;

/// Route prefix used by the harness.
pub const PREFIX: &str = "/api/v2/dcp";
/// Base test clock: 2026-01-01T00:00:00Z.
pub const T0: i64 = 1_767_225_600_000;

/// Outcome the harness policy loader returns on reload.
pub type LoaderResult = Arc<Mutex<Option<String>>>;

/// Router plus handles into its collaborators.
pub struct Harness {
    /// Router under test.
    pub app: Router,
    /// Engine shared with the router.
    pub engine: Arc<DecisionEngine<SharedDecisionStore>>,
    /// Captured audit records.
    pub audit: Arc<MemoryAuditSink>,
    /// Milliseconds since epoch returned by the clock.
    pub clock: Arc<AtomicI64>,
    /// When set, the next reload fails with this message.
    pub reload_failure: LoaderResult,
    /// Metrics registry, when enabled.
    pub metrics: Option<Arc<ServiceMetrics>>,
}

impl Harness {
    /// Builds a harness with default limits.
    pub fn new() -> Self {
        Self::with_limits(1024 * 1024, Duration::from_secs(5), Duration::ZERO)
    }

    /// Builds a harness with a body limit, deadline, and reload delay.
    pub fn with_limits(max_body_bytes: usize, timeout: Duration, reload_delay: Duration) -> Self {
        Self::build(max_body_bytes, timeout, reload_delay, None, None)
    }

    /// Builds a harness with metrics and an optional rate limit per window.
    pub fn observed(rate_limit: Option<(u32, Duration)>) -> Self {
        let metrics = Arc::new(ServiceMetrics::new().unwrap());
        let limiter = rate_limit.map(|(requests, window)| Arc::new(RateLimiter::new(requests, window)));
        Self::build(1024 * 1024, Duration::from_secs(5), Duration::ZERO, Some(metrics), limiter)
    }

    /// Assembles the router and its collaborators.
    fn build(
        max_body_bytes: usize,
        timeout: Duration,
        reload_delay: Duration,
        metrics: Option<Arc<ServiceMetrics>>,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Self {
        let store = SharedDecisionStore::from_store(InMemoryDecisionStore::new());
        let registry = PolicyRegistry::new(PolicyCatalog::builtin().unwrap());
        let engine =
            Arc::new(DecisionEngine::new(store, Arc::new(registry), EngineConfig::default()));
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(AtomicI64::new(T0));
        let reload_failure: LoaderResult = Arc::new(Mutex::new(None));
        let failure = Arc::clone(&reload_failure);
        let loader = Arc::new(move || {
            std::thread::sleep(reload_delay);
            match failure.lock().unwrap().clone() {
                Some(message) => Err(PolicyError::Catalog(message)),
                None => PolicyCatalog::builtin(),
            }
        });
        let clock_handle = Arc::clone(&clock);
        let mut state = AppState::new(Arc::clone(&engine), audit.clone(), loader)
            .with_request_timeout(timeout)
            .with_clock(Arc::new(move || {
                Timestamp::from_unix_millis(clock_handle.load(Ordering::SeqCst))
            }));
        if let Some(metrics) = &metrics {
            state = state.with_metrics(Arc::clone(metrics));
        }
        if let Some(limiter) = limiter {
            state = state.with_rate_limiter(limiter);
        }
        Self {
            app: router(state, PREFIX, max_body_bytes),
            engine,
            audit,
            clock,
            reload_failure,
            metrics,
        }
    }

    /// Advances the clock by `millis`.
    pub fn advance(&self, millis: i64) {
        self.clock.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sends a request and returns status plus JSON body.
    pub async fn send(&self, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = body.map_or_else(Body::empty, |value| Body::from(value.to_string()));
        self.send_raw(method, path, body).await
    }

    /// Sends a request with a raw body.
    pub async fn send_raw(&self, method: &str, path: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    /// Sends a prepared request and returns the full response.
    pub async fn send_request(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Reads a response body as text.
    pub async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Posts a gate request and returns status plus body.
    pub async fn create(&self, body: Value) -> (StatusCode, Value) {
        self.send("POST", &format!("{PREFIX}/decision-gates"), Some(body)).await
    }
}

/// Gate request body routed to human review by the built-in ruleset.
pub fn human_gate(execution_id: &str) -> Value {
    json!({
        "execution_id": execution_id,
        "flow_id": "refund-flow",
        "node_id": "approve-refund",
        "risk_score": 0.5,
        "confidence_score": 0.6,
        "recommendation": { "summary": "Refund order 1234" },
        "sla_seconds": 3600
    })
}

/// Gate request body auto-approved by the built-in ruleset.
pub fn low_risk_gate(execution_id: &str) -> Value {
    json!({
        "execution_id": execution_id,
        "flow_id": "refund-flow",
        "node_id": "approve-refund",
        "risk_score": 0.1,
        "confidence_score": 0.95,
        "estimated_cost": 40,
        "recommendation": { "summary": "Refund order 1234" }
    })
}
