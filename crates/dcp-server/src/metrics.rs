// crates/dcp-server/src/metrics.rs
// ============================================================================
// Module: Service Metrics
// Description: Prometheus counters, histograms, and gauges for the service.
// Purpose: Expose request, lifecycle, expiry, and delivery telemetry.
// Dependencies: prometheus, thiserror
// ============================================================================

//! ## Overview
//! [`ServiceMetrics`] owns a private Prometheus [`Registry`] so several
//! servers (or tests) in one process never collide on metric names. The
//! registry is rendered in the Prometheus text format on `GET /metrics`.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `dcp_http_requests_total` | Counter | `method`, `route`, `status` |
//! | `dcp_http_request_duration_seconds` | Histogram | `method`, `route` |
//! | `dcp_decisions_created_total` | Counter | `status` |
//! | `dcp_decision_actions_total` | Counter | `action_type`, `actor_type` |
//! | `dcp_decisions_expired_total` | Counter | none |
//! | `dcp_expiry_failures_total` | Counter | none |
//! | `dcp_events_dispatched_total` | Counter | `outcome` |
//! | `dcp_rate_limited_total` | Counter | none |
//! | `dcp_pending_decisions` | Gauge | none |
//!
//! Route labels are matched route templates, never raw paths, so decision
//! identifiers do not create new series.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Request latency buckets in seconds.
const REQUEST_DURATION_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
/// Maximum label value length.
const MAX_LABEL_VALUE_LEN: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Metrics registration and encoding errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric could not be registered.
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
    /// The registry could not be rendered.
    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Prometheus metrics for the decision control plane.
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Registry holding every metric below.
    registry: Registry,
    /// HTTP requests by method, route, and status code.
    requests_total: IntCounterVec,
    /// HTTP request latency by method and route.
    request_duration: HistogramVec,
    /// Newly created decisions by initial status.
    decisions_created_total: IntCounterVec,
    /// Human actions by action and actor type.
    actions_total: IntCounterVec,
    /// Decisions moved to `expired` by the supervisor.
    decisions_expired_total: IntCounter,
    /// Decisions the supervisor failed to expire.
    expiry_failures_total: IntCounter,
    /// Outbox delivery attempts by outcome.
    events_dispatched_total: IntCounterVec,
    /// Requests refused by the rate limiter.
    rate_limited_total: IntCounter,
    /// Decisions awaiting human review at the last scrape.
    pending_decisions: IntGauge,
}

impl ServiceMetrics {
    /// Creates and registers all service metrics.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Registration`] when a metric cannot be
    /// registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let requests_total = IntCounterVec::new(
            Opts::new("dcp_http_requests_total", "HTTP requests served"),
            &["method", "route", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new("dcp_http_request_duration_seconds", "HTTP request latency")
                .buckets(REQUEST_DURATION_BUCKETS.to_vec()),
            &["method", "route"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;
        let decisions_created_total = IntCounterVec::new(
            Opts::new("dcp_decisions_created_total", "Decisions created by initial status"),
            &["status"],
        )?;
        registry.register(Box::new(decisions_created_total.clone()))?;
        let actions_total = IntCounterVec::new(
            Opts::new("dcp_decision_actions_total", "Human actions applied to decisions"),
            &["action_type", "actor_type"],
        )?;
        registry.register(Box::new(actions_total.clone()))?;
        let decisions_expired_total =
            IntCounter::new("dcp_decisions_expired_total", "Decisions expired by the supervisor")?;
        registry.register(Box::new(decisions_expired_total.clone()))?;
        let expiry_failures_total =
            IntCounter::new("dcp_expiry_failures_total", "Decisions that failed to expire")?;
        registry.register(Box::new(expiry_failures_total.clone()))?;
        let events_dispatched_total = IntCounterVec::new(
            Opts::new("dcp_events_dispatched_total", "Outbox delivery attempts"),
            &["outcome"],
        )?;
        registry.register(Box::new(events_dispatched_total.clone()))?;
        let rate_limited_total =
            IntCounter::new("dcp_rate_limited_total", "Requests refused by the rate limiter")?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        let pending_decisions =
            IntGauge::new("dcp_pending_decisions", "Decisions awaiting human review")?;
        registry.register(Box::new(pending_decisions.clone()))?;
        Ok(Self {
            registry,
            requests_total,
            request_duration,
            decisions_created_total,
            actions_total,
            decisions_expired_total,
            expiry_failures_total,
            events_dispatched_total,
            rate_limited_total,
            pending_decisions,
        })
    }

    /// Records one served HTTP request.
    pub fn observe_request(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let method = truncate_label(method);
        let route = truncate_label(route);
        let status = status.to_string();
        self.requests_total.with_label_values(&[method, route, status.as_str()]).inc();
        self.request_duration.with_label_values(&[method, route]).observe(elapsed.as_secs_f64());
    }

    /// Records a newly created decision.
    pub fn decision_created(&self, status: &str) {
        self.decisions_created_total.with_label_values(&[truncate_label(status)]).inc();
    }

    /// Records an applied human action.
    pub fn action_applied(&self, action_type: &str, actor_type: &str) {
        self.actions_total
            .with_label_values(&[truncate_label(action_type), truncate_label(actor_type)])
            .inc();
    }

    /// Records the outcome of an expiry scan.
    pub fn expiry_scanned(&self, expired: usize, failed: usize) {
        self.decisions_expired_total.inc_by(u64::try_from(expired).unwrap_or(u64::MAX));
        self.expiry_failures_total.inc_by(u64::try_from(failed).unwrap_or(u64::MAX));
    }

    /// Records the outcome of a dispatch pass.
    pub fn events_dispatched(&self, delivered: usize, failed: usize) {
        self.events_dispatched_total
            .with_label_values(&["delivered"])
            .inc_by(u64::try_from(delivered).unwrap_or(u64::MAX));
        self.events_dispatched_total
            .with_label_values(&["failed"])
            .inc_by(u64::try_from(failed).unwrap_or(u64::MAX));
    }

    /// Records a request refused by the rate limiter.
    pub fn rate_limited(&self) {
        self.rate_limited_total.inc();
    }

    /// Sets the pending decision gauge.
    pub fn set_pending_decisions(&self, pending: u64) {
        self.pending_decisions.set(i64::try_from(pending).unwrap_or(i64::MAX));
    }

    /// Returns the number of requests recorded for a route and status.
    #[must_use]
    pub fn request_count(&self, method: &str, route: &str, status: u16) -> u64 {
        let status = status.to_string();
        self.requests_total.with_label_values(&[method, route, status.as_str()]).get()
    }

    /// Returns the number of decisions expired so far.
    #[must_use]
    pub fn expired_count(&self) -> u64 {
        self.decisions_expired_total.get()
    }

    /// Renders every metric in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Encoding`] when rendering fails.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|err| MetricsError::Encoding(err.to_string()))?;
        String::from_utf8(buffer).map_err(|err| MetricsError::Encoding(err.to_string()))
    }
}

/// Truncates a label value on a character boundary.
fn truncate_label(value: &str) -> &str {
    if value.len() <= MAX_LABEL_VALUE_LEN {
        return value;
    }
    let end = value
        .char_indices()
        .map(|(index, _)| index)
        .take_while(|index| *index <= MAX_LABEL_VALUE_LEN)
        .last()
        .unwrap_or(0);
    value.get(..end).unwrap_or_default()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
