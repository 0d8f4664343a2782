// crates/dcp-server/src/lib.rs
// ============================================================================
// Module: Decision Control Plane Server Library
// Description: HTTP API, background workers, audit, and tracing setup.
// Purpose: Expose the runnable service surface used by the CLI.
// Dependencies: crate::{api, audit, metrics, rate_limit, server, telemetry, workers}
// ============================================================================

//! ## Overview
//! `dcp-server` serves the decision request surface over axum, runs the
//! expiry supervisor and the outbox dispatcher on intervals, and records
//! JSON-lines audit entries for every mutation. Prometheus metrics are
//! served on `/metrics` and decision routes are rate limited per client. Security posture: all
//! inbound requests are untrusted; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod api;
pub mod audit;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod telemetry;
pub mod workers;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use api::AppState;
pub use api::ApiError;
pub use api::Clock;
pub use api::PolicyLoader;
pub use api::router;
pub use audit::AuditOutcome;
pub use audit::AuditRecord;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use metrics::MetricsError;
pub use metrics::ServiceMetrics;
pub use rate_limit::RateDecision;
pub use rate_limit::RateLimiter;
pub use server::DcpServer;
pub use server::ServerError;
pub use telemetry::init_tracing;
