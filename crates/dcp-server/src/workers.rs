// crates/dcp-server/src/workers.rs
// ============================================================================
// Module: Background Workers
// Description: Recurring expiry scans and outbox dispatch passes.
// Purpose: Drive the expiry supervisor and the event dispatcher on intervals.
// Dependencies: dcp-broker, dcp-core, tokio, tracing
// ============================================================================

//! ## Overview
//! Workers hold no schedule state of their own. Each tick re-reads overdue
//! decisions and pending outbox rows from the store, so a restarted process
//! picks up exactly where the previous one stopped. Ticks run on the
//! blocking pool because store and webhook calls are synchronous.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use dcp_broker::OutboxDispatcher;
use dcp_core::SharedDecisionStore;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::api::Clock;
use crate::api::Engine;
use crate::audit::AuditOutcome;
use crate::audit::AuditRecord;
use crate::audit::AuditSink;
use crate::metrics::ServiceMetrics;

// ============================================================================
// SECTION: Expiry
// ============================================================================

/// Runs one expiry scan, audits its outcome, and counts it when metrics are
/// enabled.
pub fn run_expiry_scan(
    engine: &Engine,
    audit: &dyn AuditSink,
    clock: &Clock,
    metrics: Option<&ServiceMetrics>,
) {
    let now = clock();
    match engine.expire_overdue(now) {
        Ok(report) => {
            if let Some(metrics) = metrics {
                metrics.expiry_scanned(report.expired.len(), report.failures.len());
            }
            if !report.expired.is_empty() || !report.failures.is_empty() {
                info!(
                    scanned = report.scanned,
                    expired = report.expired.len(),
                    skipped = report.skipped,
                    failures = report.failures.len(),
                    "expiry scan completed"
                );
            }
            let outcome =
                if report.failures.is_empty() { AuditOutcome::Ok } else { AuditOutcome::Error };
            audit.record(&AuditRecord::new("expiry_scan", now, outcome).with_detail(json!({
                "scanned": report.scanned,
                "expired": report.expired,
                "skipped": report.skipped,
                "failures": report.failures,
            })));
        }
        Err(err) => {
            warn!(error = %err, "expiry scan failed");
            audit.record(
                &AuditRecord::new("expiry_scan", now, AuditOutcome::Error)
                    .with_error(err.category().as_str())
                    .with_detail(json!({ "message": err.to_string() })),
            );
        }
    }
}

/// Spawns the recurring expiry scan.
#[must_use]
pub fn spawn_expiry_worker(
    engine: Arc<Engine>,
    audit: Arc<dyn AuditSink>,
    clock: Clock,
    metrics: Option<Arc<ServiceMetrics>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let engine = Arc::clone(&engine);
            let audit = Arc::clone(&audit);
            let clock = Arc::clone(&clock);
            let metrics = metrics.clone();
            let scan = tokio::task::spawn_blocking(move || {
                run_expiry_scan(&engine, audit.as_ref(), &clock, metrics.as_deref());
            });
            if let Err(err) = scan.await {
                warn!(error = %err, "expiry scan task aborted");
            }
        }
    })
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Spawns the recurring outbox dispatch pass.
#[must_use]
pub fn spawn_dispatch_worker(
    dispatcher: Arc<OutboxDispatcher<SharedDecisionStore>>,
    clock: Clock,
    metrics: Option<Arc<ServiceMetrics>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let dispatcher = Arc::clone(&dispatcher);
            let clock = Arc::clone(&clock);
            let pass = tokio::task::spawn_blocking(move || dispatcher.dispatch_once(clock()));
            match pass.await {
                Ok(Ok(report)) if report.attempted > 0 => {
                    if let Some(metrics) = &metrics {
                        metrics.events_dispatched(report.delivered.len(), report.failed.len());
                    }
                    debug!(
                        attempted = report.attempted,
                        delivered = report.delivered.len(),
                        failed = report.failed.len(),
                        "dispatch pass completed"
                    );
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!(error = %err, "dispatch pass failed"),
                Err(err) => warn!(error = %err, "dispatch task aborted"),
            }
        }
    })
}
