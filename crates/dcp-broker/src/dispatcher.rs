// crates/dcp-broker/src/dispatcher.rs
// ============================================================================
// Module: Outbox Dispatcher
// Description: Delivers outbox events through a sink with retry and backoff.
// Purpose: Turn committed outbox rows into acknowledged deliveries.
// Dependencies: dcp-core, tracing
// ============================================================================

//! ## Overview
//! [`OutboxDispatcher::dispatch_once`] pulls the due head event of each
//! decision, hands it to the [`Sink`], and marks it delivered only after the
//! sink acknowledges. Failures are rescheduled with exponential backoff and
//! never dropped, so delivery is at-least-once and per-decision ordered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use dcp_core::EventEnvelope;
use dcp_core::EventId;
use dcp_core::EventOutbox;
use dcp_core::StoreError;
use dcp_core::Timestamp;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::sink::Sink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default first retry delay.
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 500;
/// Default retry delay ceiling.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;
/// Default number of events per dispatch pass.
pub const DEFAULT_DISPATCH_BATCH_SIZE: usize = 100;
/// Default CloudEvents `source`.
pub const DEFAULT_EVENT_SOURCE: &str = "dcp";

// ============================================================================
// SECTION: Backoff
// ============================================================================

/// Exponential retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial_ms: u64,
    /// Maximum delay.
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl BackoffPolicy {
    /// Returns the delay before the next attempt, given prior failed attempts.
    #[must_use]
    pub fn delay_ms(&self, prior_attempts: u32) -> u64 {
        let factor = 1_u64.checked_shl(prior_attempts).unwrap_or(u64::MAX);
        self.initial_ms.saturating_mul(factor).min(self.max_ms)
    }
}

// ============================================================================
// SECTION: Errors and Reports
// ============================================================================

/// Dispatcher errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Outbox bookkeeping failed.
    #[error("outbox store failure: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Events offered to the sink.
    pub attempted: usize,
    /// Events acknowledged and marked delivered.
    pub delivered: Vec<EventId>,
    /// Events rescheduled after a sink failure.
    pub failed: Vec<EventId>,
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Delivers outbox events through a sink.
#[derive(Clone)]
pub struct OutboxDispatcher<O> {
    /// Event outbox.
    outbox: O,
    /// Delivery transport.
    sink: Arc<dyn Sink>,
    /// CloudEvents `source` attribute.
    source: String,
    /// Maximum events per pass.
    batch_size: usize,
    /// Retry schedule.
    backoff: BackoffPolicy,
}

impl<O> OutboxDispatcher<O>
where
    O: EventOutbox,
{
    /// Builds a dispatcher with default batch size and backoff.
    pub fn new(outbox: O, sink: Arc<dyn Sink>, source: impl Into<String>) -> Self {
        Self {
            outbox,
            sink,
            source: source.into(),
            batch_size: DEFAULT_DISPATCH_BATCH_SIZE,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Overrides the number of events per pass (minimum one).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Overrides the retry schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delivers every due head event once.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] when the outbox cannot be read or
    /// updated. Events not yet marked stay pending and are retried later.
    pub fn dispatch_once(&self, now: Timestamp) -> Result<DispatchReport, DispatchError> {
        let pending = self.outbox.pending_events(now, self.batch_size)?;
        let mut report = DispatchReport {
            attempted: pending.len(),
            ..DispatchReport::default()
        };
        for entry in pending {
            let envelope = EventEnvelope::from_outbox(&entry, &self.source);
            let event_id = entry.event.event_id.clone();
            match self.sink.deliver(&envelope, now) {
                Ok(receipt) => {
                    self.outbox.mark_delivered(&event_id, receipt.delivered_at)?;
                    debug!(
                        event_id = %event_id,
                        decision_id = %entry.event.decision_id,
                        sink = %receipt.sink,
                        "event delivered"
                    );
                    report.delivered.push(event_id);
                }
                Err(err) => {
                    let delay_ms = self.backoff.delay_ms(entry.attempts);
                    let message = err.to_string();
                    self.outbox.record_failure(&event_id, &message, now.plus_millis(delay_ms))?;
                    warn!(
                        event_id = %event_id,
                        decision_id = %entry.event.decision_id,
                        attempts = entry.attempts.saturating_add(1),
                        retry_in_ms = delay_ms,
                        error = %message,
                        "event delivery failed"
                    );
                    report.failed.push(event_id);
                }
            }
        }
        Ok(report)
    }
}
