// crates/dcp-core/src/runtime/expiry.rs
// ============================================================================
// Module: Expiry Supervisor
// Description: Expires pending decisions whose SLA deadline has passed.
// Purpose: Guarantee overdue gates resolve without a human action.
// Dependencies: crate::{core, interfaces}, tracing
// ============================================================================

//! ## Overview
//! A scan lists pending decisions with `expires_at <= now` and moves each to
//! `expired` through the same compare-and-swap human actions use. A human
//! action that commits first wins and the supervisor skips that decision.
//! Failures are isolated per decision: one bad row never stops the batch.
//! The scan pages through overdue rows with a keyset cursor and stops once
//! `batch_size` decisions have been resolved, so rows that fail on every
//! tick do not occupy the batch and starve rows with later deadlines.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::core::ActionId;
use crate::core::ActionType;
use crate::core::ActorType;
use crate::core::Decision;
use crate::core::DecisionAction;
use crate::core::DecisionId;
use crate::core::DecisionStatus;
use crate::core::Timestamp;
use crate::interfaces::DecisionStore;
use crate::interfaces::OverdueCursor;
use crate::interfaces::StatusTransition;
use crate::interfaces::TransitionOutcome;
use crate::runtime::error::EngineError;
use crate::runtime::publisher::EventPublisher;
use crate::runtime::publisher::resume_token;

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Comment recorded on system expiry actions.
pub const EXPIRY_COMMENT: &str = "SLA deadline elapsed";

/// Per-decision expiry failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryFailure {
    /// Decision that failed to expire.
    pub decision_id: DecisionId,
    /// Failure description.
    pub message: String,
}

/// Outcome of one expiry scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    /// Overdue decisions examined.
    pub scanned: usize,
    /// Decisions moved to `expired`.
    pub expired: Vec<DecisionId>,
    /// Decisions resolved by someone else first.
    pub skipped: usize,
    /// Decisions that failed to expire.
    pub failures: Vec<ExpiryFailure>,
}

// ============================================================================
// SECTION: Supervisor
// ============================================================================

/// Expires overdue pending decisions.
pub struct ExpirySupervisor<S> {
    /// Decision store.
    store: S,
    /// Event builder.
    publisher: EventPublisher,
    /// Maximum decisions resolved per scan.
    batch_size: usize,
}

impl<S> ExpirySupervisor<S>
where
    S: DecisionStore,
{
    /// Creates a supervisor; a zero batch size is raised to one.
    #[must_use]
    pub fn new(store: S, batch_size: usize) -> Self {
        Self {
            store,
            publisher: EventPublisher::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Runs one scan at `now`.
    ///
    /// Failed rows are reported and stepped over; the scan keeps paging until
    /// `batch_size` decisions were expired or skipped, or no overdue rows
    /// remain.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] only when listing overdue decisions
    /// fails; per-decision failures are reported in [`ExpiryReport`].
    pub fn scan(&self, now: Timestamp) -> Result<ExpiryReport, EngineError> {
        let mut report = ExpiryReport::default();
        let mut cursor: Option<OverdueCursor> = None;
        loop {
            let resolved = report.expired.len() + report.skipped;
            let remaining = self.batch_size.saturating_sub(resolved);
            if remaining == 0 {
                break;
            }
            let page = self.store.overdue_decisions(now, cursor.as_ref(), remaining)?;
            let exhausted = page.len() < remaining;
            report.scanned += page.len();
            for decision in page {
                cursor = OverdueCursor::after(&decision);
                let decision_id = decision.decision_id.clone();
                match self.expire(decision, now) {
                    Ok(Some(_)) => report.expired.push(decision_id),
                    Ok(None) => report.skipped += 1,
                    Err(err) => {
                        warn!(decision_id = %decision_id, error = %err, "decision expiry failed");
                        report.failures.push(ExpiryFailure {
                            decision_id,
                            message: err.to_string(),
                        });
                    }
                }
            }
            if exhausted || cursor.is_none() {
                break;
            }
        }
        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired.len(),
                skipped = report.skipped,
                failed = report.failures.len(),
                "expiry scan finished"
            );
        }
        Ok(report)
    }

    /// Expires one decision; `None` when it was no longer pending.
    fn expire(&self, decision: Decision, now: Timestamp) -> Result<Option<Decision>, EngineError> {
        let action = DecisionAction {
            action_id: ActionId::generate(),
            decision_id: decision.decision_id.clone(),
            action_type: ActionType::Expire,
            actor_type: ActorType::System,
            actor_id: None,
            comment: Some(EXPIRY_COMMENT.to_string()),
            payload: None,
            created_at: now,
        };
        let token = resume_token(&decision.decision_id, &action.action_id)?;
        let event = self.publisher.expired(&decision, &action, &token)?;
        let outcome = self.store.transition(StatusTransition {
            decision_id: decision.decision_id.clone(),
            expected: vec![DecisionStatus::PendingHumanReview],
            next: DecisionStatus::Expired,
            resume_token: Some(token),
            action: Some(action),
            events: vec![event],
            at: now,
        })?;
        match outcome {
            TransitionOutcome::Applied(updated) => {
                info!(decision_id = %updated.decision_id, "decision expired");
                Ok(Some(updated))
            }
            TransitionOutcome::Conflict(current) => {
                debug!(
                    decision_id = %current.decision_id,
                    status = %current.status,
                    "expiry skipped; decision already resolved"
                );
                Ok(None)
            }
            TransitionOutcome::NotFound => Ok(None),
        }
    }
}
