// crates/dcp-core/src/interfaces/mod.rs
// ============================================================================
// Module: Decision Store Interfaces
// Description: Backend-agnostic persistence contracts for decisions and events.
// Purpose: Define the atomic operations every durable store must provide.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The decision store is the single source of truth for `status`. Every write
//! method below is one atomic commit: the decision row, its audit rows, and
//! its outbox events become visible together or not at all. Status changes go
//! through [`DecisionStore::transition`], a compare-and-swap keyed on the
//! expected current status, never a read-then-write in the caller.
//! The outbox is exposed separately through [`EventOutbox`] so the dispatcher
//! reads and acknowledges events without touching decision rows.
//!
//! Security posture: store contents are audit artifacts; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::CorrelationKey;
use crate::core::Decision;
use crate::core::DecisionAction;
use crate::core::DecisionDetails;
use crate::core::DecisionEvent;
use crate::core::DecisionId;
use crate::core::DecisionPage;
use crate::core::DecisionQuery;
use crate::core::DecisionStatus;
use crate::core::EventId;
use crate::core::OutboxEntry;
use crate::core::PolicySnapshot;
use crate::core::Recommendation;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Decision store errors.
///
/// # Invariants
/// - A returned error means the attempted commit did not happen.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("decision store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("decision store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("decision store version mismatch: {0}")]
    VersionMismatch(String),
    /// Caller supplied data the store cannot accept.
    #[error("decision store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("decision store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Write Requests
// ============================================================================

/// Everything written atomically when a gate is created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGate {
    /// Decision row in its initial status.
    pub decision: Decision,
    /// Recommendation written once.
    pub recommendation: Recommendation,
    /// Initial policy snapshot.
    pub snapshot: PolicySnapshot,
    /// Synthesized action for auto-resolved gates.
    pub action: Option<DecisionAction>,
    /// Outbox events for the initial status.
    pub events: Vec<DecisionEvent>,
}

/// Result of a gate insert.
#[derive(Debug, Clone, PartialEq)]
pub enum GateInsert {
    /// A new decision was committed.
    Created(Decision),
    /// An open decision already held the correlation key; nothing was written.
    Existing(Decision),
}

/// Compare-and-swap request on a decision's status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    /// Target decision.
    pub decision_id: DecisionId,
    /// Statuses the decision must currently be in.
    pub expected: Vec<DecisionStatus>,
    /// Status to install.
    pub next: DecisionStatus,
    /// Resume token to install, if the next status is resumable.
    pub resume_token: Option<String>,
    /// Action row to append.
    pub action: Option<DecisionAction>,
    /// Outbox events to append.
    pub events: Vec<DecisionEvent>,
    /// Commit time.
    pub at: Timestamp,
}

/// Result of a status compare-and-swap.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The swap committed; holds the updated decision.
    Applied(Decision),
    /// The decision was not in an expected status; nothing was written.
    Conflict(Decision),
    /// No decision has this identifier.
    NotFound,
}

/// Keyset position in the overdue scan order `(expires_at, decision_id)`.
///
/// A scan passes the last row it saw so the next page starts strictly after
/// it. Rows that keep failing therefore never hide rows behind them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverdueCursor {
    /// Deadline of the last row seen.
    pub expires_at: Timestamp,
    /// Identifier of the last row seen.
    pub decision_id: DecisionId,
}

impl OverdueCursor {
    /// Builds a cursor positioned at `decision`; `None` without a deadline.
    #[must_use]
    pub fn after(decision: &Decision) -> Option<Self> {
        decision.expires_at.map(|expires_at| Self {
            expires_at,
            decision_id: decision.decision_id.clone(),
        })
    }
}

// ============================================================================
// SECTION: Store Traits
// ============================================================================

/// Durable decision repository.
pub trait DecisionStore {
    /// Returns the open (not yet `executed`) decision for a correlation key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_open(&self, key: &CorrelationKey) -> Result<Option<Decision>, StoreError>;

    /// Atomically inserts a gate unless an open decision holds its key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails.
    fn insert_gate(&self, gate: NewGate) -> Result<GateInsert, StoreError>;

    /// Atomically swaps status when the current status is expected, appending
    /// the action and events in the same commit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails.
    fn transition(&self, transition: StatusTransition) -> Result<TransitionOutcome, StoreError>;

    /// Appends a policy snapshot produced by re-evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the decision is unknown or the commit fails.
    fn append_policy_snapshot(&self, snapshot: &PolicySnapshot) -> Result<(), StoreError>;

    /// Loads a decision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_decision(&self, decision_id: &DecisionId) -> Result<Option<Decision>, StoreError>;

    /// Loads a decision with its recommendation, snapshots, and actions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_details(&self, decision_id: &DecisionId)
    -> Result<Option<DecisionDetails>, StoreError>;

    /// Lists decisions newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_decisions(&self, query: &DecisionQuery) -> Result<DecisionPage, StoreError>;

    /// Returns pending decisions whose `expires_at <= now`, ordered by
    /// `(expires_at, decision_id)` and starting strictly after `after`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the scan fails.
    fn overdue_decisions(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        limit: usize,
    ) -> Result<Vec<Decision>, StoreError>;

    /// Verifies the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot serve requests.
    fn readiness(&self) -> Result<(), StoreError>;
}

/// Durable, per-decision ordered outbox.
pub trait EventOutbox {
    /// Returns deliverable events: for each decision, only its oldest
    /// undelivered event, and only when `next_attempt_at <= now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the scan fails.
    fn pending_events(&self, now: Timestamp, limit: usize) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Marks an event delivered after transport acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn mark_delivered(&self, event_id: &EventId, delivered_at: Timestamp)
    -> Result<(), StoreError>;

    /// Records a failed delivery and schedules the next attempt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn record_failure(
        &self,
        event_id: &EventId,
        error: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Returns every outbox entry for a decision in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn decision_events(&self, decision_id: &DecisionId) -> Result<Vec<OutboxEntry>, StoreError>;
}

/// Store backend usable from concurrent handlers and workers.
pub trait DecisionBackend: DecisionStore + EventOutbox + Send + Sync {}

impl<T> DecisionBackend for T where T: DecisionStore + EventOutbox + Send + Sync {}
