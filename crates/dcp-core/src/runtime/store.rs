// crates/dcp-core/src/runtime/store.rs
// ============================================================================
// Module: In-Memory Decision Store
// Description: Mutex-guarded decision store and the shared store wrapper.
// Purpose: Provide a deterministic store for tests, demos, and memory mode.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryDecisionStore`] implements [`DecisionStore`] and [`EventOutbox`]
//! with a single mutex, which makes every method trivially atomic. It is not
//! durable; use the SQLite store for anything that must survive a restart.
//! [`SharedDecisionStore`] wraps any backend in a clonable `Arc` trait object.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

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
use crate::interfaces::DecisionBackend;
use crate::interfaces::DecisionStore;
use crate::interfaces::EventOutbox;
use crate::interfaces::GateInsert;
use crate::interfaces::NewGate;
use crate::interfaces::OverdueCursor;
use crate::interfaces::StatusTransition;
use crate::interfaces::StoreError;
use crate::interfaces::TransitionOutcome;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Decision with its child rows.
#[derive(Debug, Clone)]
struct StoredDecision {
    /// Insertion order, used to break `created_at` ties.
    order: u64,
    /// Decision row.
    decision: Decision,
    /// Recommendation row.
    recommendation: Recommendation,
    /// Policy snapshots in append order.
    snapshots: Vec<PolicySnapshot>,
    /// Actions in commit order.
    actions: Vec<DecisionAction>,
    /// Outbox entries in sequence order.
    outbox: Vec<OutboxEntry>,
}

/// Mutable store contents.
#[derive(Debug, Default)]
struct MemoryState {
    /// Decisions by identifier.
    decisions: BTreeMap<DecisionId, StoredDecision>,
    /// Correlation keys of open decisions.
    open_keys: BTreeMap<CorrelationKey, DecisionId>,
    /// Next insertion order value.
    next_order: u64,
}

/// In-memory decision store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDecisionStore {
    /// Store contents protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryDecisionStore {
    /// Creates a new in-memory decision store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the store contents.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("decision store mutex poisoned".to_string()))
    }
}

/// Appends events to a decision's outbox, assigning sequence numbers.
fn append_events(stored: &mut StoredDecision, events: Vec<DecisionEvent>) {
    for event in events {
        let sequence = stored.outbox.last().map_or(1, |entry| entry.sequence + 1);
        let next_attempt_at = event.occurred_at;
        stored.outbox.push(OutboxEntry {
            sequence,
            event,
            attempts: 0,
            next_attempt_at,
            last_error: None,
            delivered_at: None,
        });
    }
}

impl DecisionStore for InMemoryDecisionStore {
    fn find_open(&self, key: &CorrelationKey) -> Result<Option<Decision>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .open_keys
            .get(key)
            .and_then(|id| guard.decisions.get(id))
            .map(|stored| stored.decision.clone()))
    }

    fn insert_gate(&self, gate: NewGate) -> Result<GateInsert, StoreError> {
        let mut guard = self.lock()?;
        let key = gate.decision.correlation_key();
        if let Some(existing) = guard.open_keys.get(&key).and_then(|id| guard.decisions.get(id)) {
            return Ok(GateInsert::Existing(existing.decision.clone()));
        }
        if guard.decisions.contains_key(&gate.decision.decision_id) {
            return Err(StoreError::Invalid(format!(
                "decision {} already exists",
                gate.decision.decision_id
            )));
        }
        let order = guard.next_order;
        guard.next_order += 1;
        let decision_id = gate.decision.decision_id.clone();
        let mut stored = StoredDecision {
            order,
            decision: gate.decision,
            recommendation: gate.recommendation,
            snapshots: vec![gate.snapshot],
            actions: gate.action.into_iter().collect(),
            outbox: Vec::new(),
        };
        append_events(&mut stored, gate.events);
        let decision = stored.decision.clone();
        if decision.status != DecisionStatus::Executed {
            guard.open_keys.insert(key, decision_id.clone());
        }
        guard.decisions.insert(decision_id, stored);
        Ok(GateInsert::Created(decision))
    }

    fn transition(&self, transition: StatusTransition) -> Result<TransitionOutcome, StoreError> {
        let mut guard = self.lock()?;
        let Some(stored) = guard.decisions.get_mut(&transition.decision_id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !transition.expected.contains(&stored.decision.status) {
            return Ok(TransitionOutcome::Conflict(stored.decision.clone()));
        }
        stored.decision.status = transition.next;
        stored.decision.updated_at = transition.at;
        stored.decision.version += 1;
        if transition.resume_token.is_some() {
            stored.decision.resume_token = transition.resume_token;
        }
        stored.actions.extend(transition.action);
        append_events(stored, transition.events);
        let decision = stored.decision.clone();
        if decision.status == DecisionStatus::Executed {
            guard.open_keys.remove(&decision.correlation_key());
        }
        Ok(TransitionOutcome::Applied(decision))
    }

    fn append_policy_snapshot(&self, snapshot: &PolicySnapshot) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let stored = guard.decisions.get_mut(&snapshot.decision_id).ok_or_else(|| {
            StoreError::Invalid(format!("unknown decision {}", snapshot.decision_id))
        })?;
        stored.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn load_decision(&self, decision_id: &DecisionId) -> Result<Option<Decision>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.decisions.get(decision_id).map(|stored| stored.decision.clone()))
    }

    fn load_details(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Option<DecisionDetails>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.decisions.get(decision_id).map(|stored| DecisionDetails {
            decision: stored.decision.clone(),
            recommendation: stored.recommendation.clone(),
            policy_snapshots: stored.snapshots.clone(),
            actions: stored.actions.clone(),
        }))
    }

    fn list_decisions(&self, query: &DecisionQuery) -> Result<DecisionPage, StoreError> {
        let guard = self.lock()?;
        let mut matching: Vec<&StoredDecision> = guard
            .decisions
            .values()
            .filter(|stored| query.status.is_none_or(|status| stored.decision.status == status))
            .filter(|stored| {
                query.org_id.as_ref().is_none_or(|org_id| &stored.decision.org_id == org_id)
            })
            .collect();
        matching.sort_by(|left, right| {
            right
                .decision
                .created_at
                .cmp(&left.decision.created_at)
                .then_with(|| right.order.cmp(&left.order))
        });
        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let items = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|stored| stored.decision.clone())
            .collect();
        Ok(DecisionPage {
            items,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }

    fn overdue_decisions(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        limit: usize,
    ) -> Result<Vec<Decision>, StoreError> {
        let guard = self.lock()?;
        let mut overdue: Vec<(Timestamp, Decision)> = guard
            .decisions
            .values()
            .map(|stored| &stored.decision)
            .filter(|decision| decision.status == DecisionStatus::PendingHumanReview)
            .filter_map(|decision| {
                decision
                    .expires_at
                    .filter(|expires_at| *expires_at <= now)
                    .map(|expires_at| (expires_at, decision))
            })
            .filter(|(expires_at, decision)| {
                after.is_none_or(|cursor| {
                    (*expires_at, &decision.decision_id) > (cursor.expires_at, &cursor.decision_id)
                })
            })
            .map(|(expires_at, decision)| (expires_at, decision.clone()))
            .collect();
        overdue.sort_by(|left, right| {
            (left.0, &left.1.decision_id).cmp(&(right.0, &right.1.decision_id))
        });
        Ok(overdue.into_iter().take(limit).map(|(_, decision)| decision).collect())
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

impl EventOutbox for InMemoryDecisionStore {
    fn pending_events(&self, now: Timestamp, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let guard = self.lock()?;
        let mut heads: Vec<(u64, &OutboxEntry)> = guard
            .decisions
            .values()
            .filter_map(|stored| {
                stored
                    .outbox
                    .iter()
                    .find(|entry| entry.delivered_at.is_none())
                    .map(|entry| (stored.order, entry))
            })
            .filter(|(_, entry)| entry.next_attempt_at <= now)
            .collect();
        heads.sort_by(|(left_order, left), (right_order, right)| {
            left.event
                .occurred_at
                .cmp(&right.event.occurred_at)
                .then_with(|| left_order.cmp(right_order))
        });
        Ok(heads.into_iter().take(limit).map(|(_, entry)| entry.clone()).collect())
    }

    fn mark_delivered(
        &self,
        event_id: &EventId,
        delivered_at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let entry = find_entry(&mut guard, event_id)?;
        entry.delivered_at.get_or_insert(delivered_at);
        Ok(())
    }

    fn record_failure(
        &self,
        event_id: &EventId,
        error: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let entry = find_entry(&mut guard, event_id)?;
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_error = Some(error.to_string());
        entry.next_attempt_at = next_attempt_at;
        Ok(())
    }

    fn decision_events(&self, decision_id: &DecisionId) -> Result<Vec<OutboxEntry>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.decisions.get(decision_id).map(|stored| stored.outbox.clone()).unwrap_or_default())
    }
}

/// Finds an outbox entry by event identifier.
fn find_entry<'a>(
    state: &'a mut MemoryState,
    event_id: &EventId,
) -> Result<&'a mut OutboxEntry, StoreError> {
    state
        .decisions
        .values_mut()
        .flat_map(|stored| stored.outbox.iter_mut())
        .find(|entry| &entry.event.event_id == event_id)
        .ok_or_else(|| StoreError::Invalid(format!("unknown event {event_id}")))
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared decision store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedDecisionStore {
    /// Inner store implementation.
    inner: Arc<dyn DecisionBackend>,
}

impl SharedDecisionStore {
    /// Wraps a store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl DecisionBackend + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn DecisionBackend>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl DecisionStore for SharedDecisionStore {
    fn find_open(&self, key: &CorrelationKey) -> Result<Option<Decision>, StoreError> {
        self.inner.find_open(key)
    }

    fn insert_gate(&self, gate: NewGate) -> Result<GateInsert, StoreError> {
        self.inner.insert_gate(gate)
    }

    fn transition(&self, transition: StatusTransition) -> Result<TransitionOutcome, StoreError> {
        self.inner.transition(transition)
    }

    fn append_policy_snapshot(&self, snapshot: &PolicySnapshot) -> Result<(), StoreError> {
        self.inner.append_policy_snapshot(snapshot)
    }

    fn load_decision(&self, decision_id: &DecisionId) -> Result<Option<Decision>, StoreError> {
        self.inner.load_decision(decision_id)
    }

    fn load_details(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Option<DecisionDetails>, StoreError> {
        self.inner.load_details(decision_id)
    }

    fn list_decisions(&self, query: &DecisionQuery) -> Result<DecisionPage, StoreError> {
        self.inner.list_decisions(query)
    }

    fn overdue_decisions(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        limit: usize,
    ) -> Result<Vec<Decision>, StoreError> {
        self.inner.overdue_decisions(now, after, limit)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}

impl EventOutbox for SharedDecisionStore {
    fn pending_events(&self, now: Timestamp, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        self.inner.pending_events(now, limit)
    }

    fn mark_delivered(
        &self,
        event_id: &EventId,
        delivered_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.inner.mark_delivered(event_id, delivered_at)
    }

    fn record_failure(
        &self,
        event_id: &EventId,
        error: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.inner.record_failure(event_id, error, next_attempt_at)
    }

    fn decision_events(&self, decision_id: &DecisionId) -> Result<Vec<OutboxEntry>, StoreError> {
        self.inner.decision_events(decision_id)
    }
}
