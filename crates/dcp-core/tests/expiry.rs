// crates/dcp-core/tests/expiry.rs
// ============================================================================
// Module: Expiry Supervisor Tests
// Description: SLA expiry scans and their race with human actions.
// Purpose: Validate overdue gates resolve exactly once.
// Dependencies: dcp-core
// ============================================================================
//! ## Overview
//! Exercises expiry scans against pending, resolved, and not-yet-due
//! decisions, and the race between a scan and a concurrent human action.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use dcp_core::ActionInput;
use dcp_core::ActionRequest;
use dcp_core::ActionType;
use dcp_core::ActorType;
use dcp_core::CorrelationKey;
use dcp_core::Decision;
use dcp_core::DecisionDetails;
use dcp_core::DecisionEngine;
use dcp_core::DecisionId;
use dcp_core::DecisionPage;
use dcp_core::DecisionQuery;
use dcp_core::DecisionStatus;
use dcp_core::DecisionStore;
use dcp_core::EngineConfig;
use dcp_core::EventId;
use dcp_core::EventOutbox;
use dcp_core::EventType;
use dcp_core::GateInsert;
use dcp_core::InMemoryDecisionStore;
use dcp_core::NewGate;
use dcp_core::OutboxEntry;
use dcp_core::OverdueCursor;
use dcp_core::PolicyCatalog;
use dcp_core::PolicyRegistry;
use dcp_core::PolicySnapshot;
use dcp_core::SharedDecisionStore;
use dcp_core::StatusTransition;
use dcp_core::StoreError;
use dcp_core::Timestamp;
use dcp_core::TransitionOutcome;

use crate::common::at;
use crate::common::engine;
use crate::common::engine_with;
use crate::common::human_request;

/// Thirty minutes in milliseconds.
const THIRTY_MINUTES_MS: i64 = 30 * 60 * 1000;

/// Verifies an overdue gate expires with a system action and one event.
#[test]
fn overdue_gate_expires_with_system_action() {
    let engine = engine();
    let mut request = human_request("exec-1", "node-1");
    request.sla_seconds = Some(60);
    let gate = engine.create_gate(request, at(0)).unwrap().decision;

    let now = at(60_000 + THIRTY_MINUTES_MS);
    let report = engine.expire_overdue(now).unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.expired, vec![gate.decision_id.clone()]);
    assert!(report.failures.is_empty());

    let details = engine.details(&gate.decision_id).unwrap();
    assert_eq!(details.decision.status, DecisionStatus::Expired);
    assert!(details.decision.resume_token.is_some());
    assert_eq!(details.actions.len(), 1);
    assert_eq!(details.actions[0].action_type, ActionType::Expire);
    assert_eq!(details.actions[0].actor_type, ActorType::System);
    assert!(details.actions[0].actor_id.is_none());

    let events = engine.store().decision_events(&gate.decision_id).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event.event_type, EventType::Expired);

    let rescan = engine.expire_overdue(now.plus_seconds(60)).unwrap();
    assert_eq!(rescan.scanned, 0);
}

/// Verifies decisions without a deadline or not yet due are untouched.
#[test]
fn gates_not_yet_due_are_left_pending() {
    let engine = engine();
    let untimed = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;
    let mut request = human_request("exec-2", "node-1");
    request.sla_seconds = Some(600);
    let timed = engine.create_gate(request, at(0)).unwrap().decision;

    let report = engine.expire_overdue(at(599_999)).unwrap();
    assert_eq!(report.scanned, 0);
    let report = engine.expire_overdue(at(600_000)).unwrap();
    assert_eq!(report.expired, vec![timed.decision_id]);
    assert_eq!(
        engine.decision(&untimed.decision_id).unwrap().status,
        DecisionStatus::PendingHumanReview
    );
}

/// Verifies a resolved decision is never expired.
#[test]
fn resolved_decisions_are_not_expired() {
    let engine = engine();
    let mut request = human_request("exec-1", "node-1");
    request.sla_seconds = Some(1);
    let gate = engine.create_gate(request, at(0)).unwrap().decision;
    engine
        .apply_action(
            &gate.decision_id,
            ActionRequest::new(ActionType::Approve, ActionInput::default()),
            at(500),
        )
        .unwrap();
    let report = engine.expire_overdue(at(10_000)).unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(engine.decision(&gate.decision_id).unwrap().status, DecisionStatus::Approved);
}

/// Verifies the batch size bounds a single scan and later scans catch up.
#[test]
fn scans_respect_batch_size() {
    let engine = engine_with(EngineConfig {
        expiry_batch_size: 2,
        default_sla_seconds: Some(1),
        ..EngineConfig::default()
    });
    for index in 0..5 {
        engine.create_gate(human_request(&format!("exec-{index}"), "node-1"), at(0)).unwrap();
    }
    assert_eq!(engine.expire_overdue(at(5_000)).unwrap().expired.len(), 2);
    assert_eq!(engine.expire_overdue(at(5_000)).unwrap().expired.len(), 2);
    assert_eq!(engine.expire_overdue(at(5_000)).unwrap().expired.len(), 1);
    assert_eq!(engine.expire_overdue(at(5_000)).unwrap().scanned, 0);
}

/// Verifies a scan racing a human action ends in exactly one terminal state.
#[test]
fn expiry_and_human_action_race_has_one_winner() {
    for round in 0..20 {
        let engine = Arc::new(engine());
        let mut request = human_request(&format!("exec-{round}"), "node-1");
        request.sla_seconds = Some(1);
        let gate = engine.create_gate(request, at(0)).unwrap().decision;
        let barrier = Arc::new(Barrier::new(2));

        let scanner = {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.expire_overdue(at(2_000)).unwrap()
            })
        };
        let actor = {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let decision_id = gate.decision_id.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.apply_action(
                    &decision_id,
                    ActionRequest::new(ActionType::Approve, ActionInput::default()),
                    at(2_000),
                )
            })
        };
        let report = scanner.join().unwrap();
        let action = actor.join().unwrap();

        let details = engine.details(&gate.decision_id).unwrap();
        assert_eq!(details.actions.len(), 1);
        match details.decision.status {
            DecisionStatus::Expired => {
                assert!(action.is_err());
                assert_eq!(report.expired.len(), 1);
            }
            DecisionStatus::Approved => {
                assert!(action.is_ok());
                assert!(report.expired.is_empty());
            }
            other => panic!("unexpected status {other}"),
        }
        let events = engine.store().decision_events(&gate.decision_id).unwrap();
        assert_eq!(events.len(), 2);
    }
}

// ============================================================================
// SECTION: Failing Rows
// ============================================================================

/// In-memory store whose expiry commits fail for one execution.
struct StuckExpiryStore {
    /// Backing store.
    inner: InMemoryDecisionStore,
    /// Execution whose decisions can never be expired.
    stuck_execution: &'static str,
}

impl DecisionStore for StuckExpiryStore {
    fn find_open(&self, key: &CorrelationKey) -> Result<Option<Decision>, StoreError> {
        self.inner.find_open(key)
    }

    fn insert_gate(&self, gate: NewGate) -> Result<GateInsert, StoreError> {
        self.inner.insert_gate(gate)
    }

    fn transition(&self, transition: StatusTransition) -> Result<TransitionOutcome, StoreError> {
        if transition.next == DecisionStatus::Expired {
            let current = self.inner.load_decision(&transition.decision_id)?;
            if current.is_some_and(|decision| {
                decision.execution_id.as_str() == self.stuck_execution
            }) {
                return Err(StoreError::Io("disk full".to_string()));
            }
        }
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

impl EventOutbox for StuckExpiryStore {
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

/// Verifies a row that fails on every scan does not block later deadlines.
#[test]
fn failing_row_does_not_starve_later_deadlines() {
    let store = SharedDecisionStore::from_store(StuckExpiryStore {
        inner: InMemoryDecisionStore::new(),
        stuck_execution: "exec-stuck",
    });
    let registry = PolicyRegistry::new(PolicyCatalog::builtin().unwrap());
    let engine = DecisionEngine::new(
        store,
        Arc::new(registry),
        EngineConfig {
            expiry_batch_size: 1,
            ..EngineConfig::default()
        },
    );
    let mut request = human_request("exec-stuck", "node-1");
    request.sla_seconds = Some(1);
    let stuck = engine.create_gate(request, at(0)).unwrap().decision;
    let mut request = human_request("exec-later", "node-1");
    request.sla_seconds = Some(2);
    let later = engine.create_gate(request, at(0)).unwrap().decision;

    let report = engine.expire_overdue(at(10_000)).unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.expired, vec![later.decision_id.clone()]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].decision_id, stuck.decision_id);
    assert_eq!(engine.decision(&later.decision_id).unwrap().status, DecisionStatus::Expired);

    let rescan = engine.expire_overdue(at(20_000)).unwrap();
    assert_eq!(rescan.scanned, 1);
    assert!(rescan.expired.is_empty());
    assert_eq!(rescan.failures.len(), 1);
    assert_eq!(
        engine.decision(&stuck.decision_id).unwrap().status,
        DecisionStatus::PendingHumanReview
    );
}

/// Verifies the overdue listing resumes strictly after a cursor.
#[test]
fn overdue_listing_resumes_after_cursor() {
    let store = InMemoryDecisionStore::new();
    let engine = DecisionEngine::new(
        SharedDecisionStore::from_store(store),
        Arc::new(PolicyRegistry::new(PolicyCatalog::builtin().unwrap())),
        EngineConfig {
            default_sla_seconds: Some(1),
            ..EngineConfig::default()
        },
    );
    for index in 0..3 {
        engine.create_gate(human_request(&format!("exec-{index}"), "node-1"), at(0)).unwrap();
    }
    let all = engine.store().overdue_decisions(at(5_000), None, 10).unwrap();
    assert_eq!(all.len(), 3);
    let mut ids: Vec<DecisionId> = all.iter().map(|decision| decision.decision_id.clone()).collect();
    let sorted = {
        let mut sorted = ids.clone();
        sorted.sort();
        sorted
    };
    assert_eq!(ids, sorted);

    let cursor = OverdueCursor::after(&all[0]).unwrap();
    let rest = engine.store().overdue_decisions(at(5_000), Some(&cursor), 10).unwrap();
    ids.remove(0);
    assert_eq!(rest.iter().map(|decision| decision.decision_id.clone()).collect::<Vec<_>>(), ids);
}
