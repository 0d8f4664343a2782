// crates/dcp-core/tests/outbox.rs
// ============================================================================
// Module: Outbox Tests
// Description: Event keys, per-decision ordering, and delivery bookkeeping.
// Purpose: Validate the in-memory outbox contract used by the dispatcher.
// Dependencies: dcp-core
// ============================================================================
//! ## Overview
//! Verifies replay-stable idempotency keys, the head-of-line rule that keeps
//! a decision's events in commit order, and failure rescheduling.

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

use dcp_core::ActionId;
use dcp_core::ActionInput;
use dcp_core::ActionRequest;
use dcp_core::ActionType;
use dcp_core::DecisionId;
use dcp_core::EventEnvelope;
use dcp_core::EventOutbox;
use dcp_core::EventType;
use dcp_core::runtime::idempotency_key;
use dcp_core::runtime::resume_token;

use crate::common::at;
use crate::common::engine;
use crate::common::human_request;

/// Verifies keys depend only on the triggering fact.
#[test]
fn idempotency_keys_are_replay_stable() {
    let decision_id = DecisionId::new("decision-1");
    let first = idempotency_key(&decision_id, EventType::Actioned, Some(ActionType::Approve)).unwrap();
    let replay = idempotency_key(&decision_id, EventType::Actioned, Some(ActionType::Approve)).unwrap();
    assert_eq!(first, replay);
    assert_eq!(first.len(), 64);

    let reject = idempotency_key(&decision_id, EventType::Actioned, Some(ActionType::Reject)).unwrap();
    let paused = idempotency_key(&decision_id, EventType::Paused, None).unwrap();
    let other = idempotency_key(&DecisionId::new("decision-2"), EventType::Paused, None).unwrap();
    assert_ne!(first, reject);
    assert_ne!(paused, other);

    let action_id = ActionId::new("action-1");
    assert_eq!(
        resume_token(&decision_id, &action_id).unwrap(),
        resume_token(&decision_id, &action_id).unwrap()
    );
    assert_ne!(
        resume_token(&decision_id, &action_id).unwrap(),
        resume_token(&decision_id, &ActionId::new("action-2")).unwrap()
    );
}

/// Verifies only the oldest undelivered event per decision is offered.
#[test]
fn outbox_offers_one_head_per_decision_in_commit_order() {
    let engine = engine();
    let first = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;
    let second = engine.create_gate(human_request("exec-2", "node-1"), at(1)).unwrap().decision;
    engine
        .apply_action(
            &first.decision_id,
            ActionRequest::new(ActionType::Approve, ActionInput::default()),
            at(2),
        )
        .unwrap();

    let outbox = engine.store();
    let pending = outbox.pending_events(at(10), 10).unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].event.decision_id, first.decision_id);
    assert_eq!(pending[0].event.event_type, EventType::Paused);
    assert_eq!(pending[1].event.decision_id, second.decision_id);

    outbox.mark_delivered(&pending[0].event.event_id, at(11)).unwrap();
    let pending = outbox.pending_events(at(12), 10).unwrap();
    let heads: Vec<_> =
        pending.iter().map(|entry| (entry.event.decision_id.clone(), entry.sequence)).collect();
    assert!(heads.contains(&(first.decision_id.clone(), 2)));
    assert!(heads.contains(&(second.decision_id.clone(), 1)));
    assert_eq!(outbox.pending_events(at(12), 1).unwrap().len(), 1);
}

/// Verifies failures reschedule without dropping or reordering events.
#[test]
fn failed_deliveries_are_rescheduled() {
    let engine = engine();
    let gate = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;
    engine
        .apply_action(
            &gate.decision_id,
            ActionRequest::new(ActionType::Reject, ActionInput::default()),
            at(1),
        )
        .unwrap();
    let outbox = engine.store();
    let head = outbox.pending_events(at(5), 10).unwrap().remove(0);
    outbox.record_failure(&head.event.event_id, "connection refused", at(1_000)).unwrap();

    assert!(outbox.pending_events(at(999), 10).unwrap().is_empty());
    let retried = outbox.pending_events(at(1_000), 10).unwrap();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].event.event_id, head.event.event_id);
    assert_eq!(retried[0].attempts, 1);
    assert_eq!(retried[0].last_error.as_deref(), Some("connection refused"));

    outbox.mark_delivered(&head.event.event_id, at(1_001)).unwrap();
    let next = outbox.pending_events(at(1_002), 10).unwrap();
    assert_eq!(next[0].sequence, 2);
    assert_eq!(next[0].event.event_type, EventType::Actioned);
}

/// Verifies the wire envelope carries the outbox metadata.
#[test]
fn envelope_carries_event_metadata() {
    let engine = engine();
    let gate = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;
    let entry = engine.store().decision_events(&gate.decision_id).unwrap().remove(0);
    let envelope = EventEnvelope::from_outbox(&entry, "dcp");
    assert_eq!(envelope.event_type, "decision.paused");
    assert_eq!(envelope.specversion, "1.0");
    assert_eq!(envelope.subject, gate.decision_id.as_str());
    assert_eq!(envelope.sequence, 1);
    assert_eq!(envelope.trace_id, gate.trace_id.as_str());
    assert_eq!(envelope.time, "2026-01-01T00:00:00Z");

    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["type"], "decision.paused");
    assert_eq!(json["data"]["node_id"], "node-1");
}
