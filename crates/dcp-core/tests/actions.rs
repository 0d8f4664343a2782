// crates/dcp-core/tests/actions.rs
// ============================================================================
// Module: Action State Machine Tests
// Description: Human actions, conflicts, and resume acknowledgments.
// Purpose: Validate first-writer-wins transitions and resume semantics.
// Dependencies: dcp-core
// ============================================================================
//! ## Overview
//! Exercises the action processor: legal transitions out of pending review,
//! conflicts against resolved decisions, concurrent first-writer-wins, and
//! the resume token handshake.
//!
//! Security posture: caller-supplied comments and actors are sanitized.

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
use dcp_core::DecisionStatus;
use dcp_core::EngineError;
use dcp_core::ErrorCategory;
use dcp_core::EventOutbox;
use dcp_core::EventType;
use dcp_core::runtime::idempotency_key;
use serde_json::json;

use crate::common::at;
use crate::common::engine;
use crate::common::human_request;

/// Builds an action request from a human actor.
fn human(action_type: ActionType) -> ActionRequest {
    ActionRequest::new(
        action_type,
        ActionInput {
            actor_id: Some("reviewer@example.com".to_string()),
            ..ActionInput::default()
        },
    )
}

/// Verifies each action maps onto its resulting status.
#[test]
fn actions_transition_pending_decisions() {
    let engine = engine();
    let cases = [
        (ActionType::Approve, DecisionStatus::Approved),
        (ActionType::Reject, DecisionStatus::Rejected),
        (ActionType::Escalate, DecisionStatus::Escalated),
    ];
    for (index, (action_type, expected)) in cases.into_iter().enumerate() {
        let gate = engine
            .create_gate(human_request(&format!("exec-{index}"), "node-1"), at(0))
            .unwrap()
            .decision;
        let updated = engine.apply_action(&gate.decision_id, human(action_type), at(100)).unwrap();
        assert_eq!(updated.status, expected);
        assert_eq!(updated.version, gate.version + 1);
        assert_eq!(updated.updated_at, at(100));
        assert!(updated.resume_token.is_some());

        let events = engine.store().decision_events(&gate.decision_id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event.event_type, EventType::Actioned);
        assert_eq!(events[1].sequence, 2);
        assert_eq!(
            events[1].event.idempotency_key,
            idempotency_key(&gate.decision_id, EventType::Actioned, Some(action_type)).unwrap()
        );
    }
}

/// Verifies modify stores its payload and requires a non-empty object.
#[test]
fn modify_requires_modifications() {
    let engine = engine();
    let gate = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;

    for modifications in [None, Some(json!({})), Some(json!(["amount"]))] {
        let request = ActionRequest::new(
            ActionType::Modify,
            ActionInput {
                modifications,
                ..ActionInput::default()
            },
        );
        let err = engine.apply_action(&gate.decision_id, request, at(1)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    let request = ActionRequest::new(
        ActionType::Modify,
        ActionInput {
            modifications: Some(json!({"amount": 40})),
            comment: Some("  lower <b>amount</b>\n".to_string()),
            ..ActionInput::default()
        },
    );
    let updated = engine.apply_action(&gate.decision_id, request, at(2)).unwrap();
    assert_eq!(updated.status, DecisionStatus::Modified);
    let details = engine.details(&gate.decision_id).unwrap();
    assert_eq!(details.actions.len(), 1);
    assert_eq!(details.actions[0].payload, Some(json!({"amount": 40})));
    assert_eq!(details.actions[0].comment.as_deref(), Some("lower bamount/b"));
    assert_eq!(details.actions[0].actor_type, ActorType::Human);
}

/// Verifies reserved action and actor types are rejected.
#[test]
fn reserved_actions_are_rejected() {
    let engine = engine();
    let gate = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;
    let expire = engine.apply_action(&gate.decision_id, human(ActionType::Expire), at(1));
    assert_eq!(expire.unwrap_err().category(), ErrorCategory::Validation);

    let policy_actor = ActionRequest::new(
        ActionType::Approve,
        ActionInput {
            actor_type: ActorType::Policy,
            ..ActionInput::default()
        },
    );
    let err = engine.apply_action(&gate.decision_id, policy_actor, at(1)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    let long_actor = ActionRequest::new(
        ActionType::Approve,
        ActionInput {
            actor_id: Some("a".repeat(256)),
            ..ActionInput::default()
        },
    );
    let err = engine.apply_action(&gate.decision_id, long_actor, at(1)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(
        engine.decision(&gate.decision_id).unwrap().status,
        DecisionStatus::PendingHumanReview
    );
}

/// Verifies actions against resolved decisions conflict and return state.
#[test]
fn actions_on_resolved_decisions_conflict() {
    let engine = engine();
    let gate = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;
    engine.apply_action(&gate.decision_id, human(ActionType::Reject), at(1)).unwrap();
    let err = engine.apply_action(&gate.decision_id, human(ActionType::Approve), at(2)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Conflict);
    let current = err.conflicting_decision().unwrap();
    assert_eq!(current.status, DecisionStatus::Rejected);

    let details = engine.details(&gate.decision_id).unwrap();
    assert_eq!(details.actions.len(), 1);
    assert_eq!(engine.store().decision_events(&gate.decision_id).unwrap().len(), 2);
}

/// Verifies actions on unknown decisions report not found.
#[test]
fn actions_on_unknown_decisions_are_not_found() {
    let engine = engine();
    let err = engine
        .apply_action(&dcp_core::DecisionId::new("missing"), human(ActionType::Approve), at(0))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

/// Verifies concurrent approve and reject yield exactly one winner.
#[test]
fn concurrent_actions_have_a_single_winner() {
    for round in 0..20 {
        let engine = Arc::new(engine());
        let gate = engine
            .create_gate(human_request(&format!("exec-{round}"), "node-1"), at(0))
            .unwrap()
            .decision;
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [ActionType::Approve, ActionType::Reject]
            .into_iter()
            .map(|action_type| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                let decision_id = gate.decision_id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    engine.apply_action(&decision_id, human(action_type), at(1))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

        let winners: Vec<_> = results.iter().filter_map(|result| result.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        let losers: Vec<_> = results.iter().filter_map(|result| result.as_ref().err()).collect();
        assert_eq!(losers.len(), 1);
        assert_eq!(losers[0].category(), ErrorCategory::Conflict);

        let details = engine.details(&gate.decision_id).unwrap();
        assert_eq!(details.actions.len(), 1);
        assert_eq!(details.decision.status, details.actions[0].action_type.resulting_status());
        assert_eq!(details.decision.status, winners[0].status);
    }
}

/// Verifies resume acknowledgment moves a resolved decision to executed once.
#[test]
fn resume_acknowledgment_is_idempotent() {
    let engine = engine();
    let gate = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;
    let approved = engine.apply_action(&gate.decision_id, human(ActionType::Approve), at(1)).unwrap();
    let token = approved.resume_token.clone().unwrap();

    let resumed = engine.acknowledge_resume(&gate.decision_id, &token, at(2)).unwrap();
    assert_eq!(resumed.status, DecisionStatus::Executed);
    let again = engine.acknowledge_resume(&gate.decision_id, &token, at(3)).unwrap();
    assert_eq!(again.status, DecisionStatus::Executed);
    assert_eq!(again.version, resumed.version);

    let events = engine.store().decision_events(&gate.decision_id).unwrap();
    let kinds: Vec<_> = events.iter().map(|entry| entry.event.event_type).collect();
    assert_eq!(kinds, vec![EventType::Paused, EventType::Actioned, EventType::Resumed]);
    assert_eq!(events[2].event.data["previous_status"], "approved");
    assert_eq!(engine.details(&gate.decision_id).unwrap().actions.len(), 1);
}

/// Verifies resume rejects pending decisions and wrong tokens.
#[test]
fn resume_requires_resolution_and_matching_token() {
    let engine = engine();
    let gate = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;
    let err = engine.acknowledge_resume(&gate.decision_id, "token", at(1)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Conflict);

    engine.apply_action(&gate.decision_id, human(ActionType::Escalate), at(2)).unwrap();
    let err = engine.acknowledge_resume(&gate.decision_id, "not-the-token", at(3)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(engine.decision(&gate.decision_id).unwrap().status, DecisionStatus::Escalated);
}

/// Verifies which statuses accept actions and resume acknowledgments.
#[test]
fn status_predicates_follow_lifecycle() {
    for status in DecisionStatus::ALL {
        let pending = status == DecisionStatus::PendingHumanReview;
        assert_eq!(status.is_terminal(), !pending, "{status}");
        assert_eq!(
            status.is_resumable(),
            !pending && status != DecisionStatus::Executed,
            "{status}"
        );
    }

    let engine = engine();
    let gate = engine.create_gate(human_request("exec-1", "node-1"), at(0)).unwrap().decision;
    let rejected = engine.apply_action(&gate.decision_id, human(ActionType::Reject), at(1)).unwrap();
    let token = rejected.resume_token.unwrap();
    engine.acknowledge_resume(&gate.decision_id, &token, at(2)).unwrap();
    let err = engine.apply_action(&gate.decision_id, human(ActionType::Approve), at(3)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Conflict);
}
