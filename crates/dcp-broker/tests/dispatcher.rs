// crates/dcp-broker/tests/dispatcher.rs
// ============================================================================
// Module: Outbox Dispatcher Tests
// Description: Validate outbox delivery, ordering, and retry backoff.
// Purpose: Ensure events are delivered at least once in per-decision order.
// Dependencies: dcp-broker, dcp-core
// ============================================================================

//! ## Overview
//! Drives the real decision engine over the in-memory store and dispatches
//! its outbox through callback sinks that record or refuse deliveries.

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
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use dcp_broker::BackoffPolicy;
use dcp_broker::CallbackSink;
use dcp_broker::OutboxDispatcher;
use dcp_broker::SinkError;
use dcp_core::ActionInput;
use dcp_core::ActionRequest;
use dcp_core::ActionType;
use dcp_core::CreateGateRequest;
use dcp_core::DecisionEngine;
use dcp_core::DecisionSignals;
use dcp_core::EngineConfig;
use dcp_core::EventEnvelope;
use dcp_core::EventOutbox;
use dcp_core::ExecutionId;
use dcp_core::FlowId;
use dcp_core::InMemoryDecisionStore;
use dcp_core::NodeId;
use dcp_core::PolicyCatalog;
use dcp_core::PolicyRegistry;
use dcp_core::Recommendation;
use dcp_core::SharedDecisionStore;

use crate::common::at;

fn engine() -> DecisionEngine<SharedDecisionStore> {
    let store = SharedDecisionStore::from_store(InMemoryDecisionStore::new());
    let registry = PolicyRegistry::new(PolicyCatalog::builtin().unwrap());
    DecisionEngine::new(store, Arc::new(registry), EngineConfig::default())
}

fn human_request(execution_id: &str) -> CreateGateRequest {
    CreateGateRequest {
        org_id: None,
        execution_id: ExecutionId::new(execution_id),
        flow_id: FlowId::new("flow-1"),
        node_id: NodeId::new("node-1"),
        language: "en".to_string(),
        signals: DecisionSignals {
            risk_score: Some(0.5),
            confidence_score: Some(0.6),
            ..DecisionSignals::default()
        },
        recommendation: Recommendation {
            summary: "Refund the customer".to_string(),
            ..Recommendation::default()
        },
        sla_seconds: None,
        expires_at: None,
        trace_id: None,
    }
}

fn approve() -> ActionRequest {
    ActionRequest::new(
        ActionType::Approve,
        ActionInput {
            actor_id: Some("reviewer@example.com".to_string()),
            ..ActionInput::default()
        },
    )
}

/// Collecting sink plus the envelopes it accepted.
fn recording_sink() -> (CallbackSink, Arc<Mutex<Vec<EventEnvelope>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink = CallbackSink::new(move |envelope| {
        sink_seen.lock().unwrap().push(envelope.clone());
        Ok(())
    });
    (sink, seen)
}

/// Verifies backoff doubles from the initial delay and caps at the maximum.
#[test]
fn backoff_doubles_until_capped() {
    let backoff = BackoffPolicy::default();
    assert_eq!(backoff.delay_ms(0), 500);
    assert_eq!(backoff.delay_ms(1), 1_000);
    assert_eq!(backoff.delay_ms(3), 4_000);
    assert_eq!(backoff.delay_ms(7), 60_000);
    assert_eq!(backoff.delay_ms(64), 60_000);
    assert_eq!(backoff.delay_ms(u32::MAX), 60_000);
}

/// Verifies one decision's events are delivered in commit order.
#[test]
fn dispatcher_delivers_events_in_commit_order() {
    let engine = engine();
    let decision = engine.create_gate(human_request("exec-1"), at(0)).unwrap().decision;
    engine.apply_action(&decision.decision_id, approve(), at(10)).unwrap();
    let (sink, seen) = recording_sink();
    let dispatcher = OutboxDispatcher::new(engine.store().clone(), Arc::new(sink), "dcp-test");

    let first = dispatcher.dispatch_once(at(20)).unwrap();
    assert_eq!(first.attempted, 1);
    assert_eq!(first.delivered.len(), 1);
    let second = dispatcher.dispatch_once(at(21)).unwrap();
    assert_eq!(second.delivered.len(), 1);
    let third = dispatcher.dispatch_once(at(22)).unwrap();
    assert_eq!(third.attempted, 0);

    let seen = seen.lock().unwrap();
    let types: Vec<_> = seen.iter().map(|envelope| envelope.event_type.as_str()).collect();
    assert_eq!(types, vec!["decision.paused", "decision.actioned"]);
    assert_eq!(seen[0].source, "dcp-test");
    assert_eq!(seen[0].sequence, 1);
    assert_eq!(seen[1].sequence, 2);
    assert!(seen[1].data["resume_token"].is_string());

    let events = engine.store().decision_events(&decision.decision_id).unwrap();
    assert!(events.iter().all(|entry| entry.delivered_at.is_some()));
}

/// Verifies failed deliveries are retried with backoff and never dropped.
#[test]
fn dispatcher_retries_failures_with_backoff() {
    let engine = engine();
    let decision = engine.create_gate(human_request("exec-1"), at(0)).unwrap().decision;
    let calls = Arc::new(AtomicUsize::new(0));
    let sink_calls = Arc::clone(&calls);
    let sink = CallbackSink::new(move |_| {
        if sink_calls.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(SinkError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    });
    let dispatcher = OutboxDispatcher::new(engine.store().clone(), Arc::new(sink), "dcp")
        .with_backoff(BackoffPolicy {
            initial_ms: 100,
            max_ms: 1_000,
        });

    let failed = dispatcher.dispatch_once(at(0)).unwrap();
    assert_eq!(failed.failed.len(), 1);
    let entry = &engine.store().decision_events(&decision.decision_id).unwrap()[0];
    assert_eq!(entry.attempts, 1);
    assert_eq!(entry.next_attempt_at, at(100));
    assert!(entry.last_error.as_deref().unwrap().contains("connection refused"));

    assert_eq!(dispatcher.dispatch_once(at(99)).unwrap().attempted, 0);
    let failed_again = dispatcher.dispatch_once(at(100)).unwrap();
    assert_eq!(failed_again.failed.len(), 1);
    let entry = &engine.store().decision_events(&decision.decision_id).unwrap()[0];
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.next_attempt_at, at(300));

    let delivered = dispatcher.dispatch_once(at(300)).unwrap();
    assert_eq!(delivered.delivered.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let entry = &engine.store().decision_events(&decision.decision_id).unwrap()[0];
    assert_eq!(entry.delivered_at, Some(at(300)));
}

/// Verifies a failing decision does not hold back other decisions.
#[test]
fn dispatcher_isolates_decisions() {
    let engine = engine();
    let blocked = engine.create_gate(human_request("exec-1"), at(0)).unwrap().decision;
    let healthy = engine.create_gate(human_request("exec-2"), at(1)).unwrap().decision;
    let blocked_id = blocked.decision_id.to_string();
    let sink = CallbackSink::new(move |envelope| {
        if envelope.subject == blocked_id {
            Err(SinkError::Rejected("poison".to_string()))
        } else {
            Ok(())
        }
    });
    let dispatcher =
        OutboxDispatcher::new(engine.store().clone(), Arc::new(sink), "dcp").with_batch_size(10);

    let report = dispatcher.dispatch_once(at(5)).unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.delivered.len(), 1);
    let healthy_events = engine.store().decision_events(&healthy.decision_id).unwrap();
    assert!(healthy_events[0].delivered_at.is_some());
    let blocked_events = engine.store().decision_events(&blocked.decision_id).unwrap();
    assert!(blocked_events[0].delivered_at.is_none());
}
