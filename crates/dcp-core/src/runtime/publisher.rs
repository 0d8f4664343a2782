// crates/dcp-core/src/runtime/publisher.rs
// ============================================================================
// Module: Event Publisher
// Description: Builds outbox events and derived keys for committed transitions.
// Purpose: Give every transition exactly one event with a replay-stable key.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! The publisher turns a proposed transition into the [`DecisionEvent`] that
//! is committed alongside it. It never writes anything itself: the caller
//! hands the event to the store inside the same compare-and-swap, and the
//! outbox dispatcher delivers it later.
//! Invariants:
//! - Idempotency keys depend only on the triggering fact, never on event ids
//!   or timestamps, so re-publishing the same fact yields the same key.
//! - Resume tokens depend only on the decision and the resolving action.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use crate::core::ActionId;
use crate::core::ActionType;
use crate::core::Decision;
use crate::core::DecisionAction;
use crate::core::DecisionEvent;
use crate::core::DecisionId;
use crate::core::DecisionStatus;
use crate::core::EventId;
use crate::core::EventType;
use crate::core::PolicySnapshot;
use crate::core::Timestamp;
use crate::core::hashing::HashError;
use crate::core::hashing::fingerprint;

// ============================================================================
// SECTION: Derived Keys
// ============================================================================

/// Derives the idempotency key for an event from its triggering fact.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn idempotency_key(
    decision_id: &DecisionId,
    event_type: EventType,
    action_type: Option<ActionType>,
) -> Result<String, HashError> {
    fingerprint(&json!({
        "decision_id": decision_id,
        "event_type": event_type.as_str(),
        "action_type": action_type.map(ActionType::as_str),
    }))
}

/// Derives the resume token for a decision resolved by `action_id`.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn resume_token(decision_id: &DecisionId, action_id: &ActionId) -> Result<String, HashError> {
    fingerprint(&json!({
        "decision_id": decision_id,
        "resolved_by": action_id,
        "purpose": "resume",
    }))
}

// ============================================================================
// SECTION: Publisher
// ============================================================================

/// Builds outbound events for committed transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventPublisher;

impl EventPublisher {
    /// Creates a new publisher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds the `decision.paused` event for a gate routed to human review.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when key derivation fails.
    pub fn paused(
        &self,
        decision: &Decision,
        snapshot: &PolicySnapshot,
    ) -> Result<DecisionEvent, HashError> {
        let mut data = identity(decision, decision.status);
        insert(&mut data, "signals", json!(decision.signals));
        insert(&mut data, "policy", policy_summary(snapshot));
        insert(&mut data, "expires_at", json!(decision.expires_at.map(Timestamp::to_rfc3339)));
        insert(&mut data, "created_at", json!(decision.created_at.to_rfc3339()));
        build(decision, EventType::Paused, None, decision.created_at, data)
    }

    /// Builds the `decision.actioned` event for an accepted action.
    ///
    /// `snapshot` is attached for policy auto-resolution.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when key derivation fails.
    pub fn actioned(
        &self,
        decision: &Decision,
        action: &DecisionAction,
        resume_token: &str,
        snapshot: Option<&PolicySnapshot>,
    ) -> Result<DecisionEvent, HashError> {
        let status = action.action_type.resulting_status();
        let mut data = identity(decision, status);
        insert(
            &mut data,
            "action",
            json!({
                "action_id": action.action_id,
                "action_type": action.action_type,
                "actor_type": action.actor_type,
                "actor_id": action.actor_id,
                "comment": action.comment,
                "payload": action.payload,
                "created_at": action.created_at.to_rfc3339(),
            }),
        );
        insert(&mut data, "resume_token", json!(resume_token));
        if let Some(snapshot) = snapshot {
            insert(&mut data, "signals", json!(decision.signals));
            insert(&mut data, "policy", policy_summary(snapshot));
        }
        build(decision, EventType::Actioned, Some(action.action_type), action.created_at, data)
    }

    /// Builds the `decision.expired` event for an SLA expiry.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when key derivation fails.
    pub fn expired(
        &self,
        decision: &Decision,
        action: &DecisionAction,
        resume_token: &str,
    ) -> Result<DecisionEvent, HashError> {
        let mut data = identity(decision, DecisionStatus::Expired);
        insert(&mut data, "action_id", json!(action.action_id));
        insert(&mut data, "expires_at", json!(decision.expires_at.map(Timestamp::to_rfc3339)));
        insert(&mut data, "expired_at", json!(action.created_at.to_rfc3339()));
        insert(&mut data, "resume_token", json!(resume_token));
        build(decision, EventType::Expired, None, action.created_at, data)
    }

    /// Builds the `decision.resumed` event for a resume acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when key derivation fails.
    pub fn resumed(
        &self,
        decision: &Decision,
        resumed_at: Timestamp,
    ) -> Result<DecisionEvent, HashError> {
        let mut data = identity(decision, DecisionStatus::Executed);
        insert(&mut data, "previous_status", json!(decision.status));
        insert(&mut data, "resumed_at", json!(resumed_at.to_rfc3339()));
        build(decision, EventType::Resumed, None, resumed_at, data)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Assembles an event with a fresh id and a fact-derived key.
fn build(
    decision: &Decision,
    event_type: EventType,
    action_type: Option<ActionType>,
    occurred_at: Timestamp,
    data: Value,
) -> Result<DecisionEvent, HashError> {
    Ok(DecisionEvent {
        event_id: EventId::generate(),
        event_type,
        decision_id: decision.decision_id.clone(),
        idempotency_key: idempotency_key(&decision.decision_id, event_type, action_type)?,
        trace_id: decision.trace_id.clone(),
        occurred_at,
        data,
    })
}

/// Identity fields shared by every event payload.
fn identity(decision: &Decision, status: DecisionStatus) -> Value {
    json!({
        "decision_id": decision.decision_id,
        "org_id": decision.org_id,
        "execution_id": decision.execution_id,
        "flow_id": decision.flow_id,
        "node_id": decision.node_id,
        "language": decision.language,
        "status": status,
    })
}

/// Policy snapshot fields embedded in events.
fn policy_summary(snapshot: &PolicySnapshot) -> Value {
    json!({
        "snapshot_id": snapshot.snapshot_id,
        "policy_version": snapshot.policy_version,
        "policy_hash": snapshot.policy_hash,
        "result": snapshot.result,
        "reason": snapshot.reason,
        "matched_rule_id": snapshot.matched_rule_id,
        "evaluated_rules": snapshot.evaluated_rules,
    })
}

/// Inserts a field into an object payload.
fn insert(data: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = data {
        map.insert(key.to_string(), value);
    }
}
