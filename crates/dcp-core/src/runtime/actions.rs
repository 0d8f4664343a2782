// crates/dcp-core/src/runtime/actions.rs
// ============================================================================
// Module: Action Processor
// Description: Applies human actions and resume acknowledgments to decisions.
// Purpose: Enforce the decision state machine with first-writer-wins semantics.
// Dependencies: crate::{core, interfaces}, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Actions are accepted only while a decision is `pending_human_review`. The
//! status change, the appended action row, and the `decision.actioned` event
//! commit together through the store's compare-and-swap, so concurrent
//! actions on one decision yield exactly one winner; the others receive
//! [`EngineError::Conflict`] with the winner's state.
//!
//! Resume acknowledgments move a resolved decision to `executed` once the
//! orchestrator presents the matching resume token. Repeating an
//! acknowledgment with the same token is a no-op.
//!
//! Security posture: actor identifiers and comments are caller-supplied and
//! are validated or sanitized before they are persisted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
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
use crate::core::hashing::digests_match;
use crate::core::validation;
use crate::core::validation::ValidationError;
use crate::interfaces::DecisionStore;
use crate::interfaces::StatusTransition;
use crate::interfaces::TransitionOutcome;
use crate::runtime::error::EngineError;
use crate::runtime::publisher::EventPublisher;
use crate::runtime::publisher::resume_token;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Caller-supplied action body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInput {
    /// Actor classification; defaults to `human`.
    #[serde(default)]
    pub actor_type: ActorType,
    /// Actor identifier.
    #[serde(default)]
    pub actor_id: Option<String>,
    /// Free-text comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Modifications; required for `modify`.
    #[serde(default)]
    pub modifications: Option<Value>,
}

/// Action request against one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    /// Requested action.
    pub action_type: ActionType,
    /// Action body.
    pub input: ActionInput,
}

impl ActionRequest {
    /// Builds an action request.
    #[must_use]
    pub const fn new(action_type: ActionType, input: ActionInput) -> Self {
        Self {
            action_type,
            input,
        }
    }
}

// ============================================================================
// SECTION: Action Processor
// ============================================================================

/// Applies actions and resume acknowledgments.
pub struct ActionProcessor<S> {
    /// Decision store.
    store: S,
    /// Event builder.
    publisher: EventPublisher,
}

impl<S> ActionProcessor<S>
where
    S: DecisionStore,
{
    /// Creates an action processor.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
            publisher: EventPublisher::new(),
        }
    }

    /// Applies an action to a pending decision.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for malformed requests,
    /// [`EngineError::NotFound`] for unknown decisions,
    /// [`EngineError::Conflict`] when the decision is no longer pending, and
    /// [`EngineError::Store`] when the commit fails.
    pub fn apply(
        &self,
        decision_id: &DecisionId,
        request: ActionRequest,
        now: Timestamp,
    ) -> Result<Decision, EngineError> {
        let action_type = request.action_type;
        let input = validate_action(action_type, request.input)?;
        let decision = self
            .store
            .load_decision(decision_id)?
            .ok_or_else(|| EngineError::NotFound(decision_id.clone()))?;
        if decision.status.is_terminal() {
            return Err(EngineError::Conflict(Box::new(decision)));
        }

        let payload = if action_type == ActionType::Modify { input.modifications } else { None };
        let action = DecisionAction {
            action_id: ActionId::generate(),
            decision_id: decision_id.clone(),
            action_type,
            actor_type: input.actor_type,
            actor_id: input.actor_id,
            comment: validation::sanitize_comment(input.comment.as_deref()),
            payload,
            created_at: now,
        };
        let token = resume_token(decision_id, &action.action_id)?;
        let event = self.publisher.actioned(&decision, &action, &token, None)?;
        let outcome = self.store.transition(StatusTransition {
            decision_id: decision_id.clone(),
            expected: vec![DecisionStatus::PendingHumanReview],
            next: action_type.resulting_status(),
            resume_token: Some(token),
            action: Some(action),
            events: vec![event],
            at: now,
        })?;
        match outcome {
            TransitionOutcome::Applied(updated) => {
                info!(
                    decision_id = %decision_id,
                    action = %action_type,
                    status = %updated.status,
                    "decision action applied"
                );
                Ok(updated)
            }
            TransitionOutcome::Conflict(current) => {
                debug!(
                    decision_id = %decision_id,
                    action = %action_type,
                    status = %current.status,
                    "decision action lost compare-and-swap"
                );
                Err(EngineError::Conflict(Box::new(current)))
            }
            TransitionOutcome::NotFound => Err(EngineError::NotFound(decision_id.clone())),
        }
    }

    /// Acknowledges that the orchestrator resumed a resolved decision.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when the token does not match,
    /// [`EngineError::NotFound`] for unknown decisions,
    /// [`EngineError::Conflict`] while the decision is still pending, and
    /// [`EngineError::Store`] when the commit fails.
    pub fn acknowledge_resume(
        &self,
        decision_id: &DecisionId,
        token: &str,
        now: Timestamp,
    ) -> Result<Decision, EngineError> {
        let decision = self
            .store
            .load_decision(decision_id)?
            .ok_or_else(|| EngineError::NotFound(decision_id.clone()))?;
        if !decision.status.is_terminal() {
            return Err(EngineError::Conflict(Box::new(decision)));
        }
        check_token(&decision, token)?;
        if !decision.status.is_resumable() {
            debug!(decision_id = %decision_id, "resume already acknowledged");
            return Ok(decision);
        }

        let event = self.publisher.resumed(&decision, now)?;
        let outcome = self.store.transition(StatusTransition {
            decision_id: decision_id.clone(),
            expected: vec![decision.status],
            next: DecisionStatus::Executed,
            resume_token: None,
            action: None,
            events: vec![event],
            at: now,
        })?;
        match outcome {
            TransitionOutcome::Applied(updated) => {
                info!(decision_id = %decision_id, "decision resumed");
                Ok(updated)
            }
            TransitionOutcome::Conflict(current)
                if current.status == DecisionStatus::Executed =>
            {
                check_token(&current, token)?;
                Ok(current)
            }
            TransitionOutcome::Conflict(current) => Err(EngineError::Conflict(Box::new(current))),
            TransitionOutcome::NotFound => Err(EngineError::NotFound(decision_id.clone())),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates an action request.
fn validate_action(
    action_type: ActionType,
    input: ActionInput,
) -> Result<ActionInput, ValidationError> {
    if action_type == ActionType::Expire {
        return Err(ValidationError::new("action_type", "expire is reserved for the system"));
    }
    if input.actor_type == ActorType::Policy {
        return Err(ValidationError::new("actor_type", "policy actions are reserved"));
    }
    validation::validate_actor_id(input.actor_id.as_deref())?;
    if action_type == ActionType::Modify {
        validation::validate_modifications(input.modifications.as_ref())?;
    }
    Ok(input)
}

/// Compares a presented resume token against the decision's token.
fn check_token(decision: &Decision, token: &str) -> Result<(), ValidationError> {
    let matches = decision
        .resume_token
        .as_deref()
        .is_some_and(|expected| digests_match(expected, token));
    if matches {
        Ok(())
    } else {
        warn!(decision_id = %decision.decision_id, "resume token mismatch");
        Err(ValidationError::new("resume_token", "does not match the decision"))
    }
}
