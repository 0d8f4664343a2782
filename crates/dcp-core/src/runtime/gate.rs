// crates/dcp-core/src/runtime/gate.rs
// ============================================================================
// Module: Gate Manager
// Description: Idempotent gate creation and explicit policy re-evaluation.
// Purpose: Record a paused checkpoint and decide whether it needs a human.
// Dependencies: crate::{core, interfaces, policy}, serde, tracing
// ============================================================================

//! ## Overview
//! Gate creation is idempotent on `(org_id, execution_id, node_id)`: while an
//! open decision holds the key, creation returns it untouched, with no policy
//! evaluation and no event. A new key is evaluated against the ruleset
//! resolved for its tenant and language, and the decision, recommendation,
//! snapshot, optional synthesized action, and exactly one event are
//! committed together:
//! - `require_human` → `pending_human_review` + `decision.paused`
//! - `auto_approve` → `approved` (policy action) + `decision.actioned`
//! - `force_escalation` → `escalated` (system action) + `decision.actioned`

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::core::ActionId;
use crate::core::ActionType;
use crate::core::ActorType;
use crate::core::CorrelationKey;
use crate::core::Decision;
use crate::core::DecisionAction;
use crate::core::DecisionId;
use crate::core::DecisionSignals;
use crate::core::DecisionStatus;
use crate::core::ExecutionId;
use crate::core::FlowId;
use crate::core::NodeId;
use crate::core::OrgId;
use crate::core::PolicySnapshot;
use crate::core::Recommendation;
use crate::core::SnapshotId;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::core::validation;
use crate::core::validation::ValidationError;
use crate::interfaces::DecisionStore;
use crate::interfaces::GateInsert;
use crate::interfaces::NewGate;
use crate::policy::PolicyEvaluation;
use crate::policy::PolicyInputs;
use crate::policy::PolicyOutcome;
use crate::policy::PolicyRegistry;
use crate::runtime::error::EngineError;
use crate::runtime::publisher::EventPublisher;
use crate::runtime::publisher::resume_token;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Language used when a request omits one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Returns the default language tag.
fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Inbound gate-creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGateRequest {
    /// Tenant; defaults to the configured default tenant.
    #[serde(default)]
    pub org_id: Option<OrgId>,
    /// Workflow execution identifier.
    pub execution_id: ExecutionId,
    /// Workflow definition identifier.
    pub flow_id: FlowId,
    /// Workflow node identifier.
    pub node_id: NodeId,
    /// Language tag.
    #[serde(default = "default_language")]
    pub language: String,
    /// Policy signals.
    #[serde(flatten)]
    pub signals: DecisionSignals,
    /// Recommendation payload.
    #[serde(default)]
    pub recommendation: Recommendation,
    /// SLA duration in seconds for human review.
    #[serde(default)]
    pub sla_seconds: Option<u64>,
    /// Absolute SLA deadline (RFC 3339); wins over `sla_seconds`.
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Caller-supplied correlation identifier.
    #[serde(default)]
    pub trace_id: Option<TraceId>,
}

/// Result of gate creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateCreation {
    /// The new or existing decision.
    pub decision: Decision,
    /// False when the correlation key already held an open decision.
    pub created: bool,
}

// ============================================================================
// SECTION: Gate Manager
// ============================================================================

/// Gate manager configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateConfig {
    /// Tenant applied when a request omits `org_id`.
    pub default_org_id: OrgId,
    /// SLA applied to human-routed gates without an explicit deadline.
    pub default_sla_seconds: Option<u64>,
}

/// Creates gates and re-evaluates policy for existing decisions.
pub struct GateManager<S> {
    /// Decision store.
    store: S,
    /// Active policy catalog.
    policies: Arc<PolicyRegistry>,
    /// Event builder.
    publisher: EventPublisher,
    /// Creation defaults.
    config: GateConfig,
}

impl<S> GateManager<S>
where
    S: DecisionStore,
{
    /// Creates a gate manager.
    #[must_use]
    pub const fn new(store: S, policies: Arc<PolicyRegistry>, config: GateConfig) -> Self {
        Self {
            store,
            policies,
            publisher: EventPublisher::new(),
            config,
        }
    }

    /// Creates a gate, or returns the open decision already holding its key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for malformed requests,
    /// [`EngineError::Policy`] when no ruleset is active, and
    /// [`EngineError::Store`] when the commit fails.
    pub fn create_gate(
        &self,
        request: CreateGateRequest,
        now: Timestamp,
    ) -> Result<GateCreation, EngineError> {
        let request = validate_request(request)?;
        let org_id = request.org_id.clone().unwrap_or_else(|| self.config.default_org_id.clone());
        let key = CorrelationKey {
            org_id: org_id.clone(),
            execution_id: request.execution_id.clone(),
            node_id: request.node_id.clone(),
        };
        if let Some(existing) = self.store.find_open(&key)? {
            debug!(decision_id = %existing.decision_id, "gate already open for correlation key");
            return Ok(GateCreation {
                decision: existing,
                created: false,
            });
        }

        let catalog = self.policies.current()?;
        let ruleset = catalog.resolve(&org_id, &request.language);
        let inputs = request.signals.policy_inputs();
        let evaluation = ruleset.evaluate(&inputs);

        let decision_id = DecisionId::generate();
        let status = match evaluation.result {
            PolicyOutcome::RequireHuman => DecisionStatus::PendingHumanReview,
            PolicyOutcome::AutoApprove => DecisionStatus::Approved,
            PolicyOutcome::ForceEscalation => DecisionStatus::Escalated,
        };
        let expires_at = if status == DecisionStatus::PendingHumanReview {
            self.deadline(&request, now)?
        } else {
            None
        };
        let mut decision = Decision {
            decision_id: decision_id.clone(),
            org_id,
            execution_id: request.execution_id,
            flow_id: request.flow_id,
            node_id: request.node_id,
            status,
            language: request.language,
            signals: request.signals,
            trace_id: request.trace_id.unwrap_or_else(TraceId::generate),
            resume_token: None,
            created_at: now,
            updated_at: now,
            expires_at,
            version: 1,
        };
        let snapshot = build_snapshot(&decision_id, evaluation, inputs, now);

        let (action, events) = match snapshot.result {
            PolicyOutcome::RequireHuman => {
                (None, vec![self.publisher.paused(&decision, &snapshot)?])
            }
            outcome => {
                let (action_type, actor_type) = if outcome == PolicyOutcome::AutoApprove {
                    (ActionType::Approve, ActorType::Policy)
                } else {
                    (ActionType::Escalate, ActorType::System)
                };
                let action = DecisionAction {
                    action_id: ActionId::generate(),
                    decision_id: decision_id.clone(),
                    action_type,
                    actor_type,
                    actor_id: None,
                    comment: Some(snapshot.reason.clone()),
                    payload: None,
                    created_at: now,
                };
                let token = resume_token(&decision_id, &action.action_id)?;
                let event = self.publisher.actioned(&decision, &action, &token, Some(&snapshot))?;
                decision.resume_token = Some(token);
                (Some(action), vec![event])
            }
        };

        let insert = self.store.insert_gate(NewGate {
            decision,
            recommendation: request.recommendation,
            snapshot,
            action,
            events,
        })?;
        match insert {
            GateInsert::Created(decision) => {
                info!(
                    decision_id = %decision.decision_id,
                    execution_id = %decision.execution_id,
                    node_id = %decision.node_id,
                    status = %decision.status,
                    "gate created"
                );
                Ok(GateCreation {
                    decision,
                    created: true,
                })
            }
            GateInsert::Existing(decision) => {
                debug!(decision_id = %decision.decision_id, "gate creation lost key race");
                Ok(GateCreation {
                    decision,
                    created: false,
                })
            }
        }
    }

    /// Re-evaluates the active ruleset over a decision's stored signals and
    /// appends a new snapshot. Status is unchanged and no event is emitted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown decisions,
    /// [`EngineError::Policy`] when no ruleset is active, and
    /// [`EngineError::Store`] when the append fails.
    pub fn reevaluate(
        &self,
        decision_id: &DecisionId,
        now: Timestamp,
    ) -> Result<PolicySnapshot, EngineError> {
        let decision = self
            .store
            .load_decision(decision_id)?
            .ok_or_else(|| EngineError::NotFound(decision_id.clone()))?;
        let catalog = self.policies.current()?;
        let ruleset = catalog.resolve(&decision.org_id, &decision.language);
        let inputs = decision.signals.policy_inputs();
        let evaluation = ruleset.evaluate(&inputs);
        let snapshot = build_snapshot(decision_id, evaluation, inputs, now);
        self.store.append_policy_snapshot(&snapshot)?;
        info!(
            decision_id = %decision_id,
            result = %snapshot.result,
            policy_version = %snapshot.policy_version,
            "policy re-evaluated"
        );
        Ok(snapshot)
    }

    /// Computes the SLA deadline for a human-routed gate.
    fn deadline(
        &self,
        request: &CreateGateRequest,
        now: Timestamp,
    ) -> Result<Option<Timestamp>, EngineError> {
        if let Some(raw) = &request.expires_at {
            return parse_deadline(raw).map(Some);
        }
        Ok(request
            .sla_seconds
            .or(self.config.default_sla_seconds)
            .map(|seconds| now.plus_seconds(seconds)))
    }
}

/// Validates and sanitizes a creation request.
fn validate_request(mut request: CreateGateRequest) -> Result<CreateGateRequest, EngineError> {
    if let Some(org_id) = &request.org_id {
        validation::validate_identifier("org_id", org_id.as_str())?;
    }
    validation::validate_identifier("execution_id", request.execution_id.as_str())?;
    validation::validate_identifier("flow_id", request.flow_id.as_str())?;
    validation::validate_identifier("node_id", request.node_id.as_str())?;
    validation::validate_language(&request.language)?;
    validation::validate_score("risk_score", request.signals.risk_score)?;
    validation::validate_score("confidence_score", request.signals.confidence_score)?;
    validation::validate_cost("estimated_cost", request.signals.estimated_cost)?;
    validation::validate_summary(&request.recommendation.summary)?;
    request.signals.compliance_flags =
        validation::sanitize_compliance_flags(&request.signals.compliance_flags)?;
    request.signals.impact_level = validation::sanitize_text(
        request.signals.impact_level.as_deref(),
        validation::MAX_IDENTIFIER_LENGTH,
    );
    if request.sla_seconds == Some(0) {
        return Err(ValidationError::new("sla_seconds", "must be positive").into());
    }
    if let Some(raw) = &request.expires_at {
        parse_deadline(raw)?;
    }
    Ok(request)
}

/// Parses an absolute RFC 3339 deadline.
fn parse_deadline(raw: &str) -> Result<Timestamp, EngineError> {
    Timestamp::parse_rfc3339(raw)
        .map_err(|err| ValidationError::new("expires_at", err.to_string()).into())
}

/// Builds a snapshot record from an evaluation.
fn build_snapshot(
    decision_id: &DecisionId,
    evaluation: PolicyEvaluation,
    inputs: PolicyInputs,
    now: Timestamp,
) -> PolicySnapshot {
    PolicySnapshot {
        snapshot_id: SnapshotId::generate(),
        decision_id: decision_id.clone(),
        policy_version: evaluation.policy_version,
        policy_hash: evaluation.policy_hash,
        evaluated_rules: evaluation.evaluated_rules,
        result: evaluation.result,
        reason: evaluation.reason,
        matched_rule_id: evaluation.matched_rule_id,
        inputs,
        created_at: now,
    }
}
