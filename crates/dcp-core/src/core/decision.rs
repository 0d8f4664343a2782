// crates/dcp-core/src/core/decision.rs
// ============================================================================
// Module: Decision Model
// Description: Decision aggregate, recommendation, policy snapshot, and actions.
// Purpose: Canonical, serializable records persisted by every decision store.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Decision`] is the root aggregate for one paused workflow checkpoint.
//! Its [`Recommendation`] and first [`PolicySnapshot`] are written with it in
//! one commit; [`DecisionAction`] rows are appended afterwards and never
//! rewritten. `status` is a projection of the latest accepted action (or of
//! expiry) and only a store's compare-and-swap may change it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::ActionId;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::ExecutionId;
use crate::core::identifiers::FlowId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::SnapshotId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;
use crate::policy::PolicyInputs;
use crate::policy::PolicyOutcome;
use crate::policy::RuleTrace;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of a decision.
///
/// # Invariants
/// - `PendingHumanReview` is the only status that accepts actions.
/// - `Executed` is entered only from another terminal status via a resume
///   acknowledgment and is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Awaiting a human (or downstream actor) action.
    PendingHumanReview,
    /// Approved by a human or by policy.
    Approved,
    /// Rejected.
    Rejected,
    /// Approved with modifications.
    Modified,
    /// Escalated by a human or forced by policy.
    Escalated,
    /// Expired by the SLA supervisor.
    Expired,
    /// The orchestrator acknowledged it resumed execution.
    Executed,
}

impl DecisionStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::PendingHumanReview,
        Self::Approved,
        Self::Rejected,
        Self::Modified,
        Self::Escalated,
        Self::Expired,
        Self::Executed,
    ];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingHumanReview => "pending_human_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Modified => "modified",
            Self::Escalated => "escalated",
            Self::Expired => "expired",
            Self::Executed => "executed",
        }
    }

    /// Returns true when no further actions are accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::PendingHumanReview)
    }

    /// Returns true when a resume acknowledgment may be applied.
    #[must_use]
    pub const fn is_resumable(self) -> bool {
        !matches!(self, Self::PendingHumanReview | Self::Executed)
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionStatus {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownLabel::new("decision status", value))
    }
}

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Kind of action appended to a decision.
///
/// `Expire` is synthesized by the expiry supervisor; callers submit the
/// other four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Approve the decision.
    Approve,
    /// Reject the decision.
    Reject,
    /// Approve with a modifications payload.
    Modify,
    /// Escalate to a higher authority.
    Escalate,
    /// SLA deadline passed with no action.
    Expire,
}

impl ActionType {
    /// All action types.
    pub const ALL: [Self; 5] =
        [Self::Approve, Self::Reject, Self::Modify, Self::Escalate, Self::Expire];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Modify => "modify",
            Self::Escalate => "escalate",
            Self::Expire => "expire",
        }
    }

    /// Returns the status an accepted action of this type produces.
    #[must_use]
    pub const fn resulting_status(self) -> DecisionStatus {
        match self {
            Self::Approve => DecisionStatus::Approved,
            Self::Reject => DecisionStatus::Rejected,
            Self::Modify => DecisionStatus::Modified,
            Self::Escalate => DecisionStatus::Escalated,
            Self::Expire => DecisionStatus::Expired,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| UnknownLabel::new("action type", value))
    }
}

/// Origin of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// A person acting through the request surface.
    #[default]
    Human,
    /// The engine itself (forced escalation, expiry).
    System,
    /// A policy auto-resolution.
    Policy,
}

impl ActorType {
    /// All actor types.
    pub const ALL: [Self; 3] = [Self::Human, Self::System, Self::Policy];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::System => "system",
            Self::Policy => "policy",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|actor| actor.as_str() == value)
            .ok_or_else(|| UnknownLabel::new("actor type", value))
    }
}

/// Error returned when parsing an unknown enumeration label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownLabel {
    /// Enumeration name.
    kind: &'static str,
    /// Rejected label.
    value: String,
}

impl UnknownLabel {
    /// Creates a new unknown-label error.
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Signals
// ============================================================================

/// Numeric and categorical signals supplied with a gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionSignals {
    /// Risk score in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    /// Model confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// Estimated cost, non-negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    /// Free-form impact classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_level: Option<String>,
    /// Compliance flags raised by upstream checks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compliance_flags: Vec<String>,
    /// Execution metadata passed through to the policy unvalidated.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl DecisionSignals {
    /// Flattens the signals into policy inputs.
    ///
    /// Metadata keys never shadow the named signals.
    #[must_use]
    pub fn policy_inputs(&self) -> PolicyInputs {
        let mut inputs = PolicyInputs::new();
        for (key, value) in &self.metadata {
            inputs.insert(key.clone(), value.clone());
        }
        inputs.insert_optional_number("risk_score", self.risk_score);
        inputs.insert_optional_number("confidence_score", self.confidence_score);
        inputs.insert_optional_number("estimated_cost", self.estimated_cost);
        inputs.remove("impact_level");
        if let Some(level) = &self.impact_level {
            inputs.insert("impact_level", Value::String(level.clone()));
        }
        inputs.insert(
            "compliance_flags",
            Value::Array(self.compliance_flags.iter().cloned().map(Value::String).collect()),
        );
        inputs
    }
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Correlation key used for idempotent gate creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationKey {
    /// Tenant scope.
    pub org_id: OrgId,
    /// Workflow execution.
    pub execution_id: ExecutionId,
    /// Workflow node.
    pub node_id: NodeId,
}

/// Root decision aggregate.
///
/// # Invariants
/// - At most one decision per [`CorrelationKey`] is not yet `executed`.
/// - `version` increments on every status change.
/// - `resume_token` is set exactly when the status becomes resumable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Decision identifier.
    pub decision_id: DecisionId,
    /// Tenant identifier.
    pub org_id: OrgId,
    /// Workflow execution identifier.
    pub execution_id: ExecutionId,
    /// Workflow definition identifier.
    pub flow_id: FlowId,
    /// Workflow node identifier.
    pub node_id: NodeId,
    /// Current lifecycle status.
    pub status: DecisionStatus,
    /// Language tag used for ruleset selection and presentation.
    pub language: String,
    /// Signals evaluated by the policy.
    pub signals: DecisionSignals,
    /// Correlation identifier for emitted events.
    pub trace_id: TraceId,
    /// Token the orchestrator presents when acknowledging resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time of the last status change.
    pub updated_at: Timestamp,
    /// SLA deadline, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    /// Optimistic concurrency version.
    pub version: u64,
}

impl Decision {
    /// Returns the correlation key for this decision.
    #[must_use]
    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey {
            org_id: self.org_id.clone(),
            execution_id: self.execution_id.clone(),
            node_id: self.node_id.clone(),
        }
    }
}

/// Recommendation attached to a decision at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Short human-readable summary.
    pub summary: String,
    /// Structured explanation, opaque to the engine.
    #[serde(default)]
    pub detailed_explanation: Value,
    /// Model that produced the recommendation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    /// Prompt version used by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_version: Option<String>,
}

/// Immutable record of one policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Snapshot identifier.
    pub snapshot_id: SnapshotId,
    /// Decision the snapshot belongs to.
    pub decision_id: DecisionId,
    /// Version label of the evaluated ruleset.
    pub policy_version: String,
    /// Canonical hash of the evaluated ruleset.
    pub policy_hash: String,
    /// Rules evaluated, in order, up to and including the first match.
    pub evaluated_rules: Vec<RuleTrace>,
    /// Final outcome.
    pub result: PolicyOutcome,
    /// Reason attached to the outcome.
    pub reason: String,
    /// Rule that matched, or none when the default applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<RuleId>,
    /// Inputs the evaluation saw, for replay.
    pub inputs: PolicyInputs,
    /// Evaluation time.
    pub created_at: Timestamp,
}

/// Append-only action record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAction {
    /// Action identifier.
    pub action_id: ActionId,
    /// Decision the action applies to.
    pub decision_id: DecisionId,
    /// Action kind.
    pub action_type: ActionType,
    /// Action origin.
    pub actor_type: ActorType,
    /// Acting principal; absent for system and policy actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Sanitized comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Structured payload (`modifications` for modify actions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Commit time.
    pub created_at: Timestamp,
}

/// Decision with its full audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDetails {
    /// Decision aggregate.
    pub decision: Decision,
    /// Recommendation written at creation.
    pub recommendation: Recommendation,
    /// Policy snapshots in creation order.
    pub policy_snapshots: Vec<PolicySnapshot>,
    /// Actions in commit order.
    pub actions: Vec<DecisionAction>,
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Maximum page size for decision listings.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Default page size for decision listings.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Filter and pagination for decision listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionQuery {
    /// Restrict to one tenant.
    pub org_id: Option<OrgId>,
    /// Restrict to one status.
    pub status: Option<DecisionStatus>,
    /// Page size.
    pub limit: usize,
    /// Page offset.
    pub offset: usize,
}

impl Default for DecisionQuery {
    fn default() -> Self {
        Self {
            org_id: None,
            status: Some(DecisionStatus::PendingHumanReview),
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// One page of decisions, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPage {
    /// Decisions on this page.
    pub items: Vec<Decision>,
    /// Total decisions matching the filter.
    pub total: u64,
    /// Applied page size.
    pub limit: usize,
    /// Applied offset.
    pub offset: usize,
}
