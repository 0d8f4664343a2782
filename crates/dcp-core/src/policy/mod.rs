// crates/dcp-core/src/policy/mod.rs
// ============================================================================
// Module: Policy Evaluation
// Description: Rule-based policy evaluation for decision gates.
// Purpose: Decide whether a gate needs a human, with a replayable trace.
// Dependencies: regex, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`Ruleset`] is an ordered list of rules, each a tagged predicate tree
//! ([`Condition`]) plus an outcome. Evaluation walks the rules in order and
//! stops at the first match; when nothing matches, the ruleset's mandatory
//! default applies. Evaluation is a pure function of `(inputs, ruleset)`:
//! every structural problem is rejected when the ruleset is loaded, so an
//! activated ruleset can never fail an individual evaluation.
//! Invariants:
//! - The trace lists only rules up to and including the first match.
//! - A comparator that references a missing input is false.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod catalog;
pub mod condition;
pub mod ruleset;

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

use crate::core::decision::UnknownLabel;
use crate::core::identifiers::RuleId;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::PolicyCatalog;
pub use catalog::PolicyRegistry;
pub use condition::Condition;
pub use condition::Operand;
pub use ruleset::DEFAULT_POLICY_JSON;
pub use ruleset::MAX_POLICY_FILE_SIZE;
pub use ruleset::Rule;
pub use ruleset::RuleOutcome;
pub use ruleset::Ruleset;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    /// Resolve the gate as approved without a human.
    AutoApprove,
    /// Route the gate to human review.
    RequireHuman,
    /// Escalate the gate immediately.
    ForceEscalation,
}

impl PolicyOutcome {
    /// All outcomes.
    pub const ALL: [Self; 3] = [Self::AutoApprove, Self::RequireHuman, Self::ForceEscalation];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoApprove => "auto_approve",
            Self::RequireHuman => "require_human",
            Self::ForceEscalation => "force_escalation",
        }
    }
}

impl fmt::Display for PolicyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyOutcome {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|outcome| outcome.as_str() == value)
            .ok_or_else(|| UnknownLabel::new("policy result", value))
    }
}

/// One evaluated rule in a policy trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTrace {
    /// Rule identifier.
    pub rule_id: RuleId,
    /// Whether the rule's predicate held.
    pub matched: bool,
    /// Outcome produced, present only for the matching rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PolicyOutcome>,
}

/// Full result of evaluating a ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    /// Final outcome.
    pub result: PolicyOutcome,
    /// Reason attached to the outcome.
    pub reason: String,
    /// Rule that matched, or none when the default applied.
    pub matched_rule_id: Option<RuleId>,
    /// Evaluated rules in order.
    pub evaluated_rules: Vec<RuleTrace>,
    /// Version label of the ruleset.
    pub policy_version: String,
    /// Canonical hash of the ruleset document.
    pub policy_hash: String,
}

// ============================================================================
// SECTION: Inputs
// ============================================================================

/// Flat mapping of named signals visible to policy templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyInputs(BTreeMap<String, Value>);

impl PolicyInputs {
    /// Creates an empty input map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts or replaces an input.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Inserts a numeric input, or removes the name when the value is absent or non-finite.
    pub fn insert_optional_number(&mut self, name: &str, value: Option<f64>) {
        match value.and_then(serde_json::Number::from_f64) {
            Some(number) => {
                self.0.insert(name.to_string(), Value::Number(number));
            }
            None => {
                self.0.remove(name);
            }
        }
    }

    /// Removes an input.
    pub fn remove(&mut self, name: &str) {
        self.0.remove(name);
    }

    /// Returns an input value; `null` counts as absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    /// Returns the number of inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no inputs are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for PolicyInputs {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self(value)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for PolicyInputs {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading or validating a ruleset.
///
/// # Invariants
/// - Every variant is a configuration error surfaced at load time.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy file could not be read.
    #[error("policy io error: {0}")]
    Io(String),
    /// Policy file uses an unsupported format.
    #[error("unsupported policy format: {0}")]
    UnsupportedFormat(String),
    /// Policy document is not valid JSON or has an unexpected shape.
    #[error("policy parse error: {0}")]
    Parse(String),
    /// Policy failed static validation.
    #[error("invalid policy at {path}: {message}")]
    Invalid {
        /// JSON path of the offending node.
        path: String,
        /// Human-readable reason.
        message: String,
    },
    /// Catalog configuration is inconsistent.
    #[error("invalid policy catalog: {0}")]
    Catalog(String),
    /// No ruleset catalog is active.
    #[error("policy unavailable: {0}")]
    Unavailable(String),
}

impl PolicyError {
    /// Builds an [`PolicyError::Invalid`] error.
    pub(crate) fn invalid(path: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.to_string(),
            message: message.into(),
        }
    }
}
