// crates/dcp-core/src/policy/ruleset.rs
// ============================================================================
// Module: Policy Rulesets
// Description: Ruleset document parsing, static validation, and evaluation.
// Purpose: Turn a versioned JSON policy into an immutable, evaluable ruleset.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A ruleset document looks like:
//!
//! ```json
//! {
//!   "version": "2.0.0",
//!   "rules": [
//!     { "id": "high-risk",
//!       "when": { "gte": ["{{risk_score}}", 0.8] },
//!       "then": { "result": "force_escalation", "reason": "High risk score" } }
//!   ],
//!   "default": { "result": "require_human" }
//! }
//! ```
//!
//! Parsing performs all static validation. A [`Ruleset`] that exists is
//! always safe to evaluate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::core::hashing::fingerprint;
use crate::core::identifiers::RuleId;
use crate::policy::PolicyError;
use crate::policy::PolicyEvaluation;
use crate::policy::PolicyInputs;
use crate::policy::PolicyOutcome;
use crate::policy::RuleTrace;
use crate::policy::condition::Condition;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum policy file size in bytes.
pub const MAX_POLICY_FILE_SIZE: u64 = 1024 * 1024;

/// Reason recorded when the default outcome applies without its own reason.
const DEFAULT_FALLBACK_REASON: &str = "No rule matched";

/// Built-in ruleset used when no policy file is configured.
pub const DEFAULT_POLICY_JSON: &str = r#"{
  "version": "2.0.0",
  "description": "Default heuristic ruleset",
  "rules": [
    {
      "id": "compliance-flag",
      "description": "Force escalation when compliance flags are present",
      "when": { "exists": ["{{compliance_flags}}"] },
      "then": { "result": "force_escalation", "reason": "Compliance flag present" }
    },
    {
      "id": "high-risk",
      "description": "Force escalation for high risk scores",
      "when": { "gte": ["{{risk_score}}", 0.8] },
      "then": { "result": "force_escalation", "reason": "High risk score" }
    },
    {
      "id": "auto-approve-low-risk",
      "description": "Auto approve low risk, high confidence, low cost",
      "when": {
        "all": [
          { "lte": ["{{risk_score}}", 0.2] },
          { "gte": ["{{confidence_score}}", 0.8] },
          { "any": [
              { "missing": ["{{estimated_cost}}"] },
              { "lte": ["{{estimated_cost}}", 500] }
          ] }
        ]
      },
      "then": { "result": "auto_approve", "reason": "Low risk with high confidence" }
    }
  ],
  "default": { "result": "require_human", "reason": "Default: requires human review" }
}"#;

// ============================================================================
// SECTION: Raw Documents
// ============================================================================

/// Raw ruleset document prior to validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRuleset {
    /// Version label.
    version: String,
    /// Optional description.
    #[serde(default)]
    description: Option<String>,
    /// Ordered rules.
    #[serde(default)]
    rules: Vec<RawRule>,
    /// Mandatory default outcome.
    default: Option<RawOutcome>,
}

/// Raw rule prior to validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    /// Rule identifier.
    id: String,
    /// Optional description.
    #[serde(default)]
    description: Option<String>,
    /// Predicate; empty means always.
    #[serde(default = "empty_condition")]
    when: Value,
    /// Outcome when the predicate holds.
    then: RawOutcome,
}

/// Raw outcome clause.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOutcome {
    /// Outcome label.
    result: String,
    /// Optional reason.
    #[serde(default)]
    reason: Option<String>,
}

/// Returns the always-true condition document.
fn empty_condition() -> Value {
    Value::Object(serde_json::Map::new())
}

// ============================================================================
// SECTION: Ruleset
// ============================================================================

/// Outcome clause of a rule or of the ruleset default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Outcome produced.
    pub result: PolicyOutcome,
    /// Optional reason.
    pub reason: Option<String>,
}

/// Validated rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Rule identifier.
    pub id: RuleId,
    /// Author-supplied description.
    pub description: Option<String>,
    /// Compiled predicate.
    pub when: Condition,
    /// Outcome when the predicate holds.
    pub then: RuleOutcome,
}

/// Validated, immutable ruleset.
///
/// # Invariants
/// - Rule identifiers are non-empty and unique.
/// - Every condition compiled successfully.
/// - `hash` is the canonical hash of the source document.
#[derive(Debug, Clone)]
pub struct Ruleset {
    /// Version label.
    version: String,
    /// Author-supplied description.
    description: Option<String>,
    /// Ordered rules.
    rules: Vec<Rule>,
    /// Default outcome.
    default: RuleOutcome,
    /// Canonical document hash.
    hash: String,
}

impl Ruleset {
    /// Parses and validates a ruleset from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the document is malformed or fails validation.
    pub fn from_json_str(input: &str) -> Result<Self, PolicyError> {
        let value: Value =
            serde_json::from_str(input).map_err(|err| PolicyError::Parse(err.to_string()))?;
        Self::from_value(&value)
    }

    /// Parses and validates a ruleset from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the document is malformed or fails validation.
    pub fn from_value(value: &Value) -> Result<Self, PolicyError> {
        let raw: RawRuleset = serde_json::from_value(value.clone())
            .map_err(|err| PolicyError::Parse(err.to_string()))?;
        if raw.version.trim().is_empty() {
            return Err(PolicyError::invalid("$.version", "must not be empty"));
        }
        let mut seen = BTreeSet::new();
        let mut rules = Vec::with_capacity(raw.rules.len());
        for (index, rule) in raw.rules.into_iter().enumerate() {
            let path = format!("$.rules[{index}]");
            if rule.id.trim().is_empty() {
                return Err(PolicyError::invalid(&format!("{path}.id"), "must not be empty"));
            }
            if !seen.insert(rule.id.clone()) {
                return Err(PolicyError::invalid(
                    &format!("{path}.id"),
                    format!("duplicate rule id '{}'", rule.id),
                ));
            }
            let when = Condition::compile(&rule.when, &format!("{path}.when"))?;
            let then = parse_outcome(rule.then, &format!("{path}.then"))?;
            rules.push(Rule {
                id: RuleId::new(rule.id),
                description: rule.description,
                when,
                then,
            });
        }
        let default = raw
            .default
            .ok_or_else(|| PolicyError::invalid("$.default", "a default outcome is required"))?;
        let default = parse_outcome(default, "$.default")?;
        let hash = fingerprint(value).map_err(|err| PolicyError::Parse(err.to_string()))?;
        Ok(Self {
            version: raw.version,
            description: raw.description,
            rules,
            default,
            hash,
        })
    }

    /// Loads a ruleset from a `.json` file.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the file is unreadable, too large, not
    /// JSON, or fails validation.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            return Err(PolicyError::UnsupportedFormat(format!(
                "policy file must be .json: {}",
                path.display()
            )));
        }
        let metadata = fs::metadata(path)
            .map_err(|err| PolicyError::Io(format!("{}: {err}", path.display())))?;
        if metadata.len() > MAX_POLICY_FILE_SIZE {
            return Err(PolicyError::Io(format!(
                "{}: file exceeds {MAX_POLICY_FILE_SIZE} bytes",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)
            .map_err(|err| PolicyError::Io(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&content)
    }

    /// Returns the built-in default ruleset.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the embedded document fails validation.
    pub fn builtin() -> Result<Self, PolicyError> {
        Self::from_json_str(DEFAULT_POLICY_JSON)
    }

    /// Returns the version label.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the author-supplied description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the canonical document hash.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Returns the ordered rules.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns the default outcome.
    #[must_use]
    pub const fn default_outcome(&self) -> &RuleOutcome {
        &self.default
    }

    /// Evaluates the ruleset: first matching rule wins, else the default.
    #[must_use]
    pub fn evaluate(&self, inputs: &PolicyInputs) -> PolicyEvaluation {
        let mut evaluated_rules = Vec::new();
        for rule in &self.rules {
            let matched = rule.when.evaluate(inputs);
            evaluated_rules.push(RuleTrace {
                rule_id: rule.id.clone(),
                matched,
                outcome: matched.then_some(rule.then.result),
            });
            if matched {
                return PolicyEvaluation {
                    result: rule.then.result,
                    reason: rule
                        .then
                        .reason
                        .clone()
                        .unwrap_or_else(|| format!("Rule {} matched", rule.id)),
                    matched_rule_id: Some(rule.id.clone()),
                    evaluated_rules,
                    policy_version: self.version.clone(),
                    policy_hash: self.hash.clone(),
                };
            }
        }
        PolicyEvaluation {
            result: self.default.result,
            reason: self
                .default
                .reason
                .clone()
                .unwrap_or_else(|| DEFAULT_FALLBACK_REASON.to_string()),
            matched_rule_id: None,
            evaluated_rules,
            policy_version: self.version.clone(),
            policy_hash: self.hash.clone(),
        }
    }
}

/// Validates an outcome clause.
fn parse_outcome(raw: RawOutcome, path: &str) -> Result<RuleOutcome, PolicyError> {
    let result = raw
        .result
        .parse::<PolicyOutcome>()
        .map_err(|err| PolicyError::invalid(&format!("{path}.result"), err.to_string()))?;
    Ok(RuleOutcome {
        result,
        reason: raw.reason,
    })
}
