// crates/dcp-core/src/core/validation.rs
// ============================================================================
// Module: Input Validation
// Description: Field-level validation and sanitization for inbound requests.
// Purpose: Reject malformed requests before any state change or event.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Validation errors are synchronous and side-effect free: a request that fails
//! here never reaches the policy evaluator or the store. Free text (comments,
//! compliance flags) is sanitized rather than rejected.
//!
//! Security posture: every field arrives from an untrusted caller; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum length of `flow_id`, `node_id`, `execution_id`, and `org_id`.
pub const MAX_IDENTIFIER_LENGTH: usize = 255;
/// Maximum length of an `actor_id`.
pub const MAX_ACTOR_ID_LENGTH: usize = 255;
/// Maximum comment length after trimming.
pub const MAX_COMMENT_LENGTH: usize = 1000;
/// Maximum number of compliance flags.
pub const MAX_COMPLIANCE_FLAGS: usize = 50;
/// Maximum length of a single compliance flag.
pub const MAX_COMPLIANCE_FLAG_LENGTH: usize = 100;
/// Maximum recommendation summary length.
pub const MAX_SUMMARY_LENGTH: usize = 10_000;
/// Minimum language tag length.
const MIN_LANGUAGE_LENGTH: usize = 2;
/// Maximum language tag length.
const MAX_LANGUAGE_LENGTH: usize = 16;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Validation failure for a single request field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Offending field name.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error for `field`.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Validators
// ============================================================================

/// Validates an identifier: non-empty, bounded, `[A-Za-z0-9_.-]` only.
///
/// # Errors
///
/// Returns [`ValidationError`] when the identifier is empty, too long, or
/// contains a disallowed character.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if value.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::new(
            field,
            format!("must be at most {MAX_IDENTIFIER_LENGTH} characters"),
        ));
    }
    if !value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.')) {
        return Err(ValidationError::new(
            field,
            "may only contain letters, digits, '_', '-', and '.'",
        ));
    }
    Ok(())
}

/// Validates a language tag such as `en` or `pt-BR`.
///
/// # Errors
///
/// Returns [`ValidationError`] when the tag is malformed.
pub fn validate_language(value: &str) -> Result<(), ValidationError> {
    let length = value.chars().count();
    if !(MIN_LANGUAGE_LENGTH..=MAX_LANGUAGE_LENGTH).contains(&length)
        || !value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
        || value.starts_with('-')
    {
        return Err(ValidationError::new("language", "must be a language tag such as 'en'"));
    }
    Ok(())
}

/// Validates an optional score in `[0, 1]`.
///
/// # Errors
///
/// Returns [`ValidationError`] when the score is non-finite or out of range.
pub fn validate_score(field: &str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(score) if !score.is_finite() || !(0.0..=1.0).contains(&score) => {
            Err(ValidationError::new(field, "must be between 0.0 and 1.0"))
        }
        _ => Ok(()),
    }
}

/// Validates an optional non-negative cost.
///
/// # Errors
///
/// Returns [`ValidationError`] when the cost is non-finite or negative.
pub fn validate_cost(field: &str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(cost) if !cost.is_finite() || cost < 0.0 => {
            Err(ValidationError::new(field, "must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

/// Validates an optional actor identifier.
///
/// # Errors
///
/// Returns [`ValidationError`] when the identifier is blank or too long.
pub fn validate_actor_id(value: Option<&str>) -> Result<(), ValidationError> {
    let Some(actor) = value else {
        return Ok(());
    };
    if actor.trim().is_empty() {
        return Err(ValidationError::new("actor_id", "must not be blank"));
    }
    if actor.chars().count() > MAX_ACTOR_ID_LENGTH {
        return Err(ValidationError::new(
            "actor_id",
            format!("must be at most {MAX_ACTOR_ID_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// Validates a recommendation summary.
///
/// # Errors
///
/// Returns [`ValidationError`] when the summary is too long.
pub fn validate_summary(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > MAX_SUMMARY_LENGTH {
        return Err(ValidationError::new(
            "recommendation.summary",
            format!("must be at most {MAX_SUMMARY_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// Validates a `modify` payload: a non-empty JSON object.
///
/// # Errors
///
/// Returns [`ValidationError`] when the payload is missing, not an object, or empty.
pub fn validate_modifications(value: Option<&Value>) -> Result<(), ValidationError> {
    match value {
        Some(Value::Object(map)) if !map.is_empty() => Ok(()),
        Some(Value::Object(_)) | None => {
            Err(ValidationError::new("modifications", "must be a non-empty object"))
        }
        Some(_) => Err(ValidationError::new("modifications", "must be a JSON object")),
    }
}

// ============================================================================
// SECTION: Sanitizers
// ============================================================================

/// Returns true for characters stripped from free text.
fn is_unsafe_char(ch: char) -> bool {
    ch.is_control() || matches!(ch, '<' | '>' | '"' | '\'' | ';' | '\\')
}

/// Strips unsafe characters, trims, and caps length. Empty results become `None`.
#[must_use]
pub fn sanitize_text(value: Option<&str>, max_chars: usize) -> Option<String> {
    let cleaned: String = value?
        .chars()
        .map(|ch| if ch == '\n' || ch == '\r' || ch == '\t' { ' ' } else { ch })
        .filter(|ch| !is_unsafe_char(*ch))
        .collect();
    let capped: String = cleaned.trim().chars().take(max_chars).collect();
    let trimmed = capped.trim_end();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// Sanitizes an action comment.
#[must_use]
pub fn sanitize_comment(value: Option<&str>) -> Option<String> {
    sanitize_text(value, MAX_COMMENT_LENGTH)
}

/// Sanitizes compliance flags, dropping entries that are empty after cleanup.
///
/// # Errors
///
/// Returns [`ValidationError`] when there are too many flags or a flag is too long.
pub fn sanitize_compliance_flags(flags: &[String]) -> Result<Vec<String>, ValidationError> {
    if flags.len() > MAX_COMPLIANCE_FLAGS {
        return Err(ValidationError::new(
            "compliance_flags",
            format!("at most {MAX_COMPLIANCE_FLAGS} flags are allowed"),
        ));
    }
    let mut cleaned = Vec::with_capacity(flags.len());
    for flag in flags {
        if flag.chars().count() > MAX_COMPLIANCE_FLAG_LENGTH {
            return Err(ValidationError::new(
                "compliance_flags",
                format!("each flag must be at most {MAX_COMPLIANCE_FLAG_LENGTH} characters"),
            ));
        }
        if let Some(value) = sanitize_text(Some(flag), MAX_COMPLIANCE_FLAG_LENGTH) {
            cleaned.push(value);
        }
    }
    Ok(cleaned)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only sanitizer assertions."
    )]

    use serde_json::json;

    use super::*;

    #[test]
    fn identifiers_enforce_charset_and_length() {
        assert!(validate_identifier("flow_id", "invoice-flow_v2.1").is_ok());
        assert!(validate_identifier("flow_id", "").is_err());
        assert!(validate_identifier("flow_id", "has space").is_err());
        assert!(validate_identifier("flow_id", "<script>").is_err());
        assert!(validate_identifier("node_id", &"a".repeat(255)).is_ok());
        assert!(validate_identifier("node_id", &"a".repeat(256)).is_err());
    }

    #[test]
    fn scores_and_costs_are_bounded() {
        assert!(validate_score("risk_score", Some(0.0)).is_ok());
        assert!(validate_score("risk_score", Some(1.0)).is_ok());
        assert!(validate_score("risk_score", None).is_ok());
        assert!(validate_score("risk_score", Some(1.01)).is_err());
        assert!(validate_score("risk_score", Some(f64::NAN)).is_err());
        assert!(validate_cost("estimated_cost", Some(0.0)).is_ok());
        assert!(validate_cost("estimated_cost", Some(-0.01)).is_err());
        assert!(validate_cost("estimated_cost", Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn comments_are_trimmed_stripped_and_capped() {
        assert_eq!(sanitize_comment(Some("  ok <b>\u{0}fine</b>; ")), Some("ok bfine/b".to_string()));
        assert_eq!(sanitize_comment(Some("   ")), None);
        assert_eq!(sanitize_comment(Some("line\nbreak")), Some("line break".to_string()));
        let long = "x".repeat(1500);
        assert_eq!(sanitize_comment(Some(&long)).map(|c| c.chars().count()), Some(1000));
    }

    #[test]
    fn compliance_flags_are_limited() {
        let flags = vec!["pci".to_string(), " ".to_string(), "gdpr'".to_string()];
        assert_eq!(sanitize_compliance_flags(&flags).unwrap(), vec!["pci", "gdpr"]);
        let too_many: Vec<String> = (0..51).map(|i| format!("f{i}")).collect();
        assert!(sanitize_compliance_flags(&too_many).is_err());
        assert!(sanitize_compliance_flags(&["x".repeat(101)]).is_err());
    }

    #[test]
    fn modifications_must_be_non_empty_objects() {
        assert!(validate_modifications(Some(&json!({"amount": 10}))).is_ok());
        assert!(validate_modifications(Some(&json!({}))).is_err());
        assert!(validate_modifications(Some(&json!([1]))).is_err());
        assert!(validate_modifications(None).is_err());
    }

    #[test]
    fn language_tags() {
        assert!(validate_language("en").is_ok());
        assert!(validate_language("pt-BR").is_ok());
        assert!(validate_language("e").is_err());
        assert!(validate_language("-en").is_err());
        assert!(validate_language("en_US").is_err());
    }
}
