// crates/dcp-core/src/runtime/error.rs
// ============================================================================
// Module: Engine Errors
// Description: Error taxonomy for lifecycle operations.
// Purpose: Give callers a stable category plus a human-readable reason.
// Dependencies: crate::{core, interfaces, policy}, thiserror
// ============================================================================

//! ## Overview
//! Every rejected operation maps onto one [`ErrorCategory`]. Conflicts carry
//! the decision's current state so callers can reconcile without a re-read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::core::Decision;
use crate::core::DecisionId;
use crate::core::hashing::HashError;
use crate::core::validation::ValidationError;
use crate::interfaces::StoreError;
use crate::policy::PolicyError;

// ============================================================================
// SECTION: Categories
// ============================================================================

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed request; no state change.
    Validation,
    /// Unknown decision.
    NotFound,
    /// Decision is not in a state that accepts the request.
    Conflict,
    /// No valid policy configuration is active.
    Configuration,
    /// Store failure; retryable.
    Store,
    /// The request deadline elapsed.
    Timeout,
    /// The client exceeded its request rate.
    RateLimited,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorCategory {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Configuration => "configuration",
            Self::Store => "store",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Engine Error
// ============================================================================

/// Errors returned by lifecycle operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Request failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// Decision does not exist.
    #[error("decision not found: {0}")]
    NotFound(DecisionId),
    /// Decision is not in an accepting state.
    #[error("decision {} is already {}", .0.decision_id, .0.status)]
    Conflict(Box<Decision>),
    /// Policy configuration is unavailable.
    #[error("{0}")]
    Policy(#[from] PolicyError),
    /// Store failed; nothing was committed.
    #[error("{0}")]
    Store(#[from] StoreError),
    /// Internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns the caller-facing category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Policy(_) => ErrorCategory::Configuration,
            Self::Store(_) => ErrorCategory::Store,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns the current decision for conflict errors.
    #[must_use]
    pub fn conflicting_decision(&self) -> Option<&Decision> {
        match self {
            Self::Conflict(decision) => Some(decision),
            _ => None,
        }
    }
}

impl From<HashError> for EngineError {
    fn from(err: HashError) -> Self {
        Self::Internal(err.to_string())
    }
}
