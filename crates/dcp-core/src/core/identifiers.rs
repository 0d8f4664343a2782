// crates/dcp-core/src/core/identifiers.rs
// ============================================================================
// Module: Decision Identifiers
// Description: Opaque identifiers for decisions, actions, events, and tenants.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings that serialize transparently. Format checks
//! for caller-supplied identifiers (`flow_id`, `node_id`) live in
//! [`crate::core::validation`]; engine-generated identifiers use UUID v4.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares a transparent string identifier with the shared accessor surface.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from an existing string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

/// Declares a generator for identifiers minted by the engine.
macro_rules! generated_identifier {
    ($name:ident) => {
        impl $name {
            /// Generates a fresh random identifier (UUID v4).
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier!(
    /// Globally unique decision identifier generated at gate creation.
    DecisionId
);
generated_identifier!(DecisionId);

string_identifier!(
    /// Identifier of the external workflow execution that raised the gate.
    ExecutionId
);

string_identifier!(
    /// Tenant identifier that scopes correlation keys and ruleset selection.
    OrgId
);

impl Default for OrgId {
    fn default() -> Self {
        Self::new(DEFAULT_ORG_ID)
    }
}

string_identifier!(
    /// Identifier of the external workflow definition.
    FlowId
);

string_identifier!(
    /// Identifier of the workflow node that paused on the gate.
    NodeId
);

string_identifier!(
    /// Identifier of an appended decision action.
    ActionId
);
generated_identifier!(ActionId);

string_identifier!(
    /// Identifier of an outbound event.
    EventId
);
generated_identifier!(EventId);

string_identifier!(
    /// Identifier of a persisted policy snapshot.
    SnapshotId
);
generated_identifier!(SnapshotId);

string_identifier!(
    /// Identifier of a policy rule.
    RuleId
);

string_identifier!(
    /// Correlation identifier propagated to every event of a decision.
    TraceId
);

impl TraceId {
    /// Generates a fresh trace identifier (32 lowercase hex characters).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// Tenant used when callers do not supply an `org_id`.
pub const DEFAULT_ORG_ID: &str = "default";
