// crates/dcp-core/src/core/mod.rs
// ============================================================================
// Module: Decision Control Plane Core Types
// Description: Canonical decision, event, and identifier types.
// Purpose: Provide stable, serializable records shared by every store and API.
// Dependencies: serde, serde_json, serde_jcs, sha2, time
// ============================================================================

//! ## Overview
//! Core types define the decision aggregate, its append-only audit records,
//! outbox events, and the hashing and validation helpers used to derive
//! replay-stable keys. These types are the canonical source of truth for any
//! derived API surface.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod decision;
pub mod event;
pub mod hashing;
pub mod identifiers;
pub mod time;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use decision::ActionType;
pub use decision::ActorType;
pub use decision::CorrelationKey;
pub use decision::DEFAULT_PAGE_LIMIT;
pub use decision::Decision;
pub use decision::DecisionAction;
pub use decision::DecisionDetails;
pub use decision::DecisionPage;
pub use decision::DecisionQuery;
pub use decision::DecisionSignals;
pub use decision::DecisionStatus;
pub use decision::MAX_PAGE_LIMIT;
pub use decision::PolicySnapshot;
pub use decision::Recommendation;
pub use decision::UnknownLabel;
pub use event::CLOUDEVENTS_SPEC_VERSION;
pub use event::DecisionEvent;
pub use event::EventEnvelope;
pub use event::EventType;
pub use event::OutboxEntry;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::ActionId;
pub use identifiers::DEFAULT_ORG_ID;
pub use identifiers::DecisionId;
pub use identifiers::EventId;
pub use identifiers::ExecutionId;
pub use identifiers::FlowId;
pub use identifiers::NodeId;
pub use identifiers::OrgId;
pub use identifiers::RuleId;
pub use identifiers::SnapshotId;
pub use identifiers::TraceId;
pub use time::Timestamp;
pub use time::TimestampError;
pub use validation::ValidationError;
