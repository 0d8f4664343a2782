// crates/dcp-core/src/runtime/mod.rs
// ============================================================================
// Module: Decision Control Plane Runtime
// Description: Lifecycle engine, state machine, expiry, and event building.
// Purpose: Apply gate, action, and expiry transitions against a store.
// Dependencies: crate::{core, interfaces, policy}
// ============================================================================

//! ## Overview
//! The runtime layers the decision lifecycle over the [`crate::interfaces`]
//! traits. Components never mutate status directly: every transition is a
//! store compare-and-swap carrying its action row and outbox event.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod actions;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod gate;
pub mod publisher;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use actions::ActionInput;
pub use actions::ActionProcessor;
pub use actions::ActionRequest;
pub use engine::DEFAULT_EXPIRY_BATCH_SIZE;
pub use engine::DecisionEngine;
pub use engine::EngineConfig;
pub use error::EngineError;
pub use error::ErrorCategory;
pub use expiry::EXPIRY_COMMENT;
pub use expiry::ExpiryFailure;
pub use expiry::ExpiryReport;
pub use expiry::ExpirySupervisor;
pub use gate::CreateGateRequest;
pub use gate::DEFAULT_LANGUAGE;
pub use gate::GateConfig;
pub use gate::GateCreation;
pub use gate::GateManager;
pub use publisher::EventPublisher;
pub use publisher::idempotency_key;
pub use publisher::resume_token;
pub use store::InMemoryDecisionStore;
pub use store::SharedDecisionStore;
