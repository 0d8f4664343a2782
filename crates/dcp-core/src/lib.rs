// crates/dcp-core/src/lib.rs
// ============================================================================
// Module: Decision Control Plane Core Library
// Description: Public API surface for the decision lifecycle engine.
// Purpose: Expose core types, policy evaluation, interfaces, and runtime.
// Dependencies: crate::{core, interfaces, policy, runtime}
// ============================================================================

//! ## Overview
//! The decision control plane records human approval checkpoints for
//! externally orchestrated workflows, evaluates a deterministic policy to
//! decide whether a human is needed, enforces a first-writer-wins decision
//! state machine, expires overdue gates, and co-commits one outbound event
//! per transition into a durable outbox. It is backend-agnostic and
//! integrates through the [`DecisionStore`] and [`EventOutbox`] traits.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod policy;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::DecisionBackend;
pub use interfaces::DecisionStore;
pub use interfaces::EventOutbox;
pub use interfaces::GateInsert;
pub use interfaces::NewGate;
pub use interfaces::OverdueCursor;
pub use interfaces::StatusTransition;
pub use interfaces::StoreError;
pub use interfaces::TransitionOutcome;
pub use policy::PolicyCatalog;
pub use policy::PolicyError;
pub use policy::PolicyEvaluation;
pub use policy::PolicyInputs;
pub use policy::PolicyOutcome;
pub use policy::PolicyRegistry;
pub use policy::RuleTrace;
pub use policy::Ruleset;
pub use runtime::ActionInput;
pub use runtime::ActionRequest;
pub use runtime::CreateGateRequest;
pub use runtime::DecisionEngine;
pub use runtime::EngineConfig;
pub use runtime::EngineError;
pub use runtime::ErrorCategory;
pub use runtime::ExpiryReport;
pub use runtime::GateCreation;
pub use runtime::InMemoryDecisionStore;
pub use runtime::SharedDecisionStore;
