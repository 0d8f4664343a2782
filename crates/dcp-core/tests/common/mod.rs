// crates/dcp-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Helpers
// Description: Shared fixtures for decision lifecycle integration tests.
// Purpose: Build engines, gate requests, and timestamps consistently.
// Dependencies: dcp-core
// ============================================================================

//! ## Overview
//! Fixtures wire an in-memory store to the built-in ruleset so tests exercise
//! the same engine surface the server uses.

#![allow(dead_code, reason = "Helpers are shared across several test crates.")]

use std::sync::Arc;

use dcp_core::CreateGateRequest;
use dcp_core::DecisionEngine;
use dcp_core::DecisionSignals;
use dcp_core::EngineConfig;
use dcp_core::ExecutionId;
use dcp_core::FlowId;
use dcp_core::InMemoryDecisionStore;
use dcp_core::NodeId;
use dcp_core::PolicyCatalog;
use dcp_core::PolicyRegistry;
use dcp_core::Recommendation;
use dcp_core::SharedDecisionStore;
use dcp_core::Timestamp;

/// Base test clock: 2026-01-01T00:00:00Z.
pub const T0: i64 = 1_767_225_600_000;

/// Returns `T0 + offset_ms`.
pub fn at(offset_ms: i64) -> Timestamp {
    Timestamp::from_unix_millis(T0 + offset_ms)
}

/// Builds an engine over a fresh in-memory store and the built-in ruleset.
pub fn engine() -> DecisionEngine<SharedDecisionStore> {
    engine_with(EngineConfig::default())
}

/// Builds an engine with explicit configuration.
pub fn engine_with(config: EngineConfig) -> DecisionEngine<SharedDecisionStore> {
    let store = SharedDecisionStore::from_store(InMemoryDecisionStore::new());
    let registry = PolicyRegistry::new(PolicyCatalog::builtin().expect("builtin catalog"));
    DecisionEngine::new(store, Arc::new(registry), config)
}

/// Builds a gate request for `(execution_id, node_id)` with the given signals.
pub fn gate_request(
    execution_id: &str,
    node_id: &str,
    risk: f64,
    confidence: f64,
    cost: Option<f64>,
) -> CreateGateRequest {
    CreateGateRequest {
        org_id: None,
        execution_id: ExecutionId::new(execution_id),
        flow_id: FlowId::new("flow-1"),
        node_id: NodeId::new(node_id),
        language: "en".to_string(),
        signals: DecisionSignals {
            risk_score: Some(risk),
            confidence_score: Some(confidence),
            estimated_cost: cost,
            ..DecisionSignals::default()
        },
        recommendation: Recommendation {
            summary: "Refund the customer".to_string(),
            ..Recommendation::default()
        },
        sla_seconds: None,
        expires_at: None,
        trace_id: None,
    }
}

/// Builds a gate request that the built-in ruleset routes to a human.
pub fn human_request(execution_id: &str, node_id: &str) -> CreateGateRequest {
    gate_request(execution_id, node_id, 0.5, 0.6, Some(50.0))
}
