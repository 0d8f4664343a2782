// crates/dcp-core/src/runtime/engine.rs
// ============================================================================
// Module: Decision Engine
// Description: Facade over gate creation, actions, expiry, and read paths.
// Purpose: Single entry point shared by the HTTP server, CLI, and tests.
// Dependencies: crate::{core, interfaces, policy, runtime}
// ============================================================================

//! ## Overview
//! [`DecisionEngine`] wires the gate manager, action processor, and expiry
//! supervisor onto one store and one policy registry. Every operation takes
//! an explicit `now` so callers own the clock.
//! Read paths never consult the policy registry, so they keep working while
//! no ruleset is active.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::core::Decision;
use crate::core::DecisionDetails;
use crate::core::DecisionId;
use crate::core::DecisionPage;
use crate::core::DecisionQuery;
use crate::core::MAX_PAGE_LIMIT;
use crate::core::OrgId;
use crate::core::PolicySnapshot;
use crate::core::Timestamp;
use crate::core::validation::ValidationError;
use crate::interfaces::DecisionStore;
use crate::policy::PolicyCatalog;
use crate::policy::PolicyError;
use crate::policy::PolicyRegistry;
use crate::runtime::actions::ActionProcessor;
use crate::runtime::actions::ActionRequest;
use crate::runtime::error::EngineError;
use crate::runtime::expiry::ExpiryReport;
use crate::runtime::expiry::ExpirySupervisor;
use crate::runtime::gate::CreateGateRequest;
use crate::runtime::gate::GateConfig;
use crate::runtime::gate::GateCreation;
use crate::runtime::gate::GateManager;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default number of decisions expired per scan.
pub const DEFAULT_EXPIRY_BATCH_SIZE: usize = 100;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Tenant applied when a gate request omits `org_id`.
    pub default_org_id: OrgId,
    /// SLA applied to human-routed gates without an explicit deadline.
    pub default_sla_seconds: Option<u64>,
    /// Maximum decisions expired per scan.
    pub expiry_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_org_id: OrgId::default(),
            default_sla_seconds: None,
            expiry_batch_size: DEFAULT_EXPIRY_BATCH_SIZE,
        }
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Decision lifecycle engine.
pub struct DecisionEngine<S> {
    /// Store used by read paths.
    store: S,
    /// Active policy catalog.
    policies: Arc<PolicyRegistry>,
    /// Gate creation and re-evaluation.
    gates: GateManager<S>,
    /// Action state machine.
    actions: ActionProcessor<S>,
    /// SLA expiry.
    expiry: ExpirySupervisor<S>,
}

impl<S> DecisionEngine<S>
where
    S: DecisionStore + Clone,
{
    /// Builds an engine over `store` and `policies`.
    #[must_use]
    pub fn new(store: S, policies: Arc<PolicyRegistry>, config: EngineConfig) -> Self {
        let gates = GateManager::new(
            store.clone(),
            Arc::clone(&policies),
            GateConfig {
                default_org_id: config.default_org_id,
                default_sla_seconds: config.default_sla_seconds,
            },
        );
        Self {
            actions: ActionProcessor::new(store.clone()),
            expiry: ExpirySupervisor::new(store.clone(), config.expiry_batch_size),
            gates,
            policies,
            store,
        }
    }

    /// Returns the policy registry.
    #[must_use]
    pub const fn policies(&self) -> &Arc<PolicyRegistry> {
        &self.policies
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Creates a gate or returns the open decision for its key.
    ///
    /// # Errors
    ///
    /// See [`GateManager::create_gate`].
    pub fn create_gate(
        &self,
        request: CreateGateRequest,
        now: Timestamp,
    ) -> Result<GateCreation, EngineError> {
        self.gates.create_gate(request, now)
    }

    /// Applies an action to a pending decision.
    ///
    /// # Errors
    ///
    /// See [`ActionProcessor::apply`].
    pub fn apply_action(
        &self,
        decision_id: &DecisionId,
        request: ActionRequest,
        now: Timestamp,
    ) -> Result<Decision, EngineError> {
        self.actions.apply(decision_id, request, now)
    }

    /// Acknowledges that the orchestrator resumed a resolved decision.
    ///
    /// # Errors
    ///
    /// See [`ActionProcessor::acknowledge_resume`].
    pub fn acknowledge_resume(
        &self,
        decision_id: &DecisionId,
        token: &str,
        now: Timestamp,
    ) -> Result<Decision, EngineError> {
        self.actions.acknowledge_resume(decision_id, token, now)
    }

    /// Re-evaluates policy for a decision and appends a snapshot.
    ///
    /// # Errors
    ///
    /// See [`GateManager::reevaluate`].
    pub fn reevaluate(
        &self,
        decision_id: &DecisionId,
        now: Timestamp,
    ) -> Result<PolicySnapshot, EngineError> {
        self.gates.reevaluate(decision_id, now)
    }

    /// Expires overdue pending decisions.
    ///
    /// # Errors
    ///
    /// See [`ExpirySupervisor::scan`].
    pub fn expire_overdue(&self, now: Timestamp) -> Result<ExpiryReport, EngineError> {
        self.expiry.scan(now)
    }

    /// Loads one decision.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] or [`EngineError::Store`].
    pub fn decision(&self, decision_id: &DecisionId) -> Result<Decision, EngineError> {
        self.store
            .load_decision(decision_id)?
            .ok_or_else(|| EngineError::NotFound(decision_id.clone()))
    }

    /// Loads a decision with its recommendation, snapshots, and actions.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] or [`EngineError::Store`].
    pub fn details(&self, decision_id: &DecisionId) -> Result<DecisionDetails, EngineError> {
        self.store
            .load_details(decision_id)?
            .ok_or_else(|| EngineError::NotFound(decision_id.clone()))
    }

    /// Lists decisions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an out-of-range limit or
    /// offset and [`EngineError::Store`] when the query fails.
    pub fn list(&self, query: &DecisionQuery) -> Result<DecisionPage, EngineError> {
        if query.limit == 0 || query.limit > MAX_PAGE_LIMIT {
            return Err(ValidationError::new(
                "limit",
                format!("must be between 1 and {MAX_PAGE_LIMIT}"),
            )
            .into());
        }
        if i64::try_from(query.offset).is_err() {
            return Err(ValidationError::new("offset", format!("must not exceed {}", i64::MAX))
                .into());
        }
        Ok(self.store.list_decisions(query)?)
    }

    /// Replaces the active policy catalog with the outcome of a load.
    ///
    /// A failed load deactivates the catalog.
    ///
    /// # Errors
    ///
    /// Returns the load error after deactivating the registry.
    pub fn reload_policies(
        &self,
        result: Result<PolicyCatalog, PolicyError>,
    ) -> Result<(), EngineError> {
        match self.policies.reload(result) {
            Ok(()) => {
                info!("policy catalog reloaded");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "policy reload failed; gate creation disabled");
                Err(err.into())
            }
        }
    }

    /// Checks store readiness.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when the store is unavailable.
    pub fn readiness(&self) -> Result<(), EngineError> {
        Ok(self.store.readiness()?)
    }
}
