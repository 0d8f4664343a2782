// crates/dcp-core/src/policy/catalog.rs
// ============================================================================
// Module: Policy Catalog
// Description: Ruleset selection by tenant and language, with hot reload.
// Purpose: Guarantee that exactly one ruleset resolves for every gate.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`PolicyCatalog`] maps `(org, language)` selectors to rulesets and always
//! carries a default, so resolution never fails. The [`PolicyRegistry`] holds
//! the active catalog behind a lock so hosts can swap it at runtime; when a
//! reload fails the registry is left without a catalog and gate creation
//! reports a configuration error until a valid catalog is activated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::RwLock;

use crate::core::identifiers::OrgId;
use crate::policy::PolicyError;
use crate::policy::Ruleset;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Ruleset bound to an optional tenant and language selector.
#[derive(Debug, Clone)]
struct CatalogEntry {
    /// Tenant selector; `None` matches any tenant.
    org_id: Option<OrgId>,
    /// Lowercased language selector; `None` matches any language.
    language: Option<String>,
    /// Selected ruleset.
    ruleset: Arc<Ruleset>,
}

impl CatalogEntry {
    /// Returns the match specificity (higher wins) or `None` when not applicable.
    fn specificity(&self, org_id: &OrgId, language: &str) -> Option<u8> {
        let org_score = match &self.org_id {
            Some(selector) if selector == org_id => 2,
            Some(_) => return None,
            None => 0,
        };
        let language_score = match &self.language {
            Some(selector) if selector.eq_ignore_ascii_case(language) => 1,
            Some(_) => return None,
            None => 0,
        };
        Some(org_score + language_score)
    }
}

/// Set of rulesets with a mandatory default.
#[derive(Debug, Clone)]
pub struct PolicyCatalog {
    /// Fallback ruleset.
    default: Arc<Ruleset>,
    /// Selector-bound overrides.
    entries: Vec<CatalogEntry>,
}

impl PolicyCatalog {
    /// Creates a catalog with only a default ruleset.
    #[must_use]
    pub fn new(default: Ruleset) -> Self {
        Self {
            default: Arc::new(default),
            entries: Vec::new(),
        }
    }

    /// Creates a catalog backed by the built-in default ruleset.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the built-in ruleset fails validation.
    pub fn builtin() -> Result<Self, PolicyError> {
        Ok(Self::new(Ruleset::builtin()?))
    }

    /// Adds a ruleset selected by tenant and/or language.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Catalog`] when both selectors are empty or the
    /// selector is already bound.
    pub fn with_override(
        mut self,
        org_id: Option<OrgId>,
        language: Option<String>,
        ruleset: Ruleset,
    ) -> Result<Self, PolicyError> {
        if org_id.is_none() && language.is_none() {
            return Err(PolicyError::Catalog(
                "override requires an org_id, a language, or both".to_string(),
            ));
        }
        let language = language.map(|value| value.to_ascii_lowercase());
        if self.entries.iter().any(|entry| entry.org_id == org_id && entry.language == language) {
            return Err(PolicyError::Catalog(format!(
                "duplicate override for org_id={} language={}",
                org_id.as_ref().map_or("*", OrgId::as_str),
                language.as_deref().unwrap_or("*"),
            )));
        }
        self.entries.push(CatalogEntry {
            org_id,
            language,
            ruleset: Arc::new(ruleset),
        });
        Ok(self)
    }

    /// Resolves the most specific ruleset for a tenant and language.
    ///
    /// Precedence: (org, language), (org, any), (any, language), default.
    #[must_use]
    pub fn resolve(&self, org_id: &OrgId, language: &str) -> Arc<Ruleset> {
        self.entries
            .iter()
            .filter_map(|entry| entry.specificity(org_id, language).map(|score| (score, entry)))
            .max_by_key(|(score, _)| *score)
            .map_or_else(|| Arc::clone(&self.default), |(_, entry)| Arc::clone(&entry.ruleset))
    }

    /// Returns the number of rulesets, including the default.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() + 1
    }

    /// Always false; a catalog holds at least its default.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Active catalog slot.
#[derive(Debug)]
enum RegistryState {
    /// A validated catalog is active.
    Active(Arc<PolicyCatalog>),
    /// No catalog is active; holds the reason.
    Unavailable(String),
}

/// Hot-swappable holder of the active policy catalog.
#[derive(Debug)]
pub struct PolicyRegistry {
    /// Current state.
    state: RwLock<RegistryState>,
}

impl PolicyRegistry {
    /// Creates a registry with an active catalog.
    #[must_use]
    pub fn new(catalog: PolicyCatalog) -> Self {
        Self {
            state: RwLock::new(RegistryState::Active(Arc::new(catalog))),
        }
    }

    /// Creates a registry with no active catalog.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(RegistryState::Unavailable(reason.into())),
        }
    }

    /// Creates a registry from a load result, recording the failure reason.
    #[must_use]
    pub fn from_load(result: Result<PolicyCatalog, PolicyError>) -> Self {
        match result {
            Ok(catalog) => Self::new(catalog),
            Err(err) => Self::unavailable(err.to_string()),
        }
    }

    /// Returns the active catalog.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Unavailable`] when no catalog is active.
    pub fn current(&self) -> Result<Arc<PolicyCatalog>, PolicyError> {
        let guard = self
            .state
            .read()
            .map_err(|_| PolicyError::Unavailable("policy registry lock poisoned".to_string()))?;
        match &*guard {
            RegistryState::Active(catalog) => Ok(Arc::clone(catalog)),
            RegistryState::Unavailable(reason) => Err(PolicyError::Unavailable(reason.clone())),
        }
    }

    /// Replaces the active catalog.
    pub fn activate(&self, catalog: PolicyCatalog) {
        self.replace(RegistryState::Active(Arc::new(catalog)));
    }

    /// Deactivates the catalog, recording the reason.
    pub fn deactivate(&self, reason: impl Into<String>) {
        self.replace(RegistryState::Unavailable(reason.into()));
    }

    /// Applies a reload result: activates on success, deactivates on failure.
    ///
    /// # Errors
    ///
    /// Returns the load error after deactivating the registry.
    pub fn reload(&self, result: Result<PolicyCatalog, PolicyError>) -> Result<(), PolicyError> {
        match result {
            Ok(catalog) => {
                self.activate(catalog);
                Ok(())
            }
            Err(err) => {
                self.deactivate(err.to_string());
                Err(err)
            }
        }
    }

    /// Swaps the registry state, recovering from lock poisoning.
    fn replace(&self, next: RegistryState) {
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = next;
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
