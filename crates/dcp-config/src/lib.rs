// crates/dcp-config/src/lib.rs
// ============================================================================
// Module: Decision Control Plane Config Library
// Description: Public API surface for dcp.toml loading and validation.
// Purpose: Expose the configuration model shared by the server and CLI.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! `dcp-config` owns the `dcp.toml` model. [`DcpConfig::load`] resolves,
//! reads, parses, and validates configuration fail-closed; helper methods
//! turn validated sections into engine, store, and policy inputs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_NAME;
pub use config::DcpConfig;
pub use config::EventSinkConfig;
pub use config::EventSinkType;
pub use config::EventsConfig;
pub use config::ExpiryConfig;
pub use config::GatesConfig;
pub use config::LogFormat;
pub use config::LoggingConfig;
pub use config::PolicyConfig;
pub use config::PolicyOverrideConfig;
pub use config::RateLimitConfig;
pub use config::ServerConfig;
pub use config::StoreConfig;
pub use config::StoreType;
