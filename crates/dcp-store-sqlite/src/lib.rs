// crates/dcp-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Decision Store
// Description: Durable DecisionStore and EventOutbox backend using SQLite WAL.
// Purpose: Provide production-grade persistence for decisions and the outbox.
// Dependencies: dcp-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`DecisionStore`] and [`EventOutbox`]
//! implementation. Status changes are conditional updates keyed on the
//! expected status, and every transition commits its action row and outbox
//! event in the same transaction. Security posture: storage inputs are
//! untrusted; see `Docs/security/threat_model.md`.
//!
//! [`DecisionStore`]: dcp_core::DecisionStore
//! [`EventOutbox`]: dcp_core::EventOutbox

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RECORD_BYTES;
pub use store::SqliteDecisionStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
