// crates/dcp-server/src/audit.rs
// ============================================================================
// Module: Audit Logging
// Description: Structured audit records for API mutations and expiry scans.
// Purpose: Emit JSON-lines audit records to stderr, a file, or nowhere.
// Dependencies: dcp-config, serde, serde_json
// ============================================================================

//! ## Overview
//! Every state-changing request and every expiry scan produces one
//! [`AuditRecord`]. Sinks serialize records as single JSON lines; write
//! failures are swallowed so auditing never fails a request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use dcp_config::AuditConfig;
use dcp_core::Timestamp;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome label for audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The operation committed or read successfully.
    Ok,
    /// The operation was rejected or failed.
    Error,
}

/// Audit record payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// Event identifier (for example `decision_actioned`).
    pub event: &'static str,
    /// Record timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Operation outcome.
    pub outcome: AuditOutcome,
    /// Decision identifier when the record concerns one decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<String>,
    /// Tenant identifier when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Decision status after the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Error category for failed operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<&'static str>,
    /// Event-specific fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl AuditRecord {
    /// Creates a record with no decision fields.
    #[must_use]
    pub const fn new(event: &'static str, now: Timestamp, outcome: AuditOutcome) -> Self {
        Self {
            event,
            timestamp_ms: now.as_unix_millis(),
            outcome,
            decision_id: None,
            org_id: None,
            status: None,
            error_category: None,
            detail: None,
        }
    }

    /// Attaches decision identity and status.
    #[must_use]
    pub fn with_decision(
        mut self,
        decision_id: impl Into<String>,
        org_id: Option<String>,
        status: Option<String>,
    ) -> Self {
        self.decision_id = Some(decision_id.into());
        self.org_id = org_id;
        self.status = status;
        self
    }

    /// Attaches an error category.
    #[must_use]
    pub const fn with_error(mut self, category: &'static str) -> Self {
        self.error_category = Some(category);
        self
    }

    /// Attaches event-specific detail.
    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Records one audit entry.
    fn record(&self, record: &AuditRecord);
}

/// Builds the audit sink selected by configuration.
///
/// # Errors
///
/// Returns an I/O error when the audit file cannot be opened.
pub fn audit_sink_from_config(
    config: &AuditConfig,
    resolve: impl Fn(&Path) -> std::path::PathBuf,
) -> io::Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => Ok(Arc::new(FileAuditSink::new(&resolve(path))?)),
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, record: &AuditRecord) {
        if let Ok(payload) = serde_json::to_string(record) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, record: &AuditRecord) {
        if let Ok(payload) = serde_json::to_string(record)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: &AuditRecord) {}
}

/// Audit sink that keeps records in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Captured records in arrival order.
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the captured records.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
