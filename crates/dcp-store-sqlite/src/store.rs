// crates/dcp-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Decision Store
// Description: Durable DecisionStore and EventOutbox backed by SQLite WAL.
// Purpose: Persist decisions, audit rows, and outbox events atomically.
// Dependencies: dcp-core, r2d2, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`DecisionStore`] and [`EventOutbox`] using
//! `SQLite`. Decision rows carry their status in a plain column so the
//! compare-and-swap is a single conditional `UPDATE ... WHERE status IN`,
//! and a partial unique index enforces one open decision per correlation key.
//! Immutable child records (recommendation, snapshots, actions, events) are
//! stored as canonical JSON with a content hash and fail closed on mismatch.
//! Connections come from an r2d2 pool: readers run concurrently under WAL and
//! writers open `IMMEDIATE` transactions that queue on the database write lock
//! for up to the configured busy timeout.
//! Security posture: database contents are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use dcp_core::CorrelationKey;
use dcp_core::Decision;
use dcp_core::DecisionAction;
use dcp_core::DecisionDetails;
use dcp_core::DecisionEvent;
use dcp_core::DecisionId;
use dcp_core::DecisionPage;
use dcp_core::DecisionQuery;
use dcp_core::DecisionSignals;
use dcp_core::DecisionStatus;
use dcp_core::DecisionStore;
use dcp_core::EventId;
use dcp_core::EventOutbox;
use dcp_core::GateInsert;
use dcp_core::NewGate;
use dcp_core::OutboxEntry;
use dcp_core::OverdueCursor;
use dcp_core::PolicySnapshot;
use dcp_core::Recommendation;
use dcp_core::StatusTransition;
use dcp_core::StoreError;
use dcp_core::Timestamp;
use dcp_core::TransitionOutcome;
use dcp_core::hashing::DEFAULT_HASH_ALGORITHM;
use dcp_core::hashing::canonical_json_bytes;
use dcp_core::hashing::digests_match;
use dcp_core::hashing::hash_bytes;
use r2d2::ManageConnection;
use r2d2::Pool;
use r2d2::PooledConnection;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::ToSql;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default connection pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 8;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum size of one stored JSON record.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

/// Columns selected for decision rows, in [`DecisionRow`] order.
const DECISION_COLUMNS: &str = "decision_id, org_id, execution_id, flow_id, node_id, status, \
                                language, signals_json, trace_id, resume_token, created_at, \
                                updated_at, expires_at, version";

/// Columns selected for outbox rows, in [`OutboxRow`] order.
const OUTBOX_COLUMNS: &str = "sequence, event_json, event_hash, attempts, next_attempt_at, \
                              last_error, delivered_at";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` decision store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default connection pool size.
const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Stored record exceeded configured size limits.
    #[error("sqlite store record too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual record size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "record exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

// ============================================================================
// SECTION: Connection Pool
// ============================================================================

/// Opens pooled connections with the store pragmas applied.
#[derive(Debug, Clone)]
struct SqliteConnectionManager {
    /// Store configuration used for every connection.
    config: SqliteStoreConfig,
}

impl ManageConnection for SqliteConnectionManager {
    type Connection = Connection;
    type Error = SqliteStoreError;

    fn connect(&self) -> Result<Connection, SqliteStoreError> {
        open_connection(&self.config)
    }

    fn is_valid(&self, connection: &mut Connection) -> Result<(), SqliteStoreError> {
        connection.execute_batch("SELECT 1;").map_err(SqliteStoreError::from)
    }

    fn has_broken(&self, _connection: &mut Connection) -> bool {
        false
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed decision store with WAL support.
#[derive(Clone)]
pub struct SqliteDecisionStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Connection pool for `SQLite` access.
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteDecisionStore {
    /// Opens an `SQLite`-backed decision store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        drop(connection);
        let manager = SqliteConnectionManager {
            config: config.clone(),
        };
        let pool = Pool::builder()
            .max_size(config.max_connections.max(1))
            .min_idle(Some(1))
            .build(manager)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(Self {
            config,
            pool,
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Checks a connection out of the pool.
    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, SqliteStoreError> {
        self.pool.get().map_err(|err| SqliteStoreError::Db(err.to_string()))
    }

    /// Inserts a gate unless an open decision holds its key.
    fn insert_gate_inner(&self, gate: NewGate) -> Result<GateInsert, SqliteStoreError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(existing) = find_open_in(&tx, &gate.decision.correlation_key())? {
            return Ok(GateInsert::Existing(existing));
        }
        let decision = &gate.decision;
        let signals = encode_signals(&decision.signals)?;
        tx.execute(
            "INSERT INTO decisions (decision_id, org_id, execution_id, flow_id, node_id, status, \
             language, signals_json, trace_id, resume_token, created_at, updated_at, expires_at, \
             version) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                decision.decision_id.as_str(),
                decision.org_id.as_str(),
                decision.execution_id.as_str(),
                decision.flow_id.as_str(),
                decision.node_id.as_str(),
                decision.status.as_str(),
                decision.language,
                signals,
                decision.trace_id.as_str(),
                decision.resume_token,
                decision.created_at.as_unix_millis(),
                decision.updated_at.as_unix_millis(),
                decision.expires_at.map(Timestamp::as_unix_millis),
                to_i64(decision.version, "version")?,
            ],
        )?;
        let (recommendation, recommendation_hash) = encode_record(&gate.recommendation)?;
        tx.execute(
            "INSERT INTO recommendations (decision_id, recommendation_json, recommendation_hash) \
             VALUES (?1, ?2, ?3)",
            params![decision.decision_id.as_str(), recommendation, recommendation_hash],
        )?;
        insert_snapshot(&tx, &gate.snapshot)?;
        if let Some(action) = &gate.action {
            insert_action(&tx, action)?;
        }
        append_events(&tx, &decision.decision_id, &gate.events)?;
        let created = load_decision_in(&tx, &decision.decision_id)?.ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("decision {} vanished on insert", decision.decision_id))
        })?;
        tx.commit()?;
        drop(conn);
        Ok(GateInsert::Created(created))
    }

    /// Applies a status compare-and-swap with its audit rows.
    fn transition_inner(
        &self,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, SqliteStoreError> {
        let expected = transition
            .expected
            .iter()
            .map(|status| format!("'{}'", status.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        if expected.is_empty() {
            return Err(SqliteStoreError::Invalid("transition without expected status".to_string()));
        }
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            &format!(
                "UPDATE decisions SET status = ?1, updated_at = ?2, version = version + 1, \
                 resume_token = COALESCE(?3, resume_token) WHERE decision_id = ?4 AND status IN \
                 ({expected})"
            ),
            params![
                transition.next.as_str(),
                transition.at.as_unix_millis(),
                transition.resume_token,
                transition.decision_id.as_str(),
            ],
        )?;
        if changed == 0 {
            let current = load_decision_in(&tx, &transition.decision_id)?;
            tx.commit()?;
            drop(conn);
            return Ok(current.map_or(TransitionOutcome::NotFound, TransitionOutcome::Conflict));
        }
        if let Some(action) = &transition.action {
            insert_action(&tx, action)?;
        }
        append_events(&tx, &transition.decision_id, &transition.events)?;
        let updated = load_decision_in(&tx, &transition.decision_id)?.ok_or_else(|| {
            SqliteStoreError::Corrupt(format!(
                "decision {} vanished on transition",
                transition.decision_id
            ))
        })?;
        tx.commit()?;
        drop(conn);
        Ok(TransitionOutcome::Applied(updated))
    }

    /// Appends a policy snapshot to an existing decision.
    fn append_snapshot_inner(&self, snapshot: &PolicySnapshot) -> Result<(), SqliteStoreError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        if load_decision_in(&tx, &snapshot.decision_id)?.is_none() {
            return Err(SqliteStoreError::Invalid(format!(
                "unknown decision {}",
                snapshot.decision_id
            )));
        }
        insert_snapshot(&tx, snapshot)?;
        tx.commit()?;
        drop(conn);
        Ok(())
    }

    /// Loads a decision with all child records.
    fn load_details_inner(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Option<DecisionDetails>, SqliteStoreError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let Some(decision) = load_decision_in(&tx, decision_id)? else {
            return Ok(None);
        };
        let recommendation: Recommendation = {
            let (bytes, hash) = tx
                .query_row(
                    "SELECT recommendation_json, recommendation_hash FROM recommendations WHERE \
                     decision_id = ?1",
                    params![decision_id.as_str()],
                    |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?
                .ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("missing recommendation for {decision_id}"))
                })?;
            decode_record(&bytes, &hash, "recommendation")?
        };
        let policy_snapshots = load_records(
            &tx,
            "SELECT snapshot_json, snapshot_hash FROM policy_snapshots WHERE decision_id = ?1 \
             ORDER BY snapshot_seq",
            decision_id,
            "policy snapshot",
        )?;
        let actions = load_records(
            &tx,
            "SELECT action_json, action_hash FROM actions WHERE decision_id = ?1 ORDER BY \
             action_seq",
            decision_id,
            "action",
        )?;
        tx.commit()?;
        drop(conn);
        Ok(Some(DecisionDetails {
            decision,
            recommendation,
            policy_snapshots,
            actions,
        }))
    }

    /// Lists decisions newest first.
    fn list_inner(&self, query: &DecisionQuery) -> Result<DecisionPage, SqliteStoreError> {
        let status = query.status.map(DecisionStatus::as_str);
        let org_id = query.org_id.as_ref().map(dcp_core::OrgId::as_str);
        let limit = to_i64(query.limit, "limit")?;
        let offset = to_i64(query.offset, "offset")?;
        let conn = self.connection()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM decisions WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR \
             org_id = ?2)",
            params![status, org_id],
            |row| row.get(0),
        )?;
        let mut statement = conn.prepare(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE (?1 IS NULL OR status = ?1) AND (?2 \
             IS NULL OR org_id = ?2) ORDER BY created_at DESC, row_seq DESC LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = statement
            .query_map(params![status, org_id, limit, offset], DecisionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(statement);
        drop(conn);
        let items = rows.into_iter().map(DecisionRow::into_decision).collect::<Result<_, _>>()?;
        Ok(DecisionPage {
            items,
            total: u64::try_from(total)
                .map_err(|_| SqliteStoreError::Corrupt("negative decision count".to_string()))?,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Lists overdue pending decisions in `(expires_at, decision_id)` order,
    /// strictly after `after` when given.
    fn overdue_inner(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        limit: usize,
    ) -> Result<Vec<Decision>, SqliteStoreError> {
        let after_expires_at = after.map(|cursor| cursor.expires_at.as_unix_millis());
        let after_decision_id = after.map(|cursor| cursor.decision_id.as_str());
        let conn = self.connection()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE status = ?1 AND expires_at IS NOT \
             NULL AND expires_at <= ?2 AND (?3 IS NULL OR expires_at > ?3 OR (expires_at = ?3 \
             AND decision_id > ?4)) ORDER BY expires_at, decision_id LIMIT ?5"
        ))?;
        let rows = statement
            .query_map(
                params![
                    DecisionStatus::PendingHumanReview.as_str(),
                    now.as_unix_millis(),
                    after_expires_at,
                    after_decision_id,
                    to_i64(limit, "limit")?
                ],
                DecisionRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        drop(statement);
        drop(conn);
        rows.into_iter().map(DecisionRow::into_decision).collect()
    }

    /// Lists the oldest undelivered event of each decision that is due.
    fn pending_inner(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, SqliteStoreError> {
        let conn = self.connection()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox AS o WHERE o.delivered_at IS NULL AND \
             o.next_attempt_at <= ?1 AND o.sequence = (SELECT MIN(i.sequence) FROM outbox AS i \
             WHERE i.decision_id = o.decision_id AND i.delivered_at IS NULL) ORDER BY \
             o.occurred_at, o.outbox_seq LIMIT ?2"
        ))?;
        let rows = statement
            .query_map(
                params![now.as_unix_millis(), to_i64(limit, "limit")?],
                OutboxRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        drop(statement);
        drop(conn);
        rows.into_iter().map(OutboxRow::into_entry).collect()
    }

    /// Lists every outbox entry of one decision in sequence order.
    fn decision_events_inner(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Vec<OutboxEntry>, SqliteStoreError> {
        let conn = self.connection()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE decision_id = ?1 ORDER BY sequence"
        ))?;
        let rows = statement
            .query_map(params![decision_id.as_str()], OutboxRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(statement);
        drop(conn);
        rows.into_iter().map(OutboxRow::into_entry).collect()
    }

    /// Runs an outbox bookkeeping update that must touch exactly one row.
    ///
    /// `?1` in `sql` binds the event identifier.
    fn update_outbox(
        &self,
        event_id: &EventId,
        sql: &str,
        values: &[&dyn ToSql],
    ) -> Result<(), SqliteStoreError> {
        let mut bound: Vec<&dyn ToSql> = Vec::with_capacity(values.len() + 1);
        let id = event_id.as_str();
        bound.push(&id);
        bound.extend_from_slice(values);
        let conn = self.connection()?;
        let changed = conn.execute(sql, bound.as_slice())?;
        drop(conn);
        if changed == 0 {
            return Err(SqliteStoreError::Invalid(format!("unknown event {event_id}")));
        }
        Ok(())
    }
}

impl DecisionStore for SqliteDecisionStore {
    fn find_open(&self, key: &CorrelationKey) -> Result<Option<Decision>, StoreError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(SqliteStoreError::from)?;
        let decision = find_open_in(&tx, key)?;
        tx.commit().map_err(SqliteStoreError::from)?;
        Ok(decision)
    }

    fn insert_gate(&self, gate: NewGate) -> Result<GateInsert, StoreError> {
        self.insert_gate_inner(gate).map_err(StoreError::from)
    }

    fn transition(&self, transition: StatusTransition) -> Result<TransitionOutcome, StoreError> {
        self.transition_inner(transition).map_err(StoreError::from)
    }

    fn append_policy_snapshot(&self, snapshot: &PolicySnapshot) -> Result<(), StoreError> {
        self.append_snapshot_inner(snapshot).map_err(StoreError::from)
    }

    fn load_decision(&self, decision_id: &DecisionId) -> Result<Option<Decision>, StoreError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(SqliteStoreError::from)?;
        let decision = load_decision_in(&tx, decision_id)?;
        tx.commit().map_err(SqliteStoreError::from)?;
        Ok(decision)
    }

    fn load_details(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Option<DecisionDetails>, StoreError> {
        self.load_details_inner(decision_id).map_err(StoreError::from)
    }

    fn list_decisions(&self, query: &DecisionQuery) -> Result<DecisionPage, StoreError> {
        self.list_inner(query).map_err(StoreError::from)
    }

    fn overdue_decisions(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        limit: usize,
    ) -> Result<Vec<Decision>, StoreError> {
        self.overdue_inner(now, after, limit).map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn
            .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get::<_, i64>(0))
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(())
    }
}

impl EventOutbox for SqliteDecisionStore {
    fn pending_events(&self, now: Timestamp, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        self.pending_inner(now, limit).map_err(StoreError::from)
    }

    fn mark_delivered(
        &self,
        event_id: &EventId,
        delivered_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.update_outbox(
            event_id,
            "UPDATE outbox SET delivered_at = COALESCE(delivered_at, ?2) WHERE event_id = ?1",
            &[&delivered_at.as_unix_millis()],
        )
        .map_err(StoreError::from)
    }

    fn record_failure(
        &self,
        event_id: &EventId,
        error: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.update_outbox(
            event_id,
            "UPDATE outbox SET attempts = attempts + 1, next_attempt_at = ?2, last_error = ?3 \
             WHERE event_id = ?1",
            &[&next_attempt_at.as_unix_millis(), &error],
        )
        .map_err(StoreError::from)
    }

    fn decision_events(&self, decision_id: &DecisionId) -> Result<Vec<OutboxEntry>, StoreError> {
        self.decision_events_inner(decision_id).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Raw decision row as read from `SQLite`.
struct DecisionRow {
    /// Decision identifier.
    decision_id: String,
    /// Tenant.
    org_id: String,
    /// Execution identifier.
    execution_id: String,
    /// Flow identifier.
    flow_id: String,
    /// Node identifier.
    node_id: String,
    /// Status label.
    status: String,
    /// Language tag.
    language: String,
    /// Signals as JSON.
    signals_json: String,
    /// Trace identifier.
    trace_id: String,
    /// Resume token.
    resume_token: Option<String>,
    /// Creation time (ms).
    created_at: i64,
    /// Last update time (ms).
    updated_at: i64,
    /// SLA deadline (ms).
    expires_at: Option<i64>,
    /// Row version.
    version: i64,
}

impl DecisionRow {
    /// Reads a row selected with [`DECISION_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            decision_id: row.get(0)?,
            org_id: row.get(1)?,
            execution_id: row.get(2)?,
            flow_id: row.get(3)?,
            node_id: row.get(4)?,
            status: row.get(5)?,
            language: row.get(6)?,
            signals_json: row.get(7)?,
            trace_id: row.get(8)?,
            resume_token: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            expires_at: row.get(12)?,
            version: row.get(13)?,
        })
    }

    /// Converts the raw row into a decision, failing closed on bad data.
    fn into_decision(self) -> Result<Decision, SqliteStoreError> {
        let status = self.status.parse::<DecisionStatus>().map_err(|err| {
            SqliteStoreError::Corrupt(format!("decision {}: {err}", self.decision_id))
        })?;
        let signals: DecisionSignals = serde_json::from_str(&self.signals_json)
            .map_err(|err| SqliteStoreError::Corrupt(format!("decision signals: {err}")))?;
        let version = u64::try_from(self.version).map_err(|_| {
            SqliteStoreError::Corrupt(format!("negative version for {}", self.decision_id))
        })?;
        Ok(Decision {
            decision_id: DecisionId::new(self.decision_id),
            org_id: self.org_id.into(),
            execution_id: self.execution_id.into(),
            flow_id: self.flow_id.into(),
            node_id: self.node_id.into(),
            status,
            language: self.language,
            signals,
            trace_id: self.trace_id.into(),
            resume_token: self.resume_token,
            created_at: Timestamp::from_unix_millis(self.created_at),
            updated_at: Timestamp::from_unix_millis(self.updated_at),
            expires_at: self.expires_at.map(Timestamp::from_unix_millis),
            version,
        })
    }
}

/// Raw outbox row as read from `SQLite`.
struct OutboxRow {
    /// Per-decision sequence.
    sequence: i64,
    /// Event JSON.
    event_json: Vec<u8>,
    /// Event hash.
    event_hash: String,
    /// Failed attempts.
    attempts: i64,
    /// Next attempt time (ms).
    next_attempt_at: i64,
    /// Last transport error.
    last_error: Option<String>,
    /// Delivery time (ms).
    delivered_at: Option<i64>,
}

impl OutboxRow {
    /// Reads a row selected with [`OUTBOX_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sequence: row.get(0)?,
            event_json: row.get(1)?,
            event_hash: row.get(2)?,
            attempts: row.get(3)?,
            next_attempt_at: row.get(4)?,
            last_error: row.get(5)?,
            delivered_at: row.get(6)?,
        })
    }

    /// Converts the raw row into an outbox entry.
    fn into_entry(self) -> Result<OutboxEntry, SqliteStoreError> {
        let event: DecisionEvent = decode_record(&self.event_json, &self.event_hash, "event")?;
        Ok(OutboxEntry {
            sequence: u64::try_from(self.sequence)
                .map_err(|_| SqliteStoreError::Corrupt("negative outbox sequence".to_string()))?,
            event,
            attempts: u32::try_from(self.attempts).unwrap_or(u32::MAX),
            next_attempt_at: Timestamp::from_unix_millis(self.next_attempt_at),
            last_error: self.last_error,
            delivered_at: self.delivered_at.map(Timestamp::from_unix_millis),
        })
    }
}

// ============================================================================
// SECTION: Transaction Helpers
// ============================================================================

/// Finds the open decision for a correlation key.
fn find_open_in(
    tx: &Transaction<'_>,
    key: &CorrelationKey,
) -> Result<Option<Decision>, SqliteStoreError> {
    let row = tx
        .query_row(
            &format!(
                "SELECT {DECISION_COLUMNS} FROM decisions WHERE org_id = ?1 AND execution_id = ?2 \
                 AND node_id = ?3 AND status != ?4"
            ),
            params![
                key.org_id.as_str(),
                key.execution_id.as_str(),
                key.node_id.as_str(),
                DecisionStatus::Executed.as_str()
            ],
            DecisionRow::from_row,
        )
        .optional()?;
    row.map(DecisionRow::into_decision).transpose()
}

/// Loads one decision row.
fn load_decision_in(
    tx: &Transaction<'_>,
    decision_id: &DecisionId,
) -> Result<Option<Decision>, SqliteStoreError> {
    let row = tx
        .query_row(
            &format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE decision_id = ?1"),
            params![decision_id.as_str()],
            DecisionRow::from_row,
        )
        .optional()?;
    row.map(DecisionRow::into_decision).transpose()
}

/// Inserts a policy snapshot row.
fn insert_snapshot(tx: &Transaction<'_>, snapshot: &PolicySnapshot) -> Result<(), SqliteStoreError> {
    let (bytes, hash) = encode_record(snapshot)?;
    tx.execute(
        "INSERT INTO policy_snapshots (snapshot_id, decision_id, snapshot_json, snapshot_hash, \
         created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot.snapshot_id.as_str(),
            snapshot.decision_id.as_str(),
            bytes,
            hash,
            snapshot.created_at.as_unix_millis()
        ],
    )?;
    Ok(())
}

/// Inserts an action row.
fn insert_action(tx: &Transaction<'_>, action: &DecisionAction) -> Result<(), SqliteStoreError> {
    let (bytes, hash) = encode_record(action)?;
    tx.execute(
        "INSERT INTO actions (action_id, decision_id, action_json, action_hash, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            action.action_id.as_str(),
            action.decision_id.as_str(),
            bytes,
            hash,
            action.created_at.as_unix_millis()
        ],
    )?;
    Ok(())
}

/// Appends events to a decision's outbox with consecutive sequences.
fn append_events(
    tx: &Transaction<'_>,
    decision_id: &DecisionId,
    events: &[DecisionEvent],
) -> Result<(), SqliteStoreError> {
    let mut sequence: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sequence), 0) FROM outbox WHERE decision_id = ?1",
        params![decision_id.as_str()],
        |row| row.get(0),
    )?;
    for event in events {
        if &event.decision_id != decision_id {
            return Err(SqliteStoreError::Invalid(format!(
                "event {} belongs to decision {}",
                event.event_id, event.decision_id
            )));
        }
        sequence += 1;
        let (bytes, hash) = encode_record(event)?;
        let occurred_at = event.occurred_at.as_unix_millis();
        tx.execute(
            "INSERT INTO outbox (event_id, decision_id, sequence, event_json, event_hash, \
             occurred_at, attempts, next_attempt_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?6)",
            params![
                event.event_id.as_str(),
                decision_id.as_str(),
                sequence,
                bytes,
                hash,
                occurred_at
            ],
        )?;
    }
    Ok(())
}

/// Loads hashed JSON records for a decision.
fn load_records<T: DeserializeOwned>(
    tx: &Transaction<'_>,
    sql: &str,
    decision_id: &DecisionId,
    what: &str,
) -> Result<Vec<T>, SqliteStoreError> {
    let mut statement = tx.prepare(sql)?;
    let rows = statement
        .query_map(params![decision_id.as_str()], |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.iter().map(|(bytes, hash)| decode_record(bytes, hash, what)).collect()
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Serializes a record as canonical JSON with its content hash.
fn encode_record<T: Serialize>(value: &T) -> Result<(Vec<u8>, String), SqliteStoreError> {
    let bytes =
        canonical_json_bytes(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
    Ok((bytes, digest.value))
}

/// Verifies and deserializes a stored record.
fn decode_record<T: DeserializeOwned>(
    bytes: &[u8],
    hash: &str,
    what: &str,
) -> Result<T, SqliteStoreError> {
    if bytes.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let expected = hash_bytes(DEFAULT_HASH_ALGORITHM, bytes);
    if !digests_match(&expected.value, hash) {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for stored {what}")));
    }
    serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Serializes decision signals.
fn encode_signals(signals: &DecisionSignals) -> Result<String, SqliteStoreError> {
    serde_json::to_string(signals).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Converts an unsigned count into an `SQLite` integer.
fn to_i64<T>(value: T, field: &str) -> Result<i64, SqliteStoreError>
where
    i64: TryFrom<T>,
{
    i64::try_from(value).map_err(|_| SqliteStoreError::Invalid(format!("{field} out of range")))
}

// ============================================================================
// SECTION: Setup
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS decisions (
                    row_seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    decision_id TEXT NOT NULL UNIQUE,
                    org_id TEXT NOT NULL,
                    execution_id TEXT NOT NULL,
                    flow_id TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    language TEXT NOT NULL,
                    signals_json TEXT NOT NULL,
                    trace_id TEXT NOT NULL,
                    resume_token TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    expires_at INTEGER,
                    version INTEGER NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_decisions_open_key
                    ON decisions (org_id, execution_id, node_id) WHERE status != 'executed';
                CREATE INDEX IF NOT EXISTS idx_decisions_status_created
                    ON decisions (status, created_at);
                CREATE INDEX IF NOT EXISTS idx_decisions_expiry
                    ON decisions (status, expires_at);
                CREATE TABLE IF NOT EXISTS recommendations (
                    decision_id TEXT PRIMARY KEY,
                    recommendation_json BLOB NOT NULL,
                    recommendation_hash TEXT NOT NULL,
                    FOREIGN KEY (decision_id) REFERENCES decisions(decision_id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS policy_snapshots (
                    snapshot_seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    snapshot_id TEXT NOT NULL UNIQUE,
                    decision_id TEXT NOT NULL,
                    snapshot_json BLOB NOT NULL,
                    snapshot_hash TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    FOREIGN KEY (decision_id) REFERENCES decisions(decision_id) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_policy_snapshots_decision
                    ON policy_snapshots (decision_id);
                CREATE TABLE IF NOT EXISTS actions (
                    action_seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    action_id TEXT NOT NULL UNIQUE,
                    decision_id TEXT NOT NULL,
                    action_json BLOB NOT NULL,
                    action_hash TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    FOREIGN KEY (decision_id) REFERENCES decisions(decision_id) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_actions_decision ON actions (decision_id);
                CREATE TABLE IF NOT EXISTS outbox (
                    outbox_seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_id TEXT NOT NULL UNIQUE,
                    decision_id TEXT NOT NULL,
                    sequence INTEGER NOT NULL,
                    event_json BLOB NOT NULL,
                    event_hash TEXT NOT NULL,
                    occurred_at INTEGER NOT NULL,
                    attempts INTEGER NOT NULL,
                    next_attempt_at INTEGER NOT NULL,
                    last_error TEXT,
                    delivered_at INTEGER,
                    UNIQUE (decision_id, sequence),
                    FOREIGN KEY (decision_id) REFERENCES decisions(decision_id) ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS idx_outbox_undelivered
                    ON outbox (delivered_at, next_attempt_at);",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}
