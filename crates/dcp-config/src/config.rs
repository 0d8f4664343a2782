// crates/dcp-config/src/config.rs
// ============================================================================
// Module: Decision Control Plane Configuration
// Description: Configuration loading and validation for dcp.toml.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: dcp-core, dcp-store-sqlite, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from an explicit argument, then `DCP_CONFIG`, then
//! `dcp.toml` in the working directory. Only the implicit default may be
//! absent; an absent default yields the built-in defaults.
//! Security posture: config inputs are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use dcp_core::DEFAULT_ORG_ID;
use dcp_core::EngineConfig;
use dcp_core::OrgId;
use dcp_core::PolicyCatalog;
use dcp_core::PolicyError;
use dcp_core::Ruleset;
use dcp_core::validation::validate_identifier;
use dcp_core::validation::validate_language;
use dcp_store_sqlite::SqliteStoreConfig;
use dcp_store_sqlite::SqliteStoreMode;
use dcp_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "dcp.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "DCP_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum accepted request body limit.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Maximum request timeout in milliseconds.
pub(crate) const MAX_REQUEST_TIMEOUT_MS: u64 = 300_000;
/// Maximum number of policy overrides.
pub(crate) const MAX_POLICY_OVERRIDES: usize = 256;
/// Maximum batch size for background workers.
pub(crate) const MAX_BATCH_SIZE: usize = 10_000;
/// Maximum requests per rate limit window.
pub(crate) const MAX_RATE_LIMIT_REQUESTS: u32 = 1_000_000;
/// Maximum rate limit window length.
pub(crate) const MAX_RATE_LIMIT_WINDOW_SECONDS: u64 = 86_400;
/// Maximum pooled store connections.
pub(crate) const MAX_STORE_CONNECTIONS: u32 = 64;
/// Maximum webhook timeout in milliseconds.
pub(crate) const MAX_WEBHOOK_TIMEOUT_MS: u64 = 60_000;
/// Log levels accepted by `[logging].level`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Root Configuration
// ============================================================================

/// Decision control plane configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DcpConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Decision store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Policy ruleset configuration.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Gate creation defaults.
    #[serde(default)]
    pub gates: GatesConfig,
    /// Expiry supervisor configuration.
    #[serde(default)]
    pub expiry: ExpiryConfig,
    /// Event dispatch configuration.
    #[serde(default)]
    pub events: EventsConfig,
    /// Logging and audit configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Directory relative paths resolve against (not serialized).
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl DcpConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path)?;
        validate_path(&resolved)?;
        if !explicit && !resolved.exists() {
            let mut config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.base_dir = resolved.parent().map(Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration text without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is malformed.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.policy.validate()?;
        self.gates.validate()?;
        self.expiry.validate()?;
        self.events.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Resolves a configured path against the config file directory.
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() && !base.as_os_str().is_empty() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Loads the configured policy catalog from disk.
    ///
    /// The built-in ruleset is the default when `policy.path` is omitted.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when any ruleset fails to load or validate.
    pub fn policy_catalog(&self) -> Result<PolicyCatalog, PolicyError> {
        let mut catalog = match &self.policy.path {
            Some(path) => PolicyCatalog::new(Ruleset::load(&self.resolve_path(path))?),
            None => PolicyCatalog::builtin()?,
        };
        for entry in &self.policy.overrides {
            let ruleset = Ruleset::load(&self.resolve_path(&entry.path))?;
            catalog = catalog.with_override(
                entry.org_id.as_deref().map(OrgId::new),
                entry.language.clone(),
                ruleset,
            )?;
        }
        Ok(catalog)
    }

    /// Returns the engine settings derived from `[gates]` and `[expiry]`.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_org_id: self.gates.org_id(),
            default_sla_seconds: self.gates.default_sla_seconds,
            expiry_batch_size: self.expiry.batch_size,
        }
    }

    /// Builds the `SQLite` store configuration, if the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_store_config(&self) -> Option<SqliteStoreConfig> {
        if self.store.store_type != StoreType::Sqlite {
            return None;
        }
        let path = self.store.path.as_ref()?;
        Some(SqliteStoreConfig {
            path: self.resolve_path(path),
            busy_timeout_ms: self.store.busy_timeout_ms,
            max_connections: self.store.max_connections,
            journal_mode: self.store.journal_mode,
            sync_mode: self.store.sync_mode,
        })
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path prefix for decision routes.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Per-request deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Serve Prometheus metrics on `/metrics`.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Per-client request rate limit.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_prefix: default_api_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            metrics_enabled: true,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Fixed-window rate limit applied per client to decision routes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Whether requests are limited.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Requests allowed per client in one window.
    #[serde(default = "default_rate_limit_requests")]
    pub requests: u32,
    /// Window length in seconds.
    #[serde(default = "default_rate_limit_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: default_rate_limit_requests(),
            window_seconds: default_rate_limit_window_seconds(),
        }
    }
}

impl RateLimitConfig {
    /// Validates rate limit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.requests == 0 || self.requests > MAX_RATE_LIMIT_REQUESTS {
            return Err(ConfigError::Invalid(format!(
                "server.rate_limit.requests must be between 1 and {MAX_RATE_LIMIT_REQUESTS}"
            )));
        }
        if self.window_seconds == 0 || self.window_seconds > MAX_RATE_LIMIT_WINDOW_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "server.rate_limit.window_seconds must be between 1 and \
                 {MAX_RATE_LIMIT_WINDOW_SECONDS}"
            )));
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.bind)))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        let prefix = self.api_prefix.trim();
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(ConfigError::Invalid(
                "server.api_prefix must start with '/' and not end with '/'".to_string(),
            ));
        }
        if prefix.chars().any(|ch| ch.is_whitespace() || ch == '{' || ch == '}') {
            return Err(ConfigError::Invalid(
                "server.api_prefix contains invalid characters".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 || self.request_timeout_ms > MAX_REQUEST_TIMEOUT_MS {
            return Err(ConfigError::Invalid("server.request_timeout_ms out of range".to_string()));
        }
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid("server.max_body_bytes out of range".to_string()));
        }
        self.rate_limit.validate()
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Decision store backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store (non-durable).
    #[default]
    Memory,
    /// `SQLite`-backed store.
    Sqlite,
}

/// Decision store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Maximum pooled `SQLite` connections.
    #[serde(default = "default_store_max_connections")]
    pub max_connections: u32,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            max_connections: default_store_max_connections(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 || self.max_connections > MAX_STORE_CONNECTIONS {
            return Err(ConfigError::Invalid(format!(
                "store.max_connections must be between 1 and {MAX_STORE_CONNECTIONS}"
            )));
        }
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory store does not accept store.path".to_string(),
                    ));
                }
            }
            StoreType::Sqlite => {
                let Some(path) = &self.path else {
                    return Err(ConfigError::Invalid("sqlite store requires store.path".to_string()));
                };
                validate_path_string("store.path", &path.to_string_lossy())?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Policy ruleset configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Default ruleset path; the built-in ruleset applies when omitted.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Tenant- or language-specific rulesets.
    #[serde(default)]
    pub overrides: Vec<PolicyOverrideConfig>,
}

/// One ruleset override.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyOverrideConfig {
    /// Tenant selector.
    #[serde(default)]
    pub org_id: Option<String>,
    /// Language selector.
    #[serde(default)]
    pub language: Option<String>,
    /// Ruleset path.
    pub path: PathBuf,
}

impl PolicyConfig {
    /// Validates policy configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("policy.path", &path.to_string_lossy())?;
        }
        if self.overrides.len() > MAX_POLICY_OVERRIDES {
            return Err(ConfigError::Invalid("too many policy.overrides entries".to_string()));
        }
        for entry in &self.overrides {
            if entry.org_id.is_none() && entry.language.is_none() {
                return Err(ConfigError::Invalid(
                    "policy.overrides entries require org_id or language".to_string(),
                ));
            }
            if let Some(org_id) = &entry.org_id {
                validate_identifier("policy.overrides.org_id", org_id)
                    .map_err(|err| ConfigError::Invalid(err.to_string()))?;
            }
            if let Some(language) = &entry.language {
                validate_language(language).map_err(|err| ConfigError::Invalid(err.to_string()))?;
            }
            validate_path_string("policy.overrides.path", &entry.path.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Gates
// ============================================================================

/// Gate creation defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GatesConfig {
    /// Tenant applied when a request names none.
    #[serde(default = "default_org_id")]
    pub default_org_id: String,
    /// SLA applied when a human-review request names no deadline.
    #[serde(default)]
    pub default_sla_seconds: Option<u64>,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            default_org_id: default_org_id(),
            default_sla_seconds: None,
        }
    }
}

impl GatesConfig {
    /// Returns the default tenant.
    #[must_use]
    pub fn org_id(&self) -> OrgId {
        OrgId::new(self.default_org_id.trim())
    }

    /// Validates gate defaults.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("gates.default_org_id", self.default_org_id.trim())
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if self.default_sla_seconds == Some(0) {
            return Err(ConfigError::Invalid(
                "gates.default_sla_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Expiry
// ============================================================================

/// Expiry supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExpiryConfig {
    /// Whether the background scan runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between scans.
    #[serde(default = "default_expiry_interval_seconds")]
    pub interval_seconds: u64,
    /// Decisions processed per scan.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_expiry_interval_seconds(),
            batch_size: default_batch_size(),
        }
    }
}

impl ExpiryConfig {
    /// Validates expiry configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "expiry.interval_seconds must be greater than zero".to_string(),
            ));
        }
        validate_batch_size("expiry.batch_size", self.batch_size)
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Event dispatch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EventsConfig {
    /// CloudEvents `source` attribute.
    #[serde(default = "default_event_source")]
    pub source: String,
    /// Milliseconds between dispatch passes.
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    /// Events per dispatch pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// First retry delay in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    /// Retry delay ceiling in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Delivery transport.
    #[serde(default)]
    pub sink: EventSinkConfig,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            source: default_event_source(),
            dispatch_interval_ms: default_dispatch_interval_ms(),
            batch_size: default_batch_size(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            sink: EventSinkConfig::default(),
        }
    }
}

impl EventsConfig {
    /// Validates event configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::Invalid("events.source must be non-empty".to_string()));
        }
        if self.dispatch_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "events.dispatch_interval_ms must be greater than zero".to_string(),
            ));
        }
        validate_batch_size("events.batch_size", self.batch_size)?;
        if self.backoff_initial_ms == 0 || self.backoff_initial_ms > self.backoff_max_ms {
            return Err(ConfigError::Invalid(
                "events.backoff_initial_ms must be in 1..=backoff_max_ms".to_string(),
            ));
        }
        self.sink.validate()
    }
}

/// Event sink types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventSinkType {
    /// JSON-lines log sink.
    #[default]
    Log,
    /// Signed HTTP webhook sink.
    Webhook,
}

/// Event sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EventSinkConfig {
    /// Sink type.
    #[serde(rename = "type", default)]
    pub sink_type: EventSinkType,
    /// Webhook endpoint.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the webhook signing secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// Webhook request timeout in milliseconds.
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
    /// Log sink output file; stdout when omitted.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl Default for EventSinkConfig {
    fn default() -> Self {
        Self {
            sink_type: EventSinkType::default(),
            url: None,
            secret_env: default_secret_env(),
            timeout_ms: default_webhook_timeout_ms(),
            log_path: None,
        }
    }
}

impl EventSinkConfig {
    /// Reads the webhook signing secret from the configured variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the variable is unset or empty.
    pub fn webhook_secret(&self) -> Result<String, ConfigError> {
        match env::var(&self.secret_env) {
            Ok(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(ConfigError::Invalid(format!(
                "webhook secret variable {} is not set",
                self.secret_env
            ))),
        }
    }

    /// Validates sink configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.sink_type {
            EventSinkType::Log => {
                if let Some(path) = &self.log_path {
                    validate_path_string("events.sink.log_path", &path.to_string_lossy())?;
                }
            }
            EventSinkType::Webhook => {
                let Some(url) = &self.url else {
                    return Err(ConfigError::Invalid(
                        "webhook sink requires events.sink.url".to_string(),
                    ));
                };
                let parsed = Url::parse(url)
                    .map_err(|err| ConfigError::Invalid(format!("events.sink.url: {err}")))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ConfigError::Invalid(
                        "events.sink.url must use http or https".to_string(),
                    ));
                }
                if self.secret_env.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "events.sink.secret_env must be non-empty".to_string(),
                    ));
                }
                if self.timeout_ms == 0 || self.timeout_ms > MAX_WEBHOOK_TIMEOUT_MS {
                    return Err(ConfigError::Invalid(
                        "events.sink.timeout_ms out of range".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Operational log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON objects, one per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Audit record configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl LoggingConfig {
    /// Validates logging configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        self.audit.validate()
    }
}

/// Audit record configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Whether audit records are written.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Append-only audit file; stderr when omitted.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("logging.audit.path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Default route prefix.
fn default_api_prefix() -> String {
    "/api/v2/dcp".to_string()
}

/// Default request deadline.
const fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Default request body limit.
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default `SQLite` busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

/// Default requests per client and window.
const fn default_rate_limit_requests() -> u32 {
    200
}

/// Default rate limit window.
const fn default_rate_limit_window_seconds() -> u64 {
    60
}

/// Default `SQLite` connection pool size.
const fn default_store_max_connections() -> u32 {
    8
}

/// Default tenant.
fn default_org_id() -> String {
    DEFAULT_ORG_ID.to_string()
}

/// Default boolean for opt-out flags.
const fn default_true() -> bool {
    true
}

/// Default expiry scan interval.
const fn default_expiry_interval_seconds() -> u64 {
    60
}

/// Default worker batch size.
const fn default_batch_size() -> usize {
    100
}

/// Default CloudEvents source.
fn default_event_source() -> String {
    "dcp".to_string()
}

/// Default dispatch interval.
const fn default_dispatch_interval_ms() -> u64 {
    1_000
}

/// Default first retry delay.
const fn default_backoff_initial_ms() -> u64 {
    500
}

/// Default retry ceiling.
const fn default_backoff_max_ms() -> u64 {
    60_000
}

/// Default webhook secret variable.
fn default_secret_env() -> String {
    "DCP_WEBHOOK_SECRET".to_string()
}

/// Default webhook timeout.
const fn default_webhook_timeout_ms() -> u64 {
    5_000
}

/// Default log level.
fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path; returns whether it was named explicitly.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a worker batch size.
fn validate_batch_size(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_BATCH_SIZE {
        return Err(ConfigError::Invalid(format!("{field} must be in 1..={MAX_BATCH_SIZE}")));
    }
    Ok(())
}
