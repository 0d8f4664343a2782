// crates/dcp-server/src/server.rs
// ============================================================================
// Module: Decision Control Plane Server
// Description: Wires configuration into the engine, API, and workers.
// Purpose: Build and run the HTTP service with its background tasks.
// Dependencies: axum, dcp-broker, dcp-config, dcp-core, dcp-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! [`DcpServer::from_config`] builds the store, policy registry, engine,
//! audit sink, and event sink from a validated [`DcpConfig`]. A policy load
//! failure at startup does not prevent serving: the registry starts
//! deactivated so reads keep working until a reload succeeds.
//! Metrics and the per-client rate limiter are attached to the handler state
//! when enabled in `[server]`. [`DcpServer::serve`] binds the listener,
//! starts the expiry and dispatch workers, and runs until Ctrl+C.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use dcp_broker::BackoffPolicy;
use dcp_broker::LogSink;
use dcp_broker::OutboxDispatcher;
use dcp_broker::Sink;
use dcp_broker::WebhookSink;
use dcp_config::DcpConfig;
use dcp_config::EventSinkType;
use dcp_config::StoreType;
use dcp_core::DecisionEngine;
use dcp_core::InMemoryDecisionStore;
use dcp_core::PolicyRegistry;
use dcp_core::SharedDecisionStore;
use dcp_store_sqlite::SqliteDecisionStore;
use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::api::AppState;
use crate::api::Clock;
use crate::api::Engine;
use crate::api::PolicyLoader;
use crate::api::router;
use crate::api::system_now;
use crate::audit::AuditSink;
use crate::audit::audit_sink_from_config;
use crate::metrics::ServiceMetrics;
use crate::rate_limit::RateLimiter;
use crate::workers::spawn_dispatch_worker;
use crate::workers::spawn_expiry_worker;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Decision control plane server instance.
pub struct DcpServer {
    /// Validated configuration.
    config: DcpConfig,
    /// Handler state shared with the workers.
    state: AppState,
    /// Outbox dispatcher.
    dispatcher: Arc<OutboxDispatcher<SharedDecisionStore>>,
    /// Audit destination.
    audit: Arc<dyn AuditSink>,
    /// Wall clock.
    clock: Clock,
}

impl DcpServer {
    /// Builds a server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid or a backend
    /// cannot be initialized.
    pub fn from_config(mut config: DcpConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let store = build_store(&config)?;
        let sink = build_sink(&config)?;
        let audit = audit_sink_from_config(&config.logging.audit, |path| config.resolve_path(path))
            .map_err(|err| ServerError::Init(format!("audit sink: {err}")))?;
        Self::with_components(config, store, sink, audit)
    }

    /// Builds a server from configuration and pre-built backends.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Init`] when metrics cannot be registered.
    pub fn with_components(
        config: DcpConfig,
        store: SharedDecisionStore,
        sink: Arc<dyn Sink>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ServerError> {
        let registry = PolicyRegistry::from_load(config.policy_catalog());
        if let Err(err) = registry.current() {
            warn!(error = %err, "policy catalog unavailable at startup; gate creation disabled");
        }
        let engine: Arc<Engine> =
            Arc::new(DecisionEngine::new(store.clone(), Arc::new(registry), config.engine_config()));
        let loader_config = config.clone();
        let policy_loader: PolicyLoader = Arc::new(move || loader_config.policy_catalog());
        let clock: Clock = Arc::new(system_now);
        let mut state = AppState::new(engine, Arc::clone(&audit), policy_loader)
            .with_request_timeout(Duration::from_millis(config.server.request_timeout_ms))
            .with_clock(Arc::clone(&clock));
        if config.server.metrics_enabled {
            let metrics =
                ServiceMetrics::new().map_err(|err| ServerError::Init(format!("metrics: {err}")))?;
            state = state.with_metrics(Arc::new(metrics));
        }
        if config.server.rate_limit.enabled {
            let limiter = RateLimiter::from_config(&config.server.rate_limit);
            state = state.with_rate_limiter(Arc::new(limiter));
        }
        let dispatcher = OutboxDispatcher::new(store, sink, config.events.source.clone())
            .with_batch_size(config.events.batch_size)
            .with_backoff(BackoffPolicy {
                initial_ms: config.events.backoff_initial_ms,
                max_ms: config.events.backoff_max_ms,
            });
        Ok(Self {
            config,
            state,
            dispatcher: Arc::new(dispatcher),
            audit,
            clock,
        })
    }

    /// Returns the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone(), &self.config.server.api_prefix, self.config.server.max_body_bytes)
    }

    /// Returns the handler state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Returns the outbox dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<OutboxDispatcher<SharedDecisionStore>> {
        &self.dispatcher
    }

    /// Serves requests until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("bind {addr} failed: {err}")))?;

        let mut workers = Vec::new();
        if self.config.expiry.enabled {
            workers.push(spawn_expiry_worker(
                Arc::clone(self.state.engine()),
                Arc::clone(&self.audit),
                Arc::clone(&self.clock),
                self.state.metrics().cloned(),
                Duration::from_secs(self.config.expiry.interval_seconds),
            ));
        }
        workers.push(spawn_dispatch_worker(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.clock),
            self.state.metrics().cloned(),
            Duration::from_millis(self.config.events.dispatch_interval_ms),
        ));

        info!(%addr, prefix = %self.config.server.api_prefix, "decision control plane listening");
        let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")));
        for worker in workers {
            worker.abort();
        }
        info!("decision control plane stopped");
        result
    }
}

/// Resolves when the process receives Ctrl+C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Builds the decision store from configuration.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the `SQLite` store cannot be opened.
pub fn build_store(config: &DcpConfig) -> Result<SharedDecisionStore, ServerError> {
    let store = match config.store.store_type {
        StoreType::Memory => SharedDecisionStore::from_store(InMemoryDecisionStore::new()),
        StoreType::Sqlite => {
            let sqlite_config = config
                .sqlite_store_config()
                .ok_or_else(|| ServerError::Config("sqlite store requires path".to_string()))?;
            let store = SqliteDecisionStore::new(sqlite_config)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            SharedDecisionStore::from_store(store)
        }
    };
    Ok(store)
}

/// Builds the event sink from configuration.
///
/// # Errors
///
/// Returns [`ServerError`] when the log file cannot be opened, the webhook
/// secret is missing, or the webhook client cannot be built.
pub fn build_sink(config: &DcpConfig) -> Result<Arc<dyn Sink>, ServerError> {
    let sink_config = &config.events.sink;
    match sink_config.sink_type {
        EventSinkType::Log => match &sink_config.log_path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(config.resolve_path(path))
                    .map_err(|err| ServerError::Init(format!("event log: {err}")))?;
                Ok(Arc::new(LogSink::new(file)))
            }
            None => Ok(Arc::new(LogSink::new(io::stdout()))),
        },
        EventSinkType::Webhook => {
            let url = sink_config
                .url
                .as_deref()
                .ok_or_else(|| ServerError::Config("webhook sink requires url".to_string()))?;
            let secret =
                sink_config.webhook_secret().map_err(|err| ServerError::Config(err.to_string()))?;
            let sink =
                WebhookSink::new(url, secret, Duration::from_millis(sink_config.timeout_ms))
                    .map_err(|err| ServerError::Init(err.to_string()))?;
            Ok(Arc::new(sink))
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
