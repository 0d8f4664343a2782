// crates/dcp-server/src/telemetry.rs
// ============================================================================
// Module: Tracing Initialization
// Description: Installs the global tracing subscriber.
// Purpose: Route operational logs as text or JSON with an env-driven filter.
// Dependencies: dcp-config, tracing-subscriber
// ============================================================================

//! ## Overview
//! `RUST_LOG` takes precedence over `[logging].level`. Installing a second
//! subscriber is reported as an error rather than a panic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dcp_config::LogFormat;
use dcp_config::LoggingConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::server::ServerError;

// ============================================================================
// SECTION: Initialization
// ============================================================================

/// Builds the log filter from `RUST_LOG`, falling back to the configured level.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when neither source yields a valid filter.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ServerError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.trim().to_ascii_lowercase()))
        .map_err(|err| ServerError::Init(format!("invalid log filter: {err}")))
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the filter is invalid or a subscriber
/// is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ServerError> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => {
            registry.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).try_init()
        }
        LogFormat::Text => {
            registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).try_init()
        }
    };
    result.map_err(|err| ServerError::Init(format!("tracing init failed: {err}")))
}
