// crates/dcp-config/tests/section_validation.rs
// ============================================================================
// Module: Config Section Validation Tests
// Description: Validate defaults and per-section constraints.
// Purpose: Ensure every section rejects out-of-range values.
// Dependencies: dcp-config, dcp-core
// ============================================================================

//! ## Overview
//! Section tests parse inline TOML and assert on the validation message.

mod common;

use dcp_config::DcpConfig;
use dcp_config::EventSinkType;
use dcp_config::LogFormat;
use dcp_config::StoreType;

use crate::common::TestResult;
use crate::common::assert_invalid;
use crate::common::config_from_toml;

/// Verifies an empty document yields the documented defaults.
#[test]
fn empty_config_uses_defaults() -> TestResult {
    let config = config_from_toml("").map_err(|err| err.to_string())?;
    let checks = [
        (config.server.bind == "127.0.0.1:8000", "server.bind"),
        (config.server.api_prefix == "/api/v2/dcp", "server.api_prefix"),
        (config.server.request_timeout_ms == 10_000, "server.request_timeout_ms"),
        (config.server.max_body_bytes == 1024 * 1024, "server.max_body_bytes"),
        (config.server.metrics_enabled, "server.metrics_enabled"),
        (config.server.rate_limit.enabled, "server.rate_limit.enabled"),
        (config.server.rate_limit.requests == 200, "server.rate_limit.requests"),
        (config.server.rate_limit.window_seconds == 60, "server.rate_limit.window_seconds"),
        (config.store.store_type == StoreType::Memory, "store.type"),
        (config.store.max_connections == 8, "store.max_connections"),
        (config.policy.path.is_none(), "policy.path"),
        (config.gates.default_org_id == "default", "gates.default_org_id"),
        (config.expiry.enabled && config.expiry.interval_seconds == 60, "expiry"),
        (config.events.source == "dcp", "events.source"),
        (config.events.backoff_initial_ms == 500, "events.backoff_initial_ms"),
        (config.events.backoff_max_ms == 60_000, "events.backoff_max_ms"),
        (config.events.sink.sink_type == EventSinkType::Log, "events.sink.type"),
        (config.events.sink.secret_env == "DCP_WEBHOOK_SECRET", "events.sink.secret_env"),
        (config.logging.level == "info", "logging.level"),
        (config.logging.format == LogFormat::Text, "logging.format"),
        (config.logging.audit.enabled, "logging.audit.enabled"),
        (config.sqlite_store_config().is_none(), "sqlite config"),
    ];
    for (ok, field) in checks {
        if !ok {
            return Err(format!("unexpected default for {field}"));
        }
    }
    Ok(())
}

/// Verifies defaults flow into the engine settings.
#[test]
fn engine_config_reflects_gate_and_expiry_sections() -> TestResult {
    let config = config_from_toml(
        "[gates]\ndefault_org_id = \"acme\"\ndefault_sla_seconds = 900\n\n[expiry]\nbatch_size = 7\n",
    )
    .map_err(|err| err.to_string())?;
    let engine = config.engine_config();
    if engine.default_org_id.as_str() != "acme"
        || engine.default_sla_seconds != Some(900)
        || engine.expiry_batch_size != 7
    {
        return Err("engine config does not mirror sections".to_string());
    }
    Ok(())
}

/// Verifies the built-in ruleset is used when no policy path is set.
#[test]
fn default_policy_catalog_is_builtin() -> TestResult {
    let config = DcpConfig::default();
    let catalog = config.policy_catalog().map_err(|err| err.to_string())?;
    let ruleset = catalog.resolve(&config.gates.org_id(), "en");
    if ruleset.version() != "2.0.0" {
        return Err(format!("unexpected builtin version {}", ruleset.version()));
    }
    Ok(())
}

/// Verifies server constraints.
#[test]
fn server_section_rejects_invalid_values() -> TestResult {
    assert_invalid(config_from_toml("[server]\nbind = \"localhost\"\n"), "server.bind")?;
    assert_invalid(config_from_toml("[server]\napi_prefix = \"api\"\n"), "server.api_prefix")?;
    assert_invalid(config_from_toml("[server]\napi_prefix = \"/api/\"\n"), "server.api_prefix")?;
    assert_invalid(
        config_from_toml("[server]\nrequest_timeout_ms = 0\n"),
        "server.request_timeout_ms",
    )?;
    assert_invalid(config_from_toml("[server]\nmax_body_bytes = 0\n"), "server.max_body_bytes")?;
    assert_invalid(
        config_from_toml("[server.rate_limit]\nrequests = 0\n"),
        "server.rate_limit.requests",
    )?;
    assert_invalid(
        config_from_toml("[server.rate_limit]\nwindow_seconds = 0\n"),
        "server.rate_limit.window_seconds",
    )
}

/// Verifies store constraints.
#[test]
fn store_section_requires_consistent_backend() -> TestResult {
    assert_invalid(
        config_from_toml("[store]\ntype = \"sqlite\"\n"),
        "sqlite store requires store.path",
    )?;
    assert_invalid(
        config_from_toml("[store]\ntype = \"memory\"\npath = \"dcp.sqlite\"\n"),
        "memory store does not accept store.path",
    )?;
    assert_invalid(
        config_from_toml("[store]\nmax_connections = 0\n"),
        "store.max_connections",
    )?;
    assert_invalid(
        config_from_toml("[store]\nmax_connections = 65\n"),
        "store.max_connections",
    )?;
    let config = config_from_toml(
        "[store]\ntype = \"sqlite\"\npath = \"dcp.sqlite\"\njournal_mode = \"delete\"\nsync_mode = \"normal\"\nmax_connections = 4\n",
    )
    .map_err(|err| err.to_string())?;
    let sqlite = config.sqlite_store_config().ok_or("missing sqlite config")?;
    if sqlite.journal_mode.pragma_value() != "delete" || sqlite.sync_mode.pragma_value() != "normal"
    {
        return Err("sqlite modes not carried through".to_string());
    }
    if sqlite.max_connections != 4 {
        return Err("sqlite pool size not carried through".to_string());
    }
    Ok(())
}

/// Verifies policy override selectors are validated.
#[test]
fn policy_section_rejects_bad_overrides() -> TestResult {
    assert_invalid(
        config_from_toml("[[policy.overrides]]\npath = \"a.json\"\n"),
        "require org_id or language",
    )?;
    assert_invalid(
        config_from_toml("[[policy.overrides]]\norg_id = \"bad id\"\npath = \"a.json\"\n"),
        "policy.overrides.org_id",
    )?;
    assert_invalid(
        config_from_toml("[[policy.overrides]]\nlanguage = \"x\"\npath = \"a.json\"\n"),
        "language",
    )
}

/// Verifies gate defaults are validated.
#[test]
fn gates_section_rejects_invalid_values() -> TestResult {
    assert_invalid(config_from_toml("[gates]\ndefault_org_id = \"\"\n"), "gates.default_org_id")?;
    assert_invalid(
        config_from_toml("[gates]\ndefault_sla_seconds = 0\n"),
        "gates.default_sla_seconds",
    )
}

/// Verifies worker intervals and batch sizes are validated.
#[test]
fn worker_sections_reject_zero_values() -> TestResult {
    assert_invalid(config_from_toml("[expiry]\ninterval_seconds = 0\n"), "expiry.interval_seconds")?;
    assert_invalid(config_from_toml("[expiry]\nbatch_size = 0\n"), "expiry.batch_size")?;
    assert_invalid(
        config_from_toml("[events]\ndispatch_interval_ms = 0\n"),
        "events.dispatch_interval_ms",
    )?;
    assert_invalid(config_from_toml("[events]\nbatch_size = 20000\n"), "events.batch_size")
}

/// Verifies backoff bounds must be ordered.
#[test]
fn events_section_rejects_inverted_backoff() -> TestResult {
    assert_invalid(
        config_from_toml("[events]\nbackoff_initial_ms = 5000\nbackoff_max_ms = 100\n"),
        "events.backoff_initial_ms",
    )?;
    assert_invalid(config_from_toml("[events]\nsource = \" \"\n"), "events.source")
}

/// Verifies webhook sinks require a usable endpoint.
#[test]
fn webhook_sink_requires_http_url() -> TestResult {
    assert_invalid(
        config_from_toml("[events.sink]\ntype = \"webhook\"\n"),
        "webhook sink requires events.sink.url",
    )?;
    assert_invalid(
        config_from_toml("[events.sink]\ntype = \"webhook\"\nurl = \"ftp://example.com\"\n"),
        "http or https",
    )?;
    assert_invalid(
        config_from_toml("[events.sink]\ntype = \"webhook\"\nurl = \"not a url\"\n"),
        "events.sink.url",
    )?;
    let config = config_from_toml(
        "[events.sink]\ntype = \"webhook\"\nurl = \"https://hooks.example.com/dcp\"\nsecret_env = \"DCP_TEST_SECRET_NEVER_SET\"\n",
    )
    .map_err(|err| err.to_string())?;
    match config.events.sink.webhook_secret() {
        Err(error) if error.to_string().contains("DCP_TEST_SECRET_NEVER_SET") => Ok(()),
        Err(error) => Err(format!("unexpected error {error}")),
        Ok(_) => Err("expected missing secret".to_string()),
    }
}

/// Verifies logging levels and formats are validated.
#[test]
fn logging_section_validates_level_and_format() -> TestResult {
    assert_invalid(config_from_toml("[logging]\nlevel = \"loud\"\n"), "logging.level")?;
    assert_invalid(config_from_toml("[logging]\nformat = \"xml\"\n"), "config parse error")?;
    let config = config_from_toml("[logging]\nlevel = \"WARN\"\nformat = \"json\"\n")
        .map_err(|err| err.to_string())?;
    if config.logging.format != LogFormat::Json {
        return Err("expected json format".to_string());
    }
    Ok(())
}
