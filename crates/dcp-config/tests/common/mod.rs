// crates/dcp-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared fixtures for dcp.toml tests.
// Purpose: Write config and ruleset files and assert on failures.
// Dependencies: dcp-config, tempfile
// ============================================================================

//! ## Overview
//! Fixtures for config integration tests.

#![allow(dead_code, reason = "Helpers are shared across several test crates.")]

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use dcp_config::ConfigError;
use dcp_config::DcpConfig;

/// Result type used by config tests.
pub type TestResult = Result<(), String>;

/// Minimal valid ruleset document with the given version.
pub fn ruleset_json(version: &str) -> String {
    format!(
        r#"{{
  "version": "{version}",
  "rules": [
    {{ "id": "always", "when": {{}}, "then": {{ "result": "require_human" }} }}
  ],
  "default": {{ "result": "require_human" }}
}}"#
    )
}

/// Writes `contents` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf, String> {
    let path = dir.join(name);
    fs::write(&path, contents).map_err(|err| err.to_string())?;
    Ok(path)
}

/// Parses and validates inline TOML.
pub fn config_from_toml(contents: &str) -> Result<DcpConfig, ConfigError> {
    let mut config = DcpConfig::from_toml_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Asserts a config result failed with a message containing `needle`.
pub fn assert_invalid(result: Result<DcpConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
