// crates/dcp-cli/tests/policy_commands.rs
// ============================================================================
// Module: CLI Offline Command Tests
// Description: Integration tests for config and policy subcommands.
// Purpose: Ensure offline tooling reports valid and invalid inputs correctly.
// Dependencies: dcp binary, tempfile
// ============================================================================
//! ## Overview
//! Runs the compiled `dcp` binary against temporary files and checks exit
//! status and output.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn dcp_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dcp"))
}

fn run(args: &[&str]) -> Output {
    Command::new(dcp_bin()).args(args).env_remove("DCP_CONFIG").output().expect("run dcp")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

const RULESET: &str = r#"{
  "version": "cli-1",
  "description": "CLI test rules",
  "rules": [
    {
      "id": "expensive",
      "when": { "gt": ["{{estimated_cost}}", 1000] },
      "then": { "result": "require_human", "reason": "Expensive" }
    }
  ],
  "default": { "result": "auto_approve" }
}"#;

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies `policy check` prints the summary of a valid ruleset.
#[test]
fn policy_check_accepts_valid_ruleset() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("rules.json");
    fs::write(&file, RULESET).unwrap();

    let output = run(&["policy", "check", &path_arg(&file)]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("version cli-1"), "stdout: {stdout}");
    assert!(stdout.contains("rules 1"), "stdout: {stdout}");
    assert!(stdout.contains("default auto_approve"), "stdout: {stdout}");
    assert!(stdout.contains("description: CLI test rules"), "stdout: {stdout}");
}

/// Verifies `policy check` rejects duplicate rule ids.
#[test]
fn policy_check_rejects_invalid_ruleset() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("rules.json");
    fs::write(
        &file,
        r#"{"version":"bad","rules":[
            {"id":"a","when":{"eq":[1,1]},"then":{"result":"auto_approve"}},
            {"id":"a","when":{"eq":[1,1]},"then":{"result":"auto_approve"}}
        ],"default":{"result":"require_human"}}"#,
    )
    .unwrap();

    let output = run(&["policy", "check", &path_arg(&file)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("duplicate rule id"), "stderr: {stderr}");
}

/// Verifies `policy eval` against the built-in ruleset escalates high risk.
#[test]
fn policy_eval_builtin_escalates_high_risk() {
    let output = run(&[
        "policy",
        "eval",
        "--inputs",
        r#"{"risk_score":0.82,"confidence_score":0.64,"estimated_cost":12.5}"#,
    ]);
    assert!(output.status.success());
    let evaluation: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(evaluation["result"], "force_escalation");
    assert_eq!(evaluation["matched_rule_id"], "high-risk");
    assert_eq!(evaluation["policy_version"], "2.0.0");
    assert_eq!(evaluation["evaluated_rules"].as_array().unwrap().len(), 2);
}

/// Verifies `policy eval` reads a ruleset and inputs from files.
#[test]
fn policy_eval_reads_files() {
    let dir = TempDir::new().unwrap();
    let rules = dir.path().join("rules.json");
    let inputs = dir.path().join("inputs.json");
    fs::write(&rules, RULESET).unwrap();
    fs::write(&inputs, r#"{"estimated_cost": 5000}"#).unwrap();

    let output = run(&[
        "policy",
        "eval",
        "--policy",
        &path_arg(&rules),
        "--inputs-file",
        &path_arg(&inputs),
    ]);
    assert!(output.status.success());
    let evaluation: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(evaluation["result"], "require_human");
    assert_eq!(evaluation["reason"], "Expensive");
}

/// Verifies `policy eval` rejects inputs that are not a JSON object.
#[test]
fn policy_eval_rejects_non_object_inputs() {
    let output = run(&["policy", "eval", "--inputs", "[1,2,3]"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("inputs must be a JSON object"), "stderr: {stderr}");
}

/// Verifies `config validate` loads policy files referenced by the config.
#[test]
fn config_validate_checks_policy_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("rules.json"), RULESET).unwrap();
    let config = dir.path().join("dcp.toml");
    fs::write(&config, "[policy]\npath = \"rules.json\"\n").unwrap();

    let output = run(&["config", "validate", "--config", &path_arg(&config)]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("config ok"));

    fs::write(&config, "[policy]\npath = \"missing.json\"\n").unwrap();
    let output = run(&["config", "validate", "--config", &path_arg(&config)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load policies"));
}

/// Verifies `serve` fails before binding when the config is invalid.
#[test]
fn serve_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("dcp.toml");
    fs::write(&config, "[server]\nbind = \"not-an-address\"\n").unwrap();

    let output = run(&["serve", "--config", &path_arg(&config)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load config"));
}
