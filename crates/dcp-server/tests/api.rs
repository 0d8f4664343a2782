// crates/dcp-server/tests/api.rs
// ============================================================================
// Module: HTTP API Tests
// Description: Drive the decision request surface through the router.
// Purpose: Validate status codes, error envelopes, and audit records.
// Dependencies: axum, dcp-server, tower
// ============================================================================

//! ## Overview
//! Requests go through the real axum router with `tower::ServiceExt::oneshot`
//! over an in-memory engine.

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

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use dcp_server::AuditOutcome;
use serde_json::json;

use crate::common::Harness;
use crate::common::PREFIX;
use crate::common::human_gate;
use crate::common::low_risk_gate;

/// Verifies creation answers 201 and an idempotent retry answers 200.
#[tokio::test]
async fn create_gate_is_idempotent_over_http() {
    let harness = Harness::new();
    let (status, first) = harness.create(human_gate("exec-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["created"], true);
    assert_eq!(first["decision"]["status"], "pending_human_review");
    assert_eq!(first["decision"]["org_id"], "default");

    let (status, retry) = harness.create(human_gate("exec-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(retry["created"], false);
    assert_eq!(retry["decision"]["decision_id"], first["decision"]["decision_id"]);
}

/// Verifies policy auto-resolution is visible in the creation response.
#[tokio::test]
async fn low_risk_gate_is_auto_approved() {
    let harness = Harness::new();
    let (status, body) = harness.create(low_risk_gate("exec-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["decision"]["status"], "approved");
    assert!(body["decision"]["resume_token"].is_string());
}

/// Verifies malformed bodies produce validation envelopes.
#[tokio::test]
async fn malformed_gate_requests_are_rejected() {
    let harness = Harness::new();
    let (status, body) = harness.send("POST", &format!("{PREFIX}/decision-gates"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["category"], "validation");

    let (status, body) = harness
        .send_raw("POST", &format!("{PREFIX}/decision-gates"), Body::from("{not json"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("invalid request body"));

    let mut bad_score = human_gate("exec-1");
    bad_score["risk_score"] = json!(1.5);
    let (status, body) = harness.create(bad_score).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["category"], "validation");
}

/// Verifies listing defaults to pending review and validates parameters.
#[tokio::test]
async fn list_filters_and_validates_parameters() {
    let harness = Harness::new();
    harness.create(human_gate("exec-1")).await;
    harness.advance(1);
    harness.create(human_gate("exec-2")).await;
    harness.advance(1);
    harness.create(low_risk_gate("exec-3")).await;

    let (status, page) = harness.send("GET", &format!("{PREFIX}/decisions"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 50);
    assert_eq!(page["items"][0]["execution_id"], "exec-2");

    let (_, approved) =
        harness.send("GET", &format!("{PREFIX}/decisions?status=approved"), None).await;
    assert_eq!(approved["total"], 1);
    let (_, all) =
        harness.send("GET", &format!("{PREFIX}/decisions?status=all&limit=1&offset=1"), None).await;
    assert_eq!(all["total"], 3);
    assert_eq!(all["items"].as_array().unwrap().len(), 1);
    assert_eq!(all["items"][0]["execution_id"], "exec-2");

    for query in [
        "limit=0",
        "limit=101",
        "limit=abc",
        "status=bogus",
        "org_id=bad%20org",
        "offset=-1",
        "offset=18446744073709551615",
    ] {
        let (status, body) =
            harness.send("GET", &format!("{PREFIX}/decisions?{query}"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "query {query}");
        assert_eq!(body["error"]["category"], "validation");
    }
}

/// Verifies details include the recommendation, snapshots, and actions.
#[tokio::test]
async fn get_decision_returns_details_or_not_found() {
    let harness = Harness::new();
    let (_, created) = harness.create(human_gate("exec-1")).await;
    let decision_id = created["decision"]["decision_id"].as_str().unwrap();

    let (status, details) =
        harness.send("GET", &format!("{PREFIX}/decisions/{decision_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["recommendation"]["summary"], "Refund order 1234");
    assert_eq!(details["policy_snapshots"].as_array().unwrap().len(), 1);
    assert!(details["actions"].as_array().unwrap().is_empty());

    let (status, body) = harness.send("GET", &format!("{PREFIX}/decisions/dec-missing"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["category"], "not_found");
}

/// Verifies the first action wins and later actions conflict.
#[tokio::test]
async fn second_action_conflicts_with_current_state() {
    let harness = Harness::new();
    let (_, created) = harness.create(human_gate("exec-1")).await;
    let decision_id = created["decision"]["decision_id"].as_str().unwrap();
    let approve = format!("{PREFIX}/decisions/{decision_id}/approve");

    let (status, approved) = harness
        .send("POST", &approve, Some(json!({ "actor_id": "ops@example.com", "comment": "ok" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["version"], 2);

    let reject = format!("{PREFIX}/decisions/{decision_id}/reject");
    let (status, conflict) = harness.send("POST", &reject, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["error"]["category"], "conflict");
    assert_eq!(conflict["error"]["decision"]["status"], "approved");
}

/// Verifies modify requires a modifications payload.
#[tokio::test]
async fn modify_requires_modifications() {
    let harness = Harness::new();
    let (_, created) = harness.create(human_gate("exec-1")).await;
    let decision_id = created["decision"]["decision_id"].as_str().unwrap();
    let modify = format!("{PREFIX}/decisions/{decision_id}/modify");

    let (status, _) = harness.send("POST", &modify, Some(json!({ "actor_id": "ops" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, modified) = harness
        .send("POST", &modify, Some(json!({ "actor_id": "ops", "modifications": { "amount": 10 } })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(modified["status"], "modified");
}

/// Verifies resume acknowledgment checks the token and is repeatable.
#[tokio::test]
async fn resume_acknowledgment_flow() {
    let harness = Harness::new();
    let (_, created) = harness.create(human_gate("exec-1")).await;
    let decision_id = created["decision"]["decision_id"].as_str().unwrap().to_string();
    let resume = format!("{PREFIX}/decisions/{decision_id}/resume");

    let (status, pending) =
        harness.send("POST", &resume, Some(json!({ "resume_token": "early" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(pending["error"]["category"], "conflict");

    let (_, approved) =
        harness.send("POST", &format!("{PREFIX}/decisions/{decision_id}/approve"), None).await;
    let token = approved["resume_token"].as_str().unwrap().to_string();

    let (status, wrong) =
        harness.send("POST", &resume, Some(json!({ "resume_token": "wrong" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong["error"]["category"], "validation");

    let (status, missing) = harness.send("POST", &resume, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(missing["error"]["category"], "validation");

    let (status, executed) =
        harness.send("POST", &resume, Some(json!({ "resume_token": token }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(executed["status"], "executed");

    let (status, repeat) =
        harness.send("POST", &resume, Some(json!({ "resume_token": token }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(repeat["version"], executed["version"]);
}

/// Verifies re-evaluation appends a snapshot and leaves status unchanged.
#[tokio::test]
async fn reevaluate_appends_snapshot() {
    let harness = Harness::new();
    let (_, created) = harness.create(human_gate("exec-1")).await;
    let decision_id = created["decision"]["decision_id"].as_str().unwrap();

    let (status, snapshot) = harness
        .send("POST", &format!("{PREFIX}/decisions/{decision_id}/reevaluate"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["result"], "require_human");
    assert_eq!(snapshot["policy_version"], "2.0.0");

    let (_, details) =
        harness.send("GET", &format!("{PREFIX}/decisions/{decision_id}"), None).await;
    assert_eq!(details["policy_snapshots"].as_array().unwrap().len(), 2);
    assert_eq!(details["decision"]["status"], "pending_human_review");
}

/// Verifies unsupported operations, including system-only expiry, are unknown.
#[tokio::test]
async fn unknown_operations_are_not_found() {
    let harness = Harness::new();
    let (_, created) = harness.create(human_gate("exec-1")).await;
    let decision_id = created["decision"]["decision_id"].as_str().unwrap();
    for operation in ["expire", "delete"] {
        let (status, body) = harness
            .send("POST", &format!("{PREFIX}/decisions/{decision_id}/{operation}"), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["category"], "not_found");
    }
}

/// Verifies a failed reload disables creation but keeps reads working.
#[tokio::test]
async fn failed_policy_reload_disables_gate_creation() {
    let harness = Harness::new();
    let (_, created) = harness.create(human_gate("exec-1")).await;
    let decision_id = created["decision"]["decision_id"].as_str().unwrap().to_string();
    let reload = format!("{PREFIX}/policies/reload");

    *harness.reload_failure.lock().unwrap() = Some("bad ruleset".to_string());
    let (status, body) = harness.send("POST", &reload, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["category"], "configuration");

    let (status, body) = harness.create(human_gate("exec-2")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["category"], "configuration");
    let (status, _) =
        harness.send("GET", &format!("{PREFIX}/decisions/{decision_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, health) = harness.send("GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["policies"], "unavailable");

    *harness.reload_failure.lock().unwrap() = None;
    let (status, body) = harness.send("POST", &reload, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    let (status, _) = harness.create(human_gate("exec-2")).await;
    assert_eq!(status, StatusCode::CREATED);
}

/// Verifies health reports an active catalog.
#[tokio::test]
async fn healthz_reports_ready() {
    let harness = Harness::new();
    let (status, body) = harness.send("GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["policies"], "active");
}

/// Verifies oversized bodies are refused before parsing.
#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let harness = Harness::with_limits(64, Duration::from_secs(5), Duration::ZERO);
    let (status, _) = harness.create(human_gate("exec-1")).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

/// Verifies work exceeding the deadline is reported as a timeout.
#[tokio::test]
async fn slow_operations_time_out() {
    let harness =
        Harness::with_limits(1024 * 1024, Duration::from_millis(50), Duration::from_millis(500));
    let (status, body) = harness.send("POST", &format!("{PREFIX}/policies/reload"), None).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["category"], "timeout");
}

/// Verifies mutations are audited with outcome and decision identity.
#[tokio::test]
async fn mutations_are_audited() {
    let harness = Harness::new();
    let (_, created) = harness.create(human_gate("exec-1")).await;
    let decision_id = created["decision"]["decision_id"].as_str().unwrap();
    harness.send("POST", &format!("{PREFIX}/decisions/{decision_id}/approve"), None).await;
    harness.send("POST", &format!("{PREFIX}/decisions/{decision_id}/approve"), None).await;

    let records = harness.audit.records();
    let events: Vec<_> = records.iter().map(|record| record.event).collect();
    assert_eq!(events, vec!["decision_created", "decision_actioned", "decision_actioned"]);
    assert_eq!(records[0].decision_id.as_deref(), Some(decision_id));
    assert_eq!(records[0].timestamp_ms, common::T0);
    assert_eq!(records[1].status.as_deref(), Some("approved"));
    assert_eq!(records[2].outcome, AuditOutcome::Error);
    assert_eq!(records[2].error_category, Some("conflict"));
}
