// crates/dcp-broker/tests/common/mod.rs
// ============================================================================
// Module: Broker Test Helpers
// Description: Shared fixtures for sink and dispatcher tests.
// Purpose: Build envelopes and capture writer output.
// Dependencies: dcp-core
// ============================================================================

//! ## Overview
//! Fixtures for broker integration tests.

#![allow(dead_code, reason = "Helpers are shared across several test crates.")]

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use dcp_core::EventEnvelope;
use dcp_core::Timestamp;
use serde_json::json;

/// Base test clock: 2026-01-01T00:00:00Z.
pub const T0: i64 = 1_767_225_600_000;

/// Returns `T0 + offset_ms`.
pub fn at(offset_ms: i64) -> Timestamp {
    Timestamp::from_unix_millis(T0 + offset_ms)
}

/// Builds a paused-event envelope for `id`.
pub fn sample_envelope(id: &str) -> EventEnvelope {
    EventEnvelope {
        id: id.to_string(),
        event_type: "decision.paused".to_string(),
        source: "dcp".to_string(),
        specversion: "1.0".to_string(),
        time: "2026-01-01T00:00:00Z".to_string(),
        datacontenttype: "application/json".to_string(),
        subject: "dec-1".to_string(),
        sequence: 1,
        idempotency_key: "key-1".to_string(),
        trace_id: "trace-1".to_string(),
        data: json!({ "decision_id": "dec-1", "status": "pending_human_review" }),
    }
}

/// Cloneable in-memory writer.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    /// Captured bytes.
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns captured output as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8(self.bytes.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails.
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}
