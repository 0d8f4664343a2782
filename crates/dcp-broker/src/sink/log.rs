// crates/dcp-broker/src/sink/log.rs
// ============================================================================
// Module: Log Sink
// Description: JSON-lines sink for local delivery records.
// Purpose: Record every event envelope without an external consumer.
// Dependencies: serde_json, std
// ============================================================================

//! ## Overview
//! `LogSink` writes one JSON line per event, carrying the full envelope, and
//! acknowledges immediately. Useful for development and for audit replicas.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Mutex;

use dcp_core::EventEnvelope;
use dcp_core::Timestamp;
use serde_json::json;

use crate::sink::DeliveryReceipt;
use crate::sink::Sink;
use crate::sink::SinkError;

// ============================================================================
// SECTION: Log Sink
// ============================================================================

/// JSON-lines event sink.
pub struct LogSink<W: Write + Send> {
    /// Output writer for log records.
    writer: Mutex<W>,
}

impl<W: Write + Send> LogSink<W> {
    /// Creates a log sink writing to `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the sink and returns the writer.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::LogWriteFailed`] when the writer mutex is poisoned.
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|_| SinkError::LogWriteFailed("log writer mutex poisoned".to_string()))
    }
}

impl<W: Write + Send> Sink for LogSink<W> {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(
        &self,
        envelope: &EventEnvelope,
        now: Timestamp,
    ) -> Result<DeliveryReceipt, SinkError> {
        let receipt = DeliveryReceipt::new(envelope, self.name(), now);
        let record = json!({
            "delivered_at": now.to_rfc3339(),
            "event": envelope,
        });
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| SinkError::LogWriteFailed("log writer mutex poisoned".to_string()))?;
        serde_json::to_writer(&mut *guard, &record)
            .map_err(|err| SinkError::LogWriteFailed(err.to_string()))?;
        guard.write_all(b"\n").map_err(|err| SinkError::LogWriteFailed(err.to_string()))?;
        guard.flush().map_err(|err| SinkError::LogWriteFailed(err.to_string()))?;
        drop(guard);
        Ok(receipt)
    }
}
