// crates/dcp-broker/src/sink/mod.rs
// ============================================================================
// Module: Event Sinks
// Description: Transport abstraction for decision event delivery.
// Purpose: Deliver CloudEvents envelopes and report delivery receipts.
// Dependencies: dcp-core, thiserror
// ============================================================================

//! ## Overview
//! A [`Sink`] delivers one [`EventEnvelope`] and acknowledges it with a
//! [`DeliveryReceipt`]. An error means the event was not acknowledged and
//! stays in the outbox for retry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dcp_core::EventEnvelope;
use dcp_core::Timestamp;
use serde::Serialize;
use thiserror::Error;

mod callback;
mod log;
mod webhook;

pub use callback::CallbackSink;
pub use log::LogSink;
pub use webhook::WebhookSink;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Acknowledgment returned by a sink for one delivered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    /// Delivered event identifier.
    pub event_id: String,
    /// Name of the sink that acknowledged delivery.
    pub sink: String,
    /// Acknowledgment time.
    pub delivered_at: Timestamp,
    /// Transport status code, when the transport has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl DeliveryReceipt {
    /// Builds a receipt for `envelope` acknowledged by `sink` at `now`.
    #[must_use]
    pub fn new(envelope: &EventEnvelope, sink: &str, now: Timestamp) -> Self {
        Self {
            event_id: envelope.id.clone(),
            sink: sink.to_string(),
            delivered_at: now,
            status_code: None,
        }
    }
}

/// Sink delivery errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Sink configuration is invalid.
    #[error("invalid sink configuration: {0}")]
    InvalidConfig(String),
    /// Envelope could not be encoded.
    #[error("event encoding failed: {0}")]
    Encode(String),
    /// Transport failed before a response arrived.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Receiver answered with a non-success status.
    #[error("receiver responded with status {0}")]
    Status(u16),
    /// Log record could not be written.
    #[error("log write failed: {0}")]
    LogWriteFailed(String),
    /// Callback refused the event.
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

// ============================================================================
// SECTION: Sink Trait
// ============================================================================

/// Delivers event envelopes to a downstream consumer.
pub trait Sink: Send + Sync {
    /// Short sink name recorded on receipts.
    fn name(&self) -> &str;

    /// Delivers one envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the consumer did not acknowledge the event.
    fn deliver(
        &self,
        envelope: &EventEnvelope,
        now: Timestamp,
    ) -> Result<DeliveryReceipt, SinkError>;
}
