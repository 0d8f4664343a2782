// crates/dcp-broker/src/sink/callback.rs
// ============================================================================
// Module: Callback Sink
// Description: Callback-based sink for in-process delivery.
// Purpose: Invoke a user-provided function with each event envelope.
// Dependencies: dcp-core, std
// ============================================================================

//! ## Overview
//! [`CallbackSink`] delivers envelopes by invoking a user-supplied function.
//! Returning an error leaves the event undelivered.
//! Security posture: callback handlers are external sinks; treat payloads as
//! sensitive per `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use dcp_core::EventEnvelope;
use dcp_core::Timestamp;

use crate::sink::DeliveryReceipt;
use crate::sink::Sink;
use crate::sink::SinkError;

// ============================================================================
// SECTION: Callback Sink
// ============================================================================

/// Callback handler signature used by the sink.
type CallbackHandler = dyn Fn(&EventEnvelope) -> Result<(), SinkError> + Send + Sync;

/// Callback-based event sink.
#[derive(Clone)]
pub struct CallbackSink {
    /// Handler invoked with each envelope.
    handler: Arc<CallbackHandler>,
}

impl CallbackSink {
    /// Creates a callback sink from a handler function.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&EventEnvelope) -> Result<(), SinkError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl Sink for CallbackSink {
    fn name(&self) -> &'static str {
        "callback"
    }

    fn deliver(
        &self,
        envelope: &EventEnvelope,
        now: Timestamp,
    ) -> Result<DeliveryReceipt, SinkError> {
        (self.handler)(envelope)?;
        Ok(DeliveryReceipt::new(envelope, self.name(), now))
    }
}
