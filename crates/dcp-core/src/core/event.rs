// crates/dcp-core/src/core/event.rs
// ============================================================================
// Module: Decision Events
// Description: Outbound event records, outbox entries, and the wire envelope.
// Purpose: Make every committed transition observable and idempotently replayable.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`DecisionEvent`] is written to the outbox in the same commit as the
//! transition that produced it. The dispatcher later wraps it in an
//! [`EventEnvelope`] (CloudEvents 1.0 shape) for transport. Delivery is
//! at-least-once; consumers deduplicate on `idempotency_key`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::decision::UnknownLabel;
use crate::core::identifiers::DecisionId;
use crate::core::identifiers::EventId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Fixed vocabulary of outbound event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Gate created and waiting for human review.
    #[serde(rename = "decision.paused")]
    Paused,
    /// Decision left pending review (including auto-resolution).
    #[serde(rename = "decision.actioned")]
    Actioned,
    /// SLA deadline passed.
    #[serde(rename = "decision.expired")]
    Expired,
    /// Orchestrator acknowledged it resumed execution.
    #[serde(rename = "decision.resumed")]
    Resumed,
}

impl EventType {
    /// All event types.
    pub const ALL: [Self; 4] = [Self::Paused, Self::Actioned, Self::Expired, Self::Resumed];

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paused => "decision.paused",
            Self::Actioned => "decision.actioned",
            Self::Expired => "decision.expired",
            Self::Resumed => "decision.resumed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == value)
            .ok_or_else(|| UnknownLabel::new("event type", value))
    }
}

// ============================================================================
// SECTION: Event Records
// ============================================================================

/// Event produced by a committed transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    /// Unique event identifier.
    pub event_id: EventId,
    /// Event type.
    pub event_type: EventType,
    /// Decision that produced the event.
    pub decision_id: DecisionId,
    /// Deterministic key derived from the triggering fact.
    pub idempotency_key: String,
    /// Correlation identifier.
    pub trace_id: TraceId,
    /// Commit time of the triggering transition.
    pub occurred_at: Timestamp,
    /// Event payload.
    pub data: Value,
}

/// Outbox row wrapping an event with delivery bookkeeping.
///
/// # Invariants
/// - `sequence` starts at 1 and increases by one per decision in commit order.
/// - `delivered_at` is set only after transport acknowledgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Per-decision commit order.
    pub sequence: u64,
    /// Event payload.
    pub event: DecisionEvent,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    /// Earliest time the next attempt may run.
    pub next_attempt_at: Timestamp,
    /// Last transport error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Acknowledgment time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Wire Envelope
// ============================================================================

/// CloudEvents specification version carried by every envelope.
pub const CLOUDEVENTS_SPEC_VERSION: &str = "1.0";

/// Wire envelope in the CloudEvents 1.0 structured-mode shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event identifier.
    pub id: String,
    /// Event type label.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Producer identifier.
    pub source: String,
    /// CloudEvents version.
    pub specversion: String,
    /// RFC 3339 occurrence time.
    pub time: String,
    /// Content type of `data`.
    pub datacontenttype: String,
    /// Decision identifier.
    pub subject: String,
    /// Per-decision sequence number.
    pub sequence: u64,
    /// Deduplication key for consumers.
    pub idempotency_key: String,
    /// Correlation identifier.
    pub trace_id: String,
    /// Event payload.
    pub data: Value,
}

impl EventEnvelope {
    /// Wraps an outbox entry for transport.
    #[must_use]
    pub fn from_outbox(entry: &OutboxEntry, source: &str) -> Self {
        let event = &entry.event;
        Self {
            id: event.event_id.to_string(),
            event_type: event.event_type.as_str().to_string(),
            source: source.to_string(),
            specversion: CLOUDEVENTS_SPEC_VERSION.to_string(),
            time: event.occurred_at.to_rfc3339(),
            datacontenttype: "application/json".to_string(),
            subject: event.decision_id.to_string(),
            sequence: entry.sequence,
            idempotency_key: event.idempotency_key.clone(),
            trace_id: event.trace_id.to_string(),
            data: event.data.clone(),
        }
    }
}
