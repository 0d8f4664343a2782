// crates/dcp-broker/src/lib.rs
// ============================================================================
// Module: Decision Control Plane Broker Library
// Description: Event sinks and the outbox dispatcher.
// Purpose: Deliver committed decision events to downstream consumers.
// Dependencies: dcp-core, hmac, reqwest, sha2, subtle, url
// ============================================================================

//! ## Overview
//! The broker turns outbox rows into transport deliveries. It provides a
//! signed webhook sink, a JSON-lines log sink, a callback sink, and the
//! [`OutboxDispatcher`] that drives them with retry and backoff.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod dispatcher;
pub mod signature;
pub mod sink;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dispatcher::BackoffPolicy;
pub use dispatcher::DEFAULT_EVENT_SOURCE;
pub use dispatcher::DispatchError;
pub use dispatcher::DispatchReport;
pub use dispatcher::OutboxDispatcher;
pub use signature::SignatureError;
pub use signature::sign;
pub use signature::verify_signature;
pub use sink::CallbackSink;
pub use sink::DeliveryReceipt;
pub use sink::LogSink;
pub use sink::Sink;
pub use sink::SinkError;
pub use sink::WebhookSink;
