// crates/dcp-broker/src/sink/webhook.rs
// ============================================================================
// Module: Webhook Sink
// Description: Signed HTTP POST delivery of decision events.
// Purpose: Push CloudEvents envelopes to the orchestration collaborator.
// Dependencies: reqwest, url, dcp-core
// ============================================================================

//! ## Overview
//! [`WebhookSink`] POSTs each envelope as JSON and treats any 2xx response as
//! acknowledgment. Every request carries an HMAC signature over the timestamp
//! and body plus event id and idempotency headers. Redirects are not
//! followed, so a 3xx response counts as a failed delivery.
//! Security posture: the receiver is untrusted and the secret is never
//! logged; see `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use dcp_core::EventEnvelope;
use dcp_core::Timestamp;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use url::Url;

use crate::signature::EVENT_ID_HEADER;
use crate::signature::IDEMPOTENCY_KEY_HEADER;
use crate::signature::SIGNATURE_HEADER;
use crate::signature::TIMESTAMP_HEADER;
use crate::signature::sign;
use crate::sink::DeliveryReceipt;
use crate::sink::Sink;
use crate::sink::SinkError;

// ============================================================================
// SECTION: Webhook Sink
// ============================================================================

/// HTTP webhook sink with HMAC-signed deliveries.
#[derive(Clone)]
pub struct WebhookSink {
    /// HTTP client used for deliveries.
    client: Client,
    /// Receiver endpoint.
    url: Url,
    /// Shared signing secret.
    secret: Vec<u8>,
}

impl fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSink").field("url", &self.url.as_str()).finish_non_exhaustive()
    }
}

impl WebhookSink {
    /// Builds a webhook sink for `url` with a request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::InvalidConfig`] when the URL is not http(s), the
    /// secret is empty, or the HTTP client cannot be constructed.
    pub fn new(url: &str, secret: impl Into<Vec<u8>>, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|err| SinkError::InvalidConfig(err.to_string()))?;
        Self::with_client(client, url, secret)
    }

    /// Builds a webhook sink over a preconfigured client.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::InvalidConfig`] when the URL is not http(s) or
    /// the secret is empty.
    pub fn with_client(
        client: Client,
        url: &str,
        secret: impl Into<Vec<u8>>,
    ) -> Result<Self, SinkError> {
        let url = Url::parse(url).map_err(|err| SinkError::InvalidConfig(err.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(SinkError::InvalidConfig(format!("unsupported scheme: {scheme}")));
            }
        }
        let secret = secret.into();
        if secret.is_empty() {
            return Err(SinkError::InvalidConfig("webhook secret is empty".to_string()));
        }
        Ok(Self {
            client,
            url,
            secret,
        })
    }

    /// Returns the receiver endpoint.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl Sink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn deliver(
        &self,
        envelope: &EventEnvelope,
        now: Timestamp,
    ) -> Result<DeliveryReceipt, SinkError> {
        let body = serde_json::to_vec(envelope).map_err(|err| SinkError::Encode(err.to_string()))?;
        let timestamp_seconds = now.as_unix_millis().div_euclid(1000);
        let signature = sign(&self.secret, timestamp_seconds, &body)
            .map_err(|err| SinkError::InvalidConfig(err.to_string()))?;
        let response = self
            .client
            .post(self.url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp_seconds.to_string())
            .header(EVENT_ID_HEADER, envelope.id.as_str())
            .header(IDEMPOTENCY_KEY_HEADER, envelope.idempotency_key.as_str())
            .body(body)
            .send()
            .map_err(|err| SinkError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }
        let mut receipt = DeliveryReceipt::new(envelope, self.name(), now);
        receipt.status_code = Some(status.as_u16());
        Ok(receipt)
    }
}
