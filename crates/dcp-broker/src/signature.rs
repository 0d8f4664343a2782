// crates/dcp-broker/src/signature.rs
// ============================================================================
// Module: Webhook Signatures
// Description: HMAC-SHA256 signing and verification for webhook deliveries.
// Purpose: Let receivers reject forged or replayed event deliveries.
// Dependencies: hmac, sha2, subtle, dcp-core
// ============================================================================

//! ## Overview
//! Deliveries are signed over `"{timestamp}.{body}"` where `timestamp` is the
//! unix-seconds value sent in [`TIMESTAMP_HEADER`]. Binding the timestamp into
//! the MAC lets [`verify_signature`] bound replay to a tolerance window.
//! Security posture: signature comparison is constant time; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dcp_core::Timestamp;
use dcp_core::hashing::hex_encode;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-dcp-signature";
/// Header carrying the unix-seconds signing timestamp.
pub const TIMESTAMP_HEADER: &str = "x-dcp-timestamp";
/// Header carrying the event identifier.
pub const EVENT_ID_HEADER: &str = "x-dcp-event-id";
/// Header carrying the consumer deduplication key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-dcp-idempotency-key";
/// Prefix naming the MAC algorithm in the signature header.
pub const SIGNATURE_PREFIX: &str = "sha256=";
/// Default accepted clock skew between signer and verifier.
pub const DEFAULT_TOLERANCE_SECONDS: u64 = 300;

/// HMAC-SHA256 instance.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Signature failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Secret was rejected by the MAC.
    #[error("invalid signing secret")]
    InvalidSecret,
    /// Header value could not be parsed.
    #[error("malformed signature header: {0}")]
    Malformed(String),
    /// Timestamp falls outside the tolerance window.
    #[error("signature timestamp outside tolerance ({skew_seconds}s > {tolerance_seconds}s)")]
    Stale {
        /// Absolute skew observed.
        skew_seconds: u64,
        /// Allowed skew.
        tolerance_seconds: u64,
    },
    /// Signature does not match the body.
    #[error("signature mismatch")]
    Mismatch,
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Computes the signature header value for `body` sent at `timestamp_seconds`.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidSecret`] when the MAC rejects the key.
pub fn sign(secret: &[u8], timestamp_seconds: i64, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp_seconds.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(format!("{SIGNATURE_PREFIX}{}", hex_encode(&mac.finalize().into_bytes())))
}

/// Verifies a delivery against its signature and timestamp headers.
///
/// # Errors
///
/// Returns [`SignatureError`] when the headers are malformed, the timestamp
/// is outside `tolerance_seconds` of `now`, or the signature does not match.
pub fn verify_signature(
    secret: &[u8],
    signature_header: &str,
    timestamp_header: &str,
    body: &[u8],
    now: Timestamp,
    tolerance_seconds: u64,
) -> Result<(), SignatureError> {
    if !signature_header.starts_with(SIGNATURE_PREFIX) {
        return Err(SignatureError::Malformed(format!(
            "signature must start with {SIGNATURE_PREFIX}"
        )));
    }
    let timestamp_seconds = timestamp_header
        .trim()
        .parse::<i64>()
        .map_err(|_| SignatureError::Malformed("timestamp must be unix seconds".to_string()))?;
    let now_seconds = now.as_unix_millis().div_euclid(1000);
    let skew_seconds = now_seconds.abs_diff(timestamp_seconds);
    if skew_seconds > tolerance_seconds {
        return Err(SignatureError::Stale {
            skew_seconds,
            tolerance_seconds,
        });
    }
    let expected = sign(secret, timestamp_seconds, body)?;
    if bool::from(expected.as_bytes().ct_eq(signature_header.trim().as_bytes())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
