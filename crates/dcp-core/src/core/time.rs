// crates/dcp-core/src/core/time.rs
// ============================================================================
// Module: Decision Time Model
// Description: Canonical timestamp representation for decisions and events.
// Purpose: Keep SLA and expiry arithmetic explicit and replayable.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The engine never reads wall-clock time directly; hosts pass the current
//! [`Timestamp`] into every operation. This keeps expiry scans and tests
//! deterministic: a restarted supervisor re-derives overdue decisions purely
//! from persisted `expires_at` values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Unix epoch milliseconds.
///
/// # Invariants
/// - Values are supplied by callers; monotonicity is a caller responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(value: i64) -> Self {
        Self(value)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp shifted forward by `seconds`, saturating on overflow.
    #[must_use]
    pub fn plus_seconds(self, seconds: u64) -> Self {
        self.plus_millis(seconds.saturating_mul(1000))
    }

    /// Returns the timestamp shifted forward by `millis`, saturating on overflow.
    #[must_use]
    pub fn plus_millis(self, millis: u64) -> Self {
        let delta = i64::try_from(millis).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(delta))
    }

    /// Parses an RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError`] when the input is not valid RFC 3339 or is out of range.
    pub fn parse_rfc3339(input: &str) -> Result<Self, TimestampError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339)
            .map_err(|err| TimestampError(err.to_string()))?;
        let millis = parsed.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis)
            .map(Self)
            .map_err(|_| TimestampError("timestamp out of range".to_string()))
    }

    /// Renders the timestamp as RFC 3339 (UTC).
    ///
    /// Out-of-range values fall back to the raw millisecond count.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .ok()
            .and_then(|value| value.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Error returned when a timestamp cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp: {0}")]
pub struct TimestampError(String);
