// crates/dcp-server/src/rate_limit.rs
// ============================================================================
// Module: Request Rate Limiter
// Description: Fixed-window per-client request limiter for the API routes.
// Purpose: Bound the request rate any single client can impose.
// Dependencies: dcp-config, std
// ============================================================================

//! ## Overview
//! [`RateLimiter`] counts requests per client key inside fixed windows. A
//! client that exceeds the configured budget is refused until its window
//! rolls over and learns how long to wait through [`RateDecision::Limited`].
//! The client key is the first `X-Forwarded-For` hop when present, else the
//! peer address. Tracked clients are capped; once the cap is reached expired
//! windows are pruned and any further new clients share one overflow bucket.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use dcp_config::RateLimitConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum distinct client keys tracked at once.
const MAX_TRACKED_CLIENTS: usize = 10_000;
/// Shared key used once the tracking table is full.
const OVERFLOW_KEY: &str = "overflow";
/// Maximum accepted client key length.
const MAX_CLIENT_KEY_LEN: usize = 128;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request fits the client's budget.
    Allowed,
    /// The request exceeds the budget; retry after the given delay.
    Limited {
        /// Time until the client's window resets.
        retry_after: Duration,
    },
}

/// Request count inside one window.
#[derive(Debug, Clone, Copy)]
struct Window {
    /// Window start.
    started: Instant,
    /// Requests counted in this window.
    count: u32,
}

/// Fixed-window request limiter keyed by client.
#[derive(Debug)]
pub struct RateLimiter {
    /// Requests allowed per window.
    requests: u32,
    /// Window length.
    window: Duration,
    /// Active windows by client key.
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Builds a limiter allowing `requests` per `window`.
    #[must_use]
    pub fn new(requests: u32, window: Duration) -> Self {
        Self {
            requests: requests.max(1),
            window: window.max(Duration::from_millis(1)),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a limiter from validated configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests, Duration::from_secs(config.window_seconds))
    }

    /// Counts one request for `client` at the current instant.
    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Counts one request for `client` at `now`.
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let Ok(mut clients) = self.clients.lock() else {
            return RateDecision::Allowed;
        };
        let key = bounded_key(client);
        if !clients.contains_key(key) && clients.len() >= MAX_TRACKED_CLIENTS {
            let window = self.window;
            clients.retain(|_, entry| now.saturating_duration_since(entry.started) < window);
        }
        let key = if clients.contains_key(key) || clients.len() < MAX_TRACKED_CLIENTS {
            key
        } else {
            OVERFLOW_KEY
        };
        let entry = clients.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        if entry.count >= self.requests {
            let retry_after = self.window.saturating_sub(now.saturating_duration_since(entry.started));
            return RateDecision::Limited {
                retry_after,
            };
        }
        entry.count = entry.count.saturating_add(1);
        RateDecision::Allowed
    }

    /// Returns the number of tracked client windows.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().map(|clients| clients.len()).unwrap_or(0)
    }
}

/// Extracts the client key from forwarding headers or the peer address.
#[must_use]
pub fn client_key(forwarded_for: Option<&str>, peer: Option<String>) -> String {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or(peer)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Caps a client key to a bounded length on a character boundary.
fn bounded_key(client: &str) -> &str {
    if client.len() <= MAX_CLIENT_KEY_LEN {
        return client;
    }
    let end = client
        .char_indices()
        .map(|(index, _)| index)
        .take_while(|index| *index <= MAX_CLIENT_KEY_LEN)
        .last()
        .unwrap_or(0);
    client.get(..end).unwrap_or_default()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
