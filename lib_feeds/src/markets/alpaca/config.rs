//! Client configuration for the Alpaca stream.
//!
//! [`ClientConfig`] is built once and never mutated; the supervisor only reads
//! from it. [`Subscription`] turns the per-channel symbol lists an operator
//! writes into the canonical, deduplicated stream list sent in the `listen`
//! request.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::liveness::liveness_margin;

/// Default upper bound for a single inbound message, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 2_048_000;
/// Default interval between keepalive pings.
pub const DEFAULT_PING_PERIOD: Duration = Duration::from_secs(10);
/// Default limit for the WebSocket upgrade handshake.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// API key pair sent in the `auth` request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Public API key id.
    pub key: String,
    /// API secret.
    pub secret: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// # Subscription
///
/// Symbols to stream, grouped by channel. The Alpaca stream names each topic
/// `<channel>.<symbol>`: `AM` for minute bars, `Q` for quotes and `T` for trades.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Symbols for minute bar aggregates (`AM.<symbol>`).
    #[serde(default)]
    pub minute_bars: Vec<String>,
    /// Symbols for top-of-book quotes (`Q.<symbol>`).
    #[serde(default)]
    pub quotes: Vec<String>,
    /// Symbols for trades (`T.<symbol>`).
    #[serde(default)]
    pub trades: Vec<String>,
}

impl Subscription {
    /// Builds the canonical topic list.
    ///
    /// Minute bars come first, then quotes, then trades, each in configured
    /// order. Blank symbols are skipped and the first occurrence of a topic wins.
    pub fn as_canonical(&self) -> Vec<String> {
        let channels = [
            ("AM", &self.minute_bars),
            ("Q", &self.quotes),
            ("T", &self.trades),
        ];

        let mut seen = HashSet::new();
        let mut canonical = Vec::new();
        for (prefix, symbols) in channels {
            for symbol in symbols.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
                let topic = format!("{}.{}", prefix, symbol);
                if seen.insert(topic.clone()) {
                    canonical.push(topic);
                }
            }
        }
        canonical
    }
}

/// # Client Configuration
///
/// Everything one `listen()` invocation needs. Cheap to clone; the supervisor
/// keeps its own copy.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `wss://stream.data.alpaca.markets/v1/stream`.
    pub endpoint: String,
    /// Key pair for the `auth` request.
    pub credentials: Credentials,
    /// Canonical topic list for the `listen` request.
    pub topics: Vec<String>,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Keepalive ping interval.
    pub ping_period: Duration,
    /// Limit for the WebSocket upgrade.
    pub dial_timeout: Duration,
    /// Limit for each handshake step, counted from the moment its request is sent.
    pub handshake_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration with the default frame size, ping period and timeouts.
    pub fn new(endpoint: impl Into<String>, credentials: Credentials, topics: Vec<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
            topics,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            ping_period: DEFAULT_PING_PERIOD,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            handshake_timeout: liveness_margin(DEFAULT_PING_PERIOD),
        }
    }

    /// Sets the maximum inbound message size.
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Sets the ping period. The handshake timeout follows it unless set explicitly afterwards.
    pub fn with_ping_period(mut self, period: Duration) -> Self {
        self.ping_period = period;
        self.handshake_timeout = liveness_margin(period);
        self
    }

    /// Sets the dial timeout.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Sets the per-step handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}
