//! # Alpaca Streaming Module
//!
//! A long-lived WebSocket client for the Alpaca market data stream. One call to
//! [`AlpacaWebSocket::listen`] dials the server, authenticates, subscribes to the
//! canonical stream list and then pumps every text frame, unmodified and in
//! arrival order, into the caller's output channel.
//!
//! ## Moving parts:
//! - **`connector`**: bounded-time dial that keeps the remote status and body of a
//!   rejected upgrade.
//! - **`handshake`**: the `auth` then `listen` request/response exchange.
//! - **`liveness`**: ping emission and the read deadline re-armed by pongs.
//! - **`pump`**: background task owning the read half of the socket.
//! - **`supervisor`**: the event loop multiplexing the pump and the ping ticker.
//!
//! `listen()` never retries. It returns the single error that ended the
//! connection, or `Ok(())` when the output channel was dropped by its owner.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Immutable client configuration and canonical subscription building.
pub mod config;
/// Dial with a bounded handshake timeout.
pub mod connector;
/// Error taxonomy returned by `listen()`.
pub mod error;
/// Authentication and subscription exchange.
pub mod handshake;
/// Keepalive pings and the liveness deadline.
pub mod liveness;
/// Frame pump: the read side of the connection.
pub mod pump;
/// Top-level lifecycle and event loop.
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

// --- Public API Re-exports ---
pub use config::{ClientConfig, Credentials, Subscription};
pub use error::{ErrorKind, FeedError, HandshakeStage, LinkError, StreamOp};
pub use supervisor::AlpacaWebSocket;
