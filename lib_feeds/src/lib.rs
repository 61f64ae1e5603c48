//! # lib_feeds
//!
//! Streaming market-data clients for the `rsdev` workspace.
//!
//! Each feed lives under [`markets`] and exposes a single-shot `listen()` entry
//! point: it owns one upstream connection from dial to close and reports the
//! condition that ended it. Reconnection policy belongs to the caller (see the
//! `servers` crate).

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Market data providers (currently the Alpaca streaming API).
#[cfg(feature = "markets")]
pub mod markets;
