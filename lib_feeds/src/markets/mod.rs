//! # Financial Market Feeds Module
//!
//! This module groups together the streaming clients for specific market data
//! providers. Every client forwards raw frame payloads to a caller-owned channel
//! and never decodes them; normalisation and persistence happen downstream.
//!
//! ## Contained Modules:
//!
//! - **`alpaca`**: Authenticated WebSocket client for the Alpaca streaming API
//!   (auth + listen handshake, ping/pong keepalive, read-deadline liveness).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Client for the Alpaca market data WebSocket stream.
pub mod alpaca;
