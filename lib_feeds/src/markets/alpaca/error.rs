//! Error types for the Alpaca stream.
//!
//! Every way a `listen()` call can end badly collapses into one [`FeedError`].
//! [`LinkError`] describes what went wrong on the wire; `FeedError` adds where
//! in the connection lifetime it happened.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Low-level failure of the connection itself.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Error reported by the WebSocket transport.
    #[error("{0}")]
    Transport(#[from] WsError),

    /// Close frame or end of stream.
    #[error("connection closed by remote")]
    Closed,

    /// Nothing re-armed the read deadline in time.
    #[error("no pong received within {0:?}, read deadline exceeded")]
    DeadlineExpired(Duration),

    /// A bounded dial, handshake step or write took too long.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Handshake step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    /// The `auth` request.
    Authenticate,
    /// The `listen` request.
    Subscribe,
}

impl fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeStage::Authenticate => write!(f, "authenticate"),
            HandshakeStage::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// Streaming operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOp {
    /// Reading a frame, including read-deadline expiry.
    Read,
    /// Writing a keepalive ping.
    Ping,
}

impl fmt::Display for StreamOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOp::Read => write!(f, "read"),
            StreamOp::Ping => write!(f, "write ping"),
        }
    }
}

/// Coarse classification of a [`FeedError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connection was never established.
    Dial,
    /// Authentication or subscription did not complete.
    Handshake,
    /// The connection failed after streaming began.
    Stream,
}

/// Terminal error of one `listen()` invocation.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The server answered the upgrade with a non-101 response.
    #[error("[alpaca] connection failure, err: {source}, status_code: {status}, body: {body}")]
    DialRejected {
        /// HTTP status of the rejected upgrade.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
        /// Underlying cause.
        #[source]
        source: WsError,
    },

    /// Dial failed before any response arrived.
    #[error("[alpaca] connection failure, err: {0}")]
    Dial(#[source] LinkError),

    /// Authentication or subscription failed.
    #[error("[alpaca] unable to {stage}: {source}")]
    Handshake {
        /// Step that failed.
        stage: HandshakeStage,
        /// Last response read before the failure, if any arrived.
        last_response: Option<String>,
        /// Underlying cause.
        #[source]
        source: LinkError,
    },

    /// Read or ping failure after streaming began.
    #[error("[alpaca] stream {op} error: {source}")]
    Stream {
        /// Operation that failed.
        op: StreamOp,
        /// Underlying cause.
        #[source]
        source: LinkError,
    },
}

impl FeedError {
    /// Which phase of the connection produced this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedError::DialRejected { .. } | FeedError::Dial(_) => ErrorKind::Dial,
            FeedError::Handshake { .. } => ErrorKind::Handshake,
            FeedError::Stream { .. } => ErrorKind::Stream,
        }
    }

    /// Underlying link failure, when there is one.
    pub fn link_error(&self) -> Option<&LinkError> {
        match self {
            FeedError::DialRejected { .. } => None,
            FeedError::Dial(e) => Some(e),
            FeedError::Handshake { source, .. } | FeedError::Stream { source, .. } => Some(source),
        }
    }
}
