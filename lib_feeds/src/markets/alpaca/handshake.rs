//! # Handshake Negotiator
//!
//! Two request/response exchanges run over a freshly dialed connection before
//! any market data flows:
//!
//! 1. `{"action":"auth","key":..,"secret":..}`, accepted once a response
//!    contains `"authenticated"`;
//! 2. `{"action":"listen","data":{"streams":[..]}}`, accepted once a response
//!    contains `"streams"`.
//!
//! Responses without the marker are logged and skipped; the step keeps reading
//! until the marker shows up, the connection fails, or the step runs past its
//! handshake timeout. Nothing is retried here.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::json;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::config::{ClientConfig, Credentials};
use super::error::{FeedError, HandshakeStage, LinkError};
use super::liveness::ReadDeadline;

/// Substring that marks a successful `auth` response.
pub const AUTHENTICATED_MARKER: &str = r#""authenticated""#;
/// Substring that marks a successful `listen` response.
///
/// Quoted, so it is stricter than the service's own bare `streams` match.
pub const STREAMS_MARKER: &str = r#""streams""#;

/// Body of the `auth` request.
pub fn auth_message(credentials: &Credentials) -> String {
    json!({
        "action": "auth",
        "key": credentials.key,
        "secret": credentials.secret,
    })
    .to_string()
}

/// Body of the `listen` request for the canonical topic list.
pub fn listen_message(topics: &[String]) -> String {
    json!({
        "action": "listen",
        "data": { "streams": topics },
    })
    .to_string()
}

/// A failed exchange, with the last response seen before it failed.
#[derive(Debug)]
struct ExchangeFailure {
    last_response: Option<String>,
    source: LinkError,
}

impl ExchangeFailure {
    fn into_feed_error(self, stage: HandshakeStage) -> FeedError {
        FeedError::Handshake {
            stage,
            last_response: self.last_response,
            source: self.source,
        }
    }
}

/// Authenticates and subscribes, then arms the read deadline.
///
/// # Errors
/// [`FeedError::Handshake`] naming the step that failed. The connection is
/// left open; closing it is the caller's job.
pub async fn negotiate<W, R>(
    write: &mut W,
    read: &mut R,
    config: &ClientConfig,
) -> Result<ReadDeadline, FeedError>
where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    log::info!("[alpaca] authenticating {{key:{}}}", config.credentials.key);
    if let Err(failure) = exchange_message(
        write,
        read,
        auth_message(&config.credentials),
        AUTHENTICATED_MARKER,
        config.handshake_timeout,
    )
    .await
    {
        log::error!(
            "[alpaca] unable to authenticate {{response:{:?},error:{}}}",
            failure.last_response,
            failure.source
        );
        return Err(failure.into_feed_error(HandshakeStage::Authenticate));
    }
    log::info!("[alpaca] authenticated successfully");

    if let Err(failure) = exchange_message(
        write,
        read,
        listen_message(&config.topics),
        STREAMS_MARKER,
        config.handshake_timeout,
    )
    .await
    {
        log::error!(
            "[alpaca] subscription failure {{streams:{:?},response:{:?},error:{}}}",
            config.topics,
            failure.last_response,
            failure.source
        );
        return Err(failure.into_feed_error(HandshakeStage::Subscribe));
    }
    log::info!("[alpaca] subscribed {{streams:{:?}}}", config.topics);

    // Arm the deadline now so a silent link is caught even before the first ping.
    Ok(ReadDeadline::armed_at(Instant::now(), config.ping_period))
}

/// Sends `request` and reads until a response contains `expect`.
async fn exchange_message<W, R>(
    write: &mut W,
    read: &mut R,
    request: String,
    expect: &str,
    limit: Duration,
) -> Result<String, ExchangeFailure>
where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut last_response = None;
    let fail = |last_response: Option<String>, source: LinkError| ExchangeFailure {
        last_response,
        source,
    };

    if let Err(e) = write.send(Message::text(request)).await {
        return Err(fail(None, LinkError::Transport(e)));
    }

    let deadline = Instant::now() + limit;
    loop {
        let frame = match timeout_at(deadline, read.next()).await {
            Err(_) => return Err(fail(last_response, LinkError::Timeout(limit))),
            Ok(None) => return Err(fail(last_response, LinkError::Closed)),
            Ok(Some(Err(e))) => return Err(fail(last_response, LinkError::Transport(e))),
            Ok(Some(Ok(frame))) => frame,
        };

        let response = match frame {
            Message::Text(text) => text.to_string(),
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(reason) => {
                log::debug!("[alpaca] close frame during handshake: {:?}", reason);
                return Err(fail(last_response, LinkError::Closed));
            }
            _ => continue,
        };

        if response.contains(expect) {
            return Ok(response);
        }

        log::info!("[alpaca] response: {}, expect: {}", response, expect);
        last_response = Some(response);
    }
}
