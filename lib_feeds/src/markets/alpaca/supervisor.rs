//! # Supervisor
//!
//! Owns one connection from dial to close:
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Subscribing -> Streaming -> Closed
//! ```
//!
//! While streaming, a single `select!` loop waits on the pump's error slot, the
//! ping ticker, the pump's frame channel and the consumer dropping `output`.
//! The pump holds the read half and the supervisor holds the write half, so
//! each side of the socket has exactly one user. The connection is closed
//! once, after the pump has been stopped, whichever branch ended the loop. The
//! close gets the same time limit as a ping write.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::config::ClientConfig;
use super::connector;
use super::error::{FeedError, LinkError, StreamOp};
use super::handshake;
use super::liveness::{LivenessMonitor, PING_WRITE_TIMEOUT};
use super::pump::FramePump;

/// # Alpaca WebSocket Client
///
/// Streams raw text frames from the Alpaca market data WebSocket into `output`.
/// Each [`listen`](Self::listen) call is one connection; call it again to reconnect.
#[derive(Debug, Clone)]
pub struct AlpacaWebSocket {
    config: ClientConfig,
    output: mpsc::Sender<Vec<u8>>,
}

impl AlpacaWebSocket {
    /// Creates a client that delivers frame payloads to `output`.
    pub fn new(config: ClientConfig, output: mpsc::Sender<Vec<u8>>) -> Self {
        Self { config, output }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connects, authenticates, subscribes and streams until the connection fails.
    ///
    /// Returns the error that ended the connection, or `Ok(())` if the receiving
    /// side of `output` was dropped. The connection is always closed before this
    /// returns. Nothing is retried.
    pub async fn listen(&self) -> Result<(), FeedError> {
        let conn = match connector::connect(
            &self.config.endpoint,
            self.config.dial_timeout,
            self.config.max_message_size,
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                log::error!(
                    "[alpaca] error connecting to server {{server:{},subscription:{:?},error:{}}}",
                    self.config.endpoint,
                    self.config.topics,
                    e
                );
                return Err(e);
            }
        };

        let (write, read) = conn.split();
        self.drive(write, read).await
    }

    /// Runs the handshake and the stream over an already open connection, then
    /// closes it through `write`.
    pub async fn drive<W, R>(&self, mut write: W, read: R) -> Result<(), FeedError>
    where
        W: Sink<Message, Error = WsError> + Unpin,
        R: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
    {
        let outcome = self.session(&mut write, read).await;

        match timeout(PING_WRITE_TIMEOUT, write.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("[alpaca] failed to close websocket connection: {}", e),
            Err(_) => log::error!(
                "[alpaca] websocket close did not finish within {:?}, dropping connection",
                PING_WRITE_TIMEOUT
            ),
        }
        outcome
    }

    async fn session<W, R>(&self, write: &mut W, mut read: R) -> Result<(), FeedError>
    where
        W: Sink<Message, Error = WsError> + Unpin,
        R: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
    {
        let deadline = handshake::negotiate(write, &mut read, &self.config).await?;

        let mut pump = FramePump::spawn(read, deadline);
        let outcome = self.stream(write, &mut pump).await;
        pump.stop().await;
        outcome
    }

    async fn stream<W>(&self, write: &mut W, pump: &mut FramePump) -> Result<(), FeedError>
    where
        W: Sink<Message, Error = WsError> + Unpin,
    {
        let mut liveness = LivenessMonitor::start(self.config.ping_period);

        loop {
            tokio::select! {
                res = &mut pump.error => {
                    // Frames read before the failure still go out, in order.
                    while let Ok(frame) = pump.frames.try_recv() {
                        if self.output.send(frame).await.is_err() {
                            return Ok(());
                        }
                    }
                    let source = res.unwrap_or(LinkError::Closed);
                    return Err(FeedError::Stream { op: StreamOp::Read, source });
                }
                _ = liveness.tick() => {
                    if let Err(source) = liveness.ping(write).await {
                        log::error!("[alpaca] stream write ping error {}", source);
                        return Err(FeedError::Stream { op: StreamOp::Ping, source });
                    }
                }
                Some(frame) = pump.frames.recv() => {
                    if self.output.send(frame).await.is_err() {
                        log::info!("[alpaca] output channel closed, leaving stream");
                        return Ok(());
                    }
                }
                _ = self.output.closed() => {
                    log::info!("[alpaca] output channel closed, leaving stream");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::markets::alpaca::config::Credentials;
    use crate::markets::alpaca::error::{ErrorKind, HandshakeStage};
    use crate::markets::alpaca::testing::{
        binary, scripted, scripted_then_pongs, text, RecordingSink,
    };

    const AUTH_OK: &str = r#"{"stream":"authorization","data":{"status":"authenticated"}}"#;
    const LISTEN_OK: &str = r#"{"stream":"listening","data":{"streams":["Q.VOO"]}}"#;

    fn client(ping_ms: u64) -> (AlpacaWebSocket, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(16);
        let config = ClientConfig::new(
            "ws://unused",
            Credentials::new("KEY", "SECRET"),
            vec!["Q.VOO".to_string()],
        )
        .with_ping_period(Duration::from_millis(ping_ms));
        (AlpacaWebSocket::new(config, tx), rx)
    }

    #[tokio::test]
    async fn streams_text_frames_then_reports_read_error() {
        let (ws, mut rx) = client(10_000);
        let (write, log) = RecordingSink::new();
        let read = scripted(vec![
            text(AUTH_OK),
            text(LISTEN_OK),
            text(r#"{"ev":"Q","sym":"VOO","p":1}"#),
            binary(b"\x00\x01"),
            text(r#"{"ev":"Q","sym":"VOO","p":2}"#),
        ]);

        let err = ws.drive(write, read).await.expect_err("stream ends");

        assert_eq!(err.kind(), ErrorKind::Stream);
        assert!(matches!(
            err,
            FeedError::Stream { op: StreamOp::Read, source: LinkError::Closed }
        ));
        assert_eq!(rx.recv().await.unwrap(), br#"{"ev":"Q","sym":"VOO","p":1}"#.to_vec());
        assert_eq!(rx.recv().await.unwrap(), br#"{"ev":"Q","sym":"VOO","p":2}"#.to_vec());
        assert!(rx.try_recv().is_err());
        assert_eq!(log.closes(), 1);
    }

    #[tokio::test]
    async fn handshake_failure_closes_once_and_forwards_nothing() {
        let (ws, mut rx) = client(10_000);
        let (write, log) = RecordingSink::new();
        let read = scripted(vec![text(r#"{"status":"error"}"#)]);

        let err = ws.drive(write, read).await.expect_err("auth rejected");

        assert!(matches!(
            err,
            FeedError::Handshake { stage: HandshakeStage::Authenticate, .. }
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(log.closes(), 1);
    }

    #[tokio::test]
    async fn ping_write_failure_ends_the_stream() {
        let (ws, _rx) = client(50);
        // auth and listen go through, the first ping does not.
        let (write, log) = RecordingSink::failing_after(2);
        let read = scripted_then_pongs(vec![text(AUTH_OK), text(LISTEN_OK)]);

        let err = tokio::time::timeout(Duration::from_secs(2), ws.drive(write, read))
            .await
            .expect("returns without waiting for frames")
            .expect_err("ping fails");

        assert!(matches!(
            err,
            FeedError::Stream { op: StreamOp::Ping, source: LinkError::Transport(_) }
        ));
        assert_eq!(log.closes(), 1);
    }

    #[tokio::test]
    async fn stalled_socket_still_ends_with_ping_timeout() {
        let (ws, _rx) = client(50);
        // auth and listen go through, then the socket never drains again.
        let (write, log) = RecordingSink::stalled_after(2);
        let read = scripted_then_pongs(vec![text(AUTH_OK), text(LISTEN_OK)]);

        let err = tokio::time::timeout(Duration::from_secs(5), ws.drive(write, read))
            .await
            .expect("drive returns even though close cannot complete")
            .expect_err("ping times out");

        assert!(matches!(
            err,
            FeedError::Stream { op: StreamOp::Ping, source: LinkError::Timeout(_) }
        ));
        assert!(log.closes() >= 1);
    }

    #[tokio::test]
    async fn pings_on_every_tick_and_stops_when_output_is_dropped() {
        let (ws, rx) = client(30);
        let (write, log) = RecordingSink::new();
        let read = scripted_then_pongs(vec![text(AUTH_OK), text(LISTEN_OK)]);

        let task = tokio::spawn(async move { ws.drive(write, read).await });
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(rx);

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("an idle stream notices the dropped output")
            .unwrap()
            .expect("dropped output is a clean stop");

        let pings = log
            .sent()
            .iter()
            .filter(|m| matches!(m, Message::Ping(_)))
            .count();
        assert!(pings >= 2, "expected periodic pings, saw {pings}");
        assert_eq!(log.closes(), 1);
    }
}
