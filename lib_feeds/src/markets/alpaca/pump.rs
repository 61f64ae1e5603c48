//! # Frame Pump
//!
//! The only reader of the connection. It runs as its own task for the lifetime
//! of the stream:
//!
//! - text frames are forwarded unmodified on the frame channel, one at a time;
//! - binary frames are logged and dropped;
//! - pongs re-arm the read deadline;
//! - the first read failure (error, close, end of stream or deadline expiry) is
//!   deposited in the error slot and the task ends.
//!
//! The error slot is a `oneshot`, so the pump can always deposit its error
//! without blocking and can never send a second one. The pump never writes and
//! never closes the connection.

use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::error::LinkError;
use super::liveness::ReadDeadline;

/// Handle to a running pump task.
#[derive(Debug)]
pub struct FramePump {
    /// Text frame payloads in arrival order.
    pub frames: mpsc::Receiver<Vec<u8>>,
    /// The error that stopped the pump.
    pub error: oneshot::Receiver<LinkError>,
    task: JoinHandle<()>,
}

impl FramePump {
    /// Spawns the pump over the read half of a connection.
    pub fn spawn<R>(read: R, deadline: ReadDeadline) -> Self
    where
        R: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
    {
        // Capacity 1 keeps read-ahead to a single pending frame.
        let (frame_tx, frames) = mpsc::channel(1);
        let (error_tx, error) = oneshot::channel();
        let task = tokio::spawn(receive_messages(read, deadline, frame_tx, error_tx));
        Self { frames, error, task }
    }

    /// Stops the task and waits until it no longer touches the connection.
    pub async fn stop(&mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        // Covers a supervisor future that is dropped mid-stream.
        self.task.abort();
    }
}

async fn receive_messages<R>(
    mut read: R,
    mut deadline: ReadDeadline,
    frames: mpsc::Sender<Vec<u8>>,
    error: oneshot::Sender<LinkError>,
) where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let failure = loop {
        let next = match timeout_at(deadline.instant(), read.next()).await {
            Ok(next) => next,
            Err(_) => break LinkError::DeadlineExpired(deadline.margin()),
        };

        match next {
            None => break LinkError::Closed,
            Some(Err(e)) => break LinkError::Transport(e),
            Some(Ok(Message::Text(text))) => {
                if frames.send(text.as_bytes().to_vec()).await.is_err() {
                    // Supervisor is gone; nobody is left to report to.
                    return;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                log::warn!("[alpaca] received binary message from server");
            }
            Some(Ok(Message::Pong(_))) => deadline.on_pong(Instant::now()),
            Some(Ok(Message::Close(reason))) => {
                log::debug!("[alpaca] close frame received: {:?}", reason);
                break LinkError::Closed;
            }
            Some(Ok(_)) => {}
        }
    };

    log::error!("[alpaca] error during reading {{error:{}}}", failure);
    let _ = error.send(failure);
}
