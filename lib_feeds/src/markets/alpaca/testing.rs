//! In-memory transport halves for unit tests.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::stream::{self, Stream, StreamExt};
use futures_util::Sink;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<Message>,
    closes: usize,
}

/// Shared view of everything written to a [`RecordingSink`].
#[derive(Debug, Clone, Default)]
pub(crate) struct SentLog(Arc<Mutex<Recorded>>);

impl SentLog {
    pub(crate) fn sent(&self) -> Vec<Message> {
        self.0.lock().unwrap().sent.clone()
    }

    pub(crate) fn sent_text(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Message::Text(t) => Some(t.to_string()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }
}

/// Write half that records frames, optionally rejecting writes after a quota.
#[derive(Debug)]
pub(crate) struct RecordingSink {
    log: SentLog,
    quota: Option<usize>,
    // Past the quota, writes and closes stay pending instead of failing.
    stall: bool,
}

impl RecordingSink {
    pub(crate) fn new() -> (Self, SentLog) {
        Self::with_quota(None)
    }

    /// Rejects every write.
    pub(crate) fn failing() -> (Self, SentLog) {
        Self::with_quota(Some(0))
    }

    /// Accepts `n` writes, then rejects the rest.
    pub(crate) fn failing_after(n: usize) -> (Self, SentLog) {
        Self::with_quota(Some(n))
    }

    /// Accepts `n` writes, then never becomes writable or closable again,
    /// like a socket whose send buffer is full.
    pub(crate) fn stalled_after(n: usize) -> (Self, SentLog) {
        let (mut sink, log) = Self::with_quota(Some(n));
        sink.stall = true;
        (sink, log)
    }

    fn with_quota(quota: Option<usize>) -> (Self, SentLog) {
        let log = SentLog::default();
        (Self { log: log.clone(), quota, stall: false }, log)
    }

    fn over_quota(&self) -> bool {
        let written = self.log.0.lock().unwrap().sent.len();
        self.quota.is_some_and(|n| written >= n)
    }
}

impl Sink<Message> for RecordingSink {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        match (self.over_quota(), self.stall) {
            (false, _) => Poll::Ready(Ok(())),
            (true, false) => Poll::Ready(Err(WsError::ConnectionClosed)),
            (true, true) => Poll::Pending,
        }
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
        self.log.0.lock().unwrap().sent.push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        self.log.0.lock().unwrap().closes += 1;
        if self.stall && self.over_quota() {
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }
}

/// Read half that yields `frames` and then reports end of stream.
pub(crate) fn scripted(
    frames: Vec<Result<Message, WsError>>,
) -> impl Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static {
    stream::iter(frames)
}

/// Read half that yields `frames` and then stays silent forever.
pub(crate) fn scripted_then_silent(
    frames: Vec<Result<Message, WsError>>,
) -> impl Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static {
    stream::iter(frames).chain(stream::pending())
}

/// Read half that yields `frames` and then answers with a pong every 10ms.
pub(crate) fn scripted_then_pongs(
    frames: Vec<Result<Message, WsError>>,
) -> impl Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static {
    let pongs = stream::repeat_with(|| Ok(Message::Pong(Default::default()))).then(|pong| async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        pong
    });
    Box::pin(stream::iter(frames).chain(pongs))
}

pub(crate) fn text(s: &str) -> Result<Message, WsError> {
    Ok(Message::text(s))
}

pub(crate) fn binary(bytes: &[u8]) -> Result<Message, WsError> {
    Ok(Message::binary(bytes.to_vec()))
}
