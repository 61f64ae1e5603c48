//! # Liveness Monitor
//!
//! Keeps an otherwise idle connection provably alive. The supervisor writes a
//! ping every `ping_period`; the pong that comes back re-arms the read deadline
//! to `now + ping_period * 6/5`. A connection that delivers no pong inside that
//! margin fails its next read, which the pump reports as a stream error.
//!
//! There is no heartbeat task: [`LivenessMonitor::tick`] is one branch of the
//! supervisor's `select!`, and [`ReadDeadline`] is owned by the pump, the only
//! reader, so neither needs a lock.

use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::error::LinkError;

/// Send timeout for a single ping.
pub const PING_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Time a connection may stay silent: slightly longer than one ping period.
pub fn liveness_margin(ping_period: Duration) -> Duration {
    ping_period * 6 / 5
}

/// Read deadline armed at `now`.
pub fn liveness_deadline(now: Instant, ping_period: Duration) -> Instant {
    now + liveness_margin(ping_period)
}

/// The point in time after which silence on the read path means the link is dead.
#[derive(Debug, Clone, Copy)]
pub struct ReadDeadline {
    ping_period: Duration,
    at: Instant,
}

impl ReadDeadline {
    /// Arms a deadline one liveness margin after `now`.
    pub fn armed_at(now: Instant, ping_period: Duration) -> Self {
        Self {
            ping_period,
            at: liveness_deadline(now, ping_period),
        }
    }

    /// Pong handler: extends the deadline beyond the next ping.
    pub fn on_pong(&mut self, now: Instant) {
        self.at = liveness_deadline(now, self.ping_period);
    }

    /// Current deadline.
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Length of the silence window.
    pub fn margin(&self) -> Duration {
        liveness_margin(self.ping_period)
    }
}

/// Periodic ping emitter driven by the supervisor loop.
#[derive(Debug)]
pub struct LivenessMonitor {
    ticker: Interval,
}

impl LivenessMonitor {
    /// Starts the ticker; the first tick fires one full period from now.
    pub fn start(ping_period: Duration) -> Self {
        let mut ticker = interval_at(Instant::now() + ping_period, ping_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker }
    }

    /// Resolves at the next ping time.
    pub async fn tick(&mut self) {
        self.ticker.tick().await;
    }

    /// Writes one ping control frame, giving up after [`PING_WRITE_TIMEOUT`].
    pub async fn ping<W>(&self, write: &mut W) -> Result<(), LinkError>
    where
        W: Sink<Message, Error = WsError> + Unpin,
    {
        match timeout(PING_WRITE_TIMEOUT, write.send(Message::Ping(Default::default()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LinkError::Transport(e)),
            Err(_) => Err(LinkError::Timeout(PING_WRITE_TIMEOUT)),
        }
    }
}
