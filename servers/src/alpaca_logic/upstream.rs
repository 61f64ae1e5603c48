use crate::alpaca_logic::config::Config;
use lib_feeds::markets::alpaca::{AlpacaWebSocket, ClientConfig};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, Instant};

/// Exponential backoff between upstream sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_delay: Duration::from_millis(config.reconnect_base_delay_ms.unwrap_or(1000)),
            max_delay: Duration::from_millis(config.reconnect_max_delay_ms.unwrap_or(60000)),
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// A session that stayed up this long starts the backoff over.
    fn is_stable(&self, session: Duration) -> bool {
        session >= self.max_delay
    }
}

/// Keeps one Alpaca session running, reconnecting after failures, until
/// shutdown is signalled or the frame consumer goes away.
pub async fn run(
    client: ClientConfig,
    policy: ReconnectPolicy,
    output: mpsc::Sender<Vec<u8>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let feed = AlpacaWebSocket::new(client, output);
    let mut attempt: u32 = 0;

    loop {
        log::info!(
            "Connecting to Alpaca: {} streams={:?}",
            feed.config().endpoint,
            feed.config().topics
        );
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Upstream shutting down...");
                return;
            }
            outcome = feed.listen() => outcome,
        };

        let err = match outcome {
            Ok(()) => {
                log::info!("Frame consumer closed, upstream stopping.");
                return;
            }
            Err(err) => err,
        };

        if policy.is_stable(started.elapsed()) {
            attempt = 0;
        }
        let delay = policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        log::error!("Upstream {:?} failure: {}. Reconnecting in {:?}", err.kind(), err, delay);

        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Upstream shutting down...");
                return;
            }
            _ = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use lib_feeds::markets::alpaca::Credentials;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn policy(base_ms: u64, max_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    fn client(endpoint: String) -> ClientConfig {
        ClientConfig::new(
            endpoint,
            Credentials::new("AK", "SK"),
            vec!["T.VOO".to_string()],
        )
        .with_dial_timeout(Duration::from_millis(200))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy(100, 1000);
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(800));
        assert_eq!(p.delay(4), Duration::from_millis(1000));
        assert_eq!(p.delay(40), Duration::from_millis(1000));
    }

    #[test]
    fn long_sessions_reset_backoff() {
        let p = policy(100, 1000);
        assert!(!p.is_stable(Duration::from_millis(999)));
        assert!(p.is_stable(Duration::from_secs(1)));
    }

    #[test]
    fn policy_reads_config() {
        let cfg = Config {
            reconnect_base_delay_ms: Some(250),
            reconnect_max_delay_ms: None,
            ..Default::default()
        };
        assert_eq!(ReconnectPolicy::from_config(&cfg), policy(250, 60000));
    }

    #[tokio::test]
    async fn shutdown_interrupts_retry_loop() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let (tx, _rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run(client(endpoint), policy(10_000, 10_000), tx, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("upstream must stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn reconnects_and_stops_when_consumer_leaves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());

        // First connection is dropped mid-handshake, the second one streams a frame.
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);

            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            for reply in [
                r#"[{"T":"success","msg":"authenticated"}]"#,
                r#"[{"T":"subscription","streams":["T.VOO"]}]"#,
            ] {
                let _ = ws.next().await;
                ws.send(Message::text(reply)).await.unwrap();
            }
            ws.send(Message::text(r#"[{"T":"t","S":"VOO"}]"#)).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (tx, mut rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run(client(endpoint), policy(20, 100), tx, shutdown_rx));

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frame after reconnect")
            .unwrap();
        assert_eq!(frame, br#"[{"T":"t","S":"VOO"}]"#.to_vec());

        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("upstream must stop once the consumer is gone")
            .unwrap();
    }
}
