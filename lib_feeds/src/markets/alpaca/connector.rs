//! Opens the WebSocket connection.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

use super::error::{FeedError, LinkError};

/// A live connection to the stream server.
pub type Connection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport settings applied to every dial.
pub fn websocket_config(max_message_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_size);
    config.max_frame_size = Some(max_message_size);
    config
}

/// Dials `endpoint`, failing if the upgrade takes longer than `dial_timeout`.
///
/// # Errors
/// - [`FeedError::DialRejected`] when the server answered the upgrade with a
///   non-101 response; status and body are kept.
/// - [`FeedError::Dial`] for every other failure, including the timeout.
pub async fn connect(
    endpoint: &str,
    dial_timeout: Duration,
    max_message_size: usize,
) -> Result<Connection, FeedError> {
    let dial = connect_async_with_config(endpoint, Some(websocket_config(max_message_size)), false);

    match timeout(dial_timeout, dial).await {
        // The upgrade response is dropped here; only the stream is kept.
        Ok(Ok((conn, _response))) => Ok(conn),
        Ok(Err(e)) => Err(dial_error(e)),
        Err(_) => Err(FeedError::Dial(LinkError::Timeout(dial_timeout))),
    }
}

fn dial_error(err: WsError) -> FeedError {
    match &err {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            let body = response
                .body()
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            FeedError::DialRejected {
                status,
                body,
                source: err,
            }
        }
        _ => FeedError::Dial(LinkError::Transport(err)),
    }
}
