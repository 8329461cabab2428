//! WebSocket transport: one text message per frame.

use super::Transport;
use crate::error::{SessionError, SessionResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    url: String,
    write: Mutex<SplitSink<WsStream, Message>>,
    read: Mutex<SplitStream<WsStream>>,
    shutdown: CancellationToken,
}

impl WebSocketTransport {
    /// Connect and complete the upgrade handshake.
    pub async fn connect(url: &str) -> SessionResult<Self> {
        debug!(url, "Connecting to WebSocket");

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::Connection(format!("WebSocket connect to {} failed: {}", url, e)))?;
        let (write, read) = ws_stream.split();

        info!(url, "WebSocket connected");
        Ok(Self {
            url: url.to_string(),
            write: Mutex::new(write),
            read: Mutex::new(read),
            shutdown: CancellationToken::new(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, frame: String) -> SessionResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::ConnectionLost("transport closed".to_string()));
        }
        self.write
            .lock()
            .await
            .send(Message::Text(frame))
            .await
            .map_err(|e| SessionError::ConnectionLost(format!("WebSocket send failed: {}", e)))
    }

    async fn receive(&self) -> SessionResult<String> {
        let mut read = self.read.lock().await;
        loop {
            let msg = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Err(SessionError::ConnectionLost("transport closed".to_string()));
                }
                msg = read.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(text),
                    Err(_) => warn!(url = %self.url, "Discarding non-UTF-8 binary message"),
                },
                Some(Ok(Message::Close(_))) => {
                    info!(url = %self.url, "WebSocket connection closed by peer");
                    return Err(SessionError::ConnectionLost("peer closed the socket".to_string()));
                }
                // Pong replies are queued by tungstenite and flushed on the next send.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(SessionError::ConnectionLost(format!("WebSocket error: {}", e)));
                }
                None => {
                    return Err(SessionError::ConnectionLost("WebSocket stream ended".to_string()));
                }
            }
        }
    }

    async fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();

        let mut write = self.write.lock().await;
        if let Err(e) = write.send(Message::Close(None)).await {
            debug!(url = %self.url, error = %e, "WebSocket close frame not sent");
        }
        let _ = write.close().await;
    }

    fn kind(&self) -> &'static str {
        "websocket"
    }
}
