//! Frame transports between a session and its peer.
//!
//! A transport moves opaque text frames; correlation lives in
//! [`Session`](crate::Session). `send` and `receive` may be called
//! concurrently, and `close` unblocks a pending `receive`.

pub mod http;
pub mod memory;
pub mod stdio;
pub mod websocket;

pub use http::HttpTransport;
pub use memory::{MemoryPeer, MemoryTransport};
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;

use crate::config::{SessionConfig, TransportConfig};
use crate::error::SessionResult;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one frame to the peer.
    async fn send(&self, frame: String) -> SessionResult<()>;

    /// Wait for the next inbound frame. Fails with `ConnectionLost` once the
    /// peer hangs up or after [`close`](Transport::close).
    async fn receive(&self) -> SessionResult<String>;

    /// Release the underlying connection. Safe to call more than once.
    async fn close(&self);

    fn kind(&self) -> &'static str;
}

/// Open the transport described by `config`.
pub async fn open(
    config: &TransportConfig,
    session: &SessionConfig,
) -> SessionResult<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match config {
        TransportConfig::Stdio { command, args } => Arc::new(
            StdioTransport::spawn(command, args)?.with_shutdown_grace(session.shutdown_grace),
        ),
        TransportConfig::WebSocket { url } => Arc::new(WebSocketTransport::connect(url).await?),
        TransportConfig::Http { url } => Arc::new(HttpTransport::connect(url, session).await?),
    };
    Ok(transport)
}
