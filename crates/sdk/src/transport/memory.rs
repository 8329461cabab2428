//! In-process transport pair for tests and embedding.

use super::Transport;
use crate::error::{SessionError, SessionResult};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Session side of an in-memory channel pair.
pub struct MemoryTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    shutdown: CancellationToken,
}

/// Peer side of an in-memory channel pair. Dropping it hangs up the
/// transport.
pub struct MemoryPeer {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (to_peer, from_session) = mpsc::unbounded_channel();
        let (to_session, from_peer) = mpsc::unbounded_channel();

        let transport = MemoryTransport {
            outbound: Mutex::new(Some(to_peer)),
            inbound: tokio::sync::Mutex::new(from_peer),
            shutdown: CancellationToken::new(),
        };
        let peer = MemoryPeer {
            inbound: from_session,
            outbound: to_session,
        };
        (transport, peer)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: String) -> SessionResult<()> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref() {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| SessionError::ConnectionLost("peer hung up".to_string())),
            None => Err(SessionError::ConnectionLost("transport closed".to_string())),
        }
    }

    async fn receive(&self) -> SessionResult<String> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                Err(SessionError::ConnectionLost("transport closed".to_string()))
            }
            frame = inbound.recv() => {
                frame.ok_or_else(|| SessionError::ConnectionLost("peer hung up".to_string()))
            }
        }
    }

    async fn close(&self) {
        self.shutdown.cancel();
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

impl MemoryPeer {
    /// Next frame from the session, or `None` once it has closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Send a frame to the session. Returns `false` if it is gone.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.outbound.send(frame.into()).is_ok()
    }

    /// Split into independently owned halves so replies can be sent from
    /// other tasks.
    pub fn split(self) -> (mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<String>) {
        (self.inbound, self.outbound)
    }
}
