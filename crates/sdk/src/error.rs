//! Error types for tether sessions and transports.

use crate::session::SessionState;
use std::time::Duration;
use tether_core::RemoteFailure;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by a [`Session`](crate::Session) or its transport.
///
/// Peer-reported call failures are not errors here: they come back as a
/// [`CallResult`](tether_core::CallResult) with `success == false`. The
/// [`Remote`](SessionError::Remote) variant exists for callers that convert
/// such results with `?`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport could not be opened or the handshake failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The transport closed while calls were outstanding.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A call was made on a session that is not ready.
    #[error("Session is not connected (state: {state})")]
    NotConnected { state: SessionState },

    /// No response arrived before the call's deadline.
    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        method: &'static str,
        timeout: Duration,
    },

    /// The peer reported a failure for this call.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteFailure),

    /// A well-formed frame carried an unexpected payload.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl SessionError {
    /// Whether the session that produced this error can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionLost(_) | Self::NotConnected { .. }
        )
    }

    /// Check if this error is worth retrying at the transport level.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
