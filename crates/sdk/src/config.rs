//! Configuration types for tether sessions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How to reach a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Spawn a child process and speak newline-delimited frames over its pipes.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Connect to a WebSocket endpoint (`ws://` or `wss://`).
    WebSocket { url: String },
    /// POST each frame to `{url}/rpc`; `{url}/health` must answer first.
    Http { url: String },
}

impl TransportConfig {
    /// Short name of the transport kind, as used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::WebSocket { .. } => "websocket",
            Self::Http { .. } => "http",
        }
    }
}

/// Session-level timeouts and the HTTP health-probe policy.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default deadline for a single call.
    pub request_timeout: Duration,
    /// Deadline for opening the transport plus the handshake.
    pub connect_timeout: Duration,
    /// How long a stdio child gets to exit after stdin closes.
    pub shutdown_grace: Duration,
    pub health_probe: HealthProbe,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
            health_probe: HealthProbe::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_health_probe(mut self, probe: HealthProbe) -> Self {
        self.health_probe = probe;
        self
    }
}

/// How an HTTP transport waits for `GET /health` before it is usable.
///
/// Delays double after every failed probe, starting at `first_delay` and
/// never exceeding `max_delay`.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    /// Probes after the first one.
    pub retries: u32,
    pub first_delay: Duration,
    pub max_delay: Duration,
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self {
            retries: 3,
            first_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl HealthProbe {
    /// A single probe; the first failure is final.
    pub fn once() -> Self {
        Self {
            retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.first_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay)
    }

    /// Rate limiting and server-side errors are worth another probe; any
    /// other status means the endpoint is wrong.
    pub fn retries_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_delay_doubles_up_to_max() {
        let probe = HealthProbe {
            max_delay: Duration::from_millis(500),
            ..Default::default()
        };

        assert_eq!(probe.delay(0), Duration::from_millis(100));
        assert_eq!(probe.delay(2), Duration::from_millis(400));
        assert_eq!(probe.delay(3), Duration::from_millis(500));
        assert_eq!(probe.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_probe_retries_only_transient_statuses() {
        assert!(HealthProbe::retries_status(503));
        assert!(HealthProbe::retries_status(429));
        assert!(!HealthProbe::retries_status(404));
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();

        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.health_probe.retries, 3);
    }

    #[test]
    fn test_transport_config_from_json() {
        let stdio: TransportConfig =
            serde_json::from_str(r#"{"type":"stdio","command":"tether-mcp","args":["--backend","sql"]}"#)
                .unwrap();
        assert_eq!(stdio.kind(), "stdio");
        assert_eq!(
            stdio,
            TransportConfig::Stdio {
                command: "tether-mcp".to_string(),
                args: vec!["--backend".to_string(), "sql".to_string()],
            }
        );

        let ws: TransportConfig =
            serde_json::from_str(r#"{"type":"websocket","url":"ws://localhost:8765/mcp"}"#).unwrap();
        assert_eq!(ws.kind(), "websocket");
    }
}
