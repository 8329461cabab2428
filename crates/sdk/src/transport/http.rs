//! HTTP request/response transport.
//!
//! Opening probes `GET {base}/health` with retries. Each frame is POSTed to
//! `{base}/rpc` on its own task and the response body is queued for
//! `receive`, so several calls can be in flight at once.

use super::Transport;
use crate::config::{HealthProbe, SessionConfig};
use crate::error::{SessionError, SessionResult};
use reqwest::{header, Client};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

pub struct HttpTransport {
    client: Client,
    rpc_url: Url,
    inbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    shutdown: CancellationToken,
    failure: Arc<Mutex<Option<String>>>,
}

impl HttpTransport {
    pub async fn connect(base_url: &str, config: &SessionConfig) -> SessionResult<Self> {
        let mut base = Url::parse(base_url)?;
        // Without a trailing slash `join` would replace the last path segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        // No client-wide timeout: call deadlines are enforced by the session.
        let client = Client::builder().build()?;
        let health_url = base.join("health")?;
        probe_health(&client, &health_url, config).await?;
        debug!(url = %health_url, "HTTP peer healthy");

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            client,
            rpc_url: base.join("rpc")?,
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            shutdown: CancellationToken::new(),
            failure: Arc::new(Mutex::new(None)),
        })
    }

    fn failure_reason(&self) -> String {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| "transport closed".to_string())
    }
}

/// `GET /health` until it succeeds, backing off on retryable failures.
async fn probe_health(client: &Client, url: &Url, config: &SessionConfig) -> SessionResult<()> {
    let probe = &config.health_probe;
    let mut retry = 0;

    loop {
        let outcome = client
            .get(url.clone())
            .timeout(config.connect_timeout)
            .send()
            .await
            .map_err(SessionError::from);
        let retryable = match &outcome {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => HealthProbe::retries_status(response.status().as_u16()),
            Err(e) => e.is_retryable(),
        };

        if retryable && retry < probe.retries {
            let delay = probe.delay(retry);
            warn!(
                url = %url,
                retry = retry + 1,
                delay_ms = delay.as_millis() as u64,
                "Health check failed, probing again"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
            continue;
        }

        return Err(match outcome {
            Ok(response) => SessionError::Connection(format!(
                "health check at {} returned {}",
                url,
                response.status()
            )),
            Err(e) => SessionError::Connection(format!("health check at {} failed: {}", url, e)),
        });
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, frame: String) -> SessionResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::ConnectionLost(self.failure_reason()));
        }

        let request = self
            .client
            .post(self.rpc_url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .body(frame);
        let inbound = self.inbound_tx.clone();
        let shutdown = self.shutdown.clone();
        let failure = self.failure.clone();

        tokio::spawn(async move {
            let exchange = async {
                let response = request.send().await?.error_for_status()?;
                response.text().await
            };

            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = exchange => match result {
                    Ok(body) => {
                        let _ = inbound.send(body);
                    }
                    // Only an unreachable peer or a rejected frame loses the
                    // transport. Other failures drop this frame and its call
                    // runs into its own deadline.
                    Err(e) if !(e.is_connect() || e.is_status()) => {
                        warn!(error = %e, "HTTP exchange failed, dropping frame");
                    }
                    Err(e) => {
                        warn!(error = %e, "HTTP exchange failed, closing transport");
                        failure
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .get_or_insert_with(|| format!("HTTP exchange failed: {}", e));
                        shutdown.cancel();
                    }
                },
            }
        });
        Ok(())
    }

    async fn receive(&self) -> SessionResult<String> {
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            frame = inbound.recv() => {
                frame.ok_or_else(|| SessionError::ConnectionLost("response queue closed".to_string()))
            }
            _ = self.shutdown.cancelled() => Err(SessionError::ConnectionLost(self.failure_reason())),
        }
    }

    async fn close(&self) {
        self.shutdown.cancel();
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionState};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string, header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(probe: HealthProbe) -> SessionConfig {
        SessionConfig::default().with_health_probe(probe)
    }

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "healthy"})),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_post_frame_and_receive_body() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .and(header_matcher("content-type", "application/json"))
            .and(body_string(r#"{"id":1,"method":"listTools"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":1,"success":true}"#))
            .mount(&server)
            .await;

        let transport = HttpTransport::connect(&server.uri(), &config(HealthProbe::once()))
            .await
            .unwrap();
        transport
            .send(r#"{"id":1,"method":"listTools"}"#.to_string())
            .await
            .unwrap();

        assert_eq!(transport.receive().await.unwrap(), r#"{"id":1,"success":true}"#);
    }

    #[tokio::test]
    async fn test_health_failure_is_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = HttpTransport::connect(&server.uri(), &config(HealthProbe::once())).await;
        assert!(matches!(result, Err(SessionError::Connection(_))));
    }

    #[tokio::test]
    async fn test_health_probe_retries_on_503() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let probe = HealthProbe {
            first_delay: Duration::from_millis(1),
            ..Default::default()
        };
        assert!(HttpTransport::connect(&server.uri(), &config(probe)).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_exchange_loses_connection() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = HttpTransport::connect(&server.uri(), &config(HealthProbe::once()))
            .await
            .unwrap();
        transport.send("{}".to_string()).await.unwrap();

        match transport.receive().await {
            Err(SessionError::ConnectionLost(reason)) => {
                assert!(reason.starts_with("HTTP exchange failed"))
            }
            other => panic!("expected connection loss, got {:?}", other),
        }
        assert!(transport.send("{}".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_slow_exchange_outlives_request_timeout() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id":1,"success":true}"#)
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;

        let config = config(HealthProbe::once()).with_request_timeout(Duration::from_millis(100));
        let transport = HttpTransport::connect(&server.uri(), &config).await.unwrap();
        transport.send(r#"{"id":1,"method":"listTools"}"#.to_string()).await.unwrap();

        // A caller giving up early leaves the transport open.
        assert!(tokio::time::timeout(Duration::from_millis(50), transport.receive())
            .await
            .is_err());
        transport.send(r#"{"id":2,"method":"listTools"}"#.to_string()).await.unwrap();

        assert_eq!(transport.receive().await.unwrap(), r#"{"id":1,"success":true}"#);
        assert_eq!(transport.receive().await.unwrap(), r#"{"id":1,"success":true}"#);
    }

    /// Answers like a peer: echoes the request id and stalls on the `slow` tool.
    fn peer_reply(request: &wiremock::Request) -> ResponseTemplate {
        let frame: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let id = frame["id"].clone();
        match frame["method"].as_str() {
            Some("initialize") => ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "success": true,
                "payload": {"protocolVersion": "tether/1", "server": {"name": "slow-peer", "version": "0"}}
            })),
            Some("callTool") if frame["name"] == "slow" => ResponseTemplate::new(200)
                .set_body_json(json!({"id": id, "success": true, "payload": "done"}))
                .set_delay(Duration::from_millis(400)),
            _ => ResponseTemplate::new(200).set_body_json(json!({"id": id, "success": true, "payload": "fast"})),
        }
    }

    #[tokio::test]
    async fn test_call_timeout_keeps_session_open() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(peer_reply)
            .mount(&server)
            .await;

        let config = config(HealthProbe::once()).with_request_timeout(Duration::from_millis(200));
        let transport = HttpTransport::connect(&server.uri(), &config).await.unwrap();
        let session = Session::connect("slow", Arc::new(transport), config).await.unwrap();

        let err = session
            .call_tool_with_timeout("slow", json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));

        // the stalled exchange completes after its caller gave up
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(session.state(), SessionState::Ready);

        let fast = session.call_tool("fast", json!({})).await.unwrap();
        assert_eq!(fast.payload, Some(json!("fast")));

        // a deadline past request_timeout is honoured as given
        let slow = session
            .call_tool_with_timeout("slow", json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(slow.payload, Some(json!("done")));

        session.close().await;
    }

    #[tokio::test]
    async fn test_base_url_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/peer/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transport = HttpTransport::connect(
            &format!("{}/peer", server.uri()),
            &config(HealthProbe::once()),
        )
        .await
        .unwrap();
        assert_eq!(transport.rpc_url.path(), "/peer/rpc");
    }
}
