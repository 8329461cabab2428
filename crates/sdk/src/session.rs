//! Request/response correlation over a [`Transport`].
//!
//! A session owns one transport and one reader task. Every outbound request
//! gets a fresh id and a pending slot; the reader routes each inbound
//! response to the slot with the matching id. A slot is resolved exactly
//! once: by its response, by connection loss, or by its deadline.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tether_core::protocol::{ListResourcesResult, ListToolsResult, PROTOCOL_VERSION};
use tether_core::{
    CallResult, Catalog, InitializeResult, PeerInfo, Request, RequestBody, ResourceDescriptor,
    Response, ToolDescriptor,
};
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct PendingCall {
    method: &'static str,
    slot: oneshot::Sender<SessionResult<Response>>,
}

/// State shared between the session handle and its reader task.
struct Shared {
    state: Mutex<SessionState>,
    pending: Mutex<HashMap<u64, PendingCall>>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != SessionState::Closed {
            *state = next;
        }
    }

    /// Move to `Closing` unless already closing or closed. Returns the state
    /// that was replaced.
    fn begin_closing(&self) -> SessionState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if !matches!(previous, SessionState::Closing | SessionState::Closed) {
            *state = SessionState::Closing;
        }
        previous
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve every outstanding call with `ConnectionLost(reason)`.
    fn fail_all(&self, reason: &str) -> usize {
        let mut pending = self.pending();
        let count = pending.len();
        for (id, call) in pending.drain() {
            debug!(id, method = call.method, reason, "failing pending call");
            let _ = call
                .slot
                .send(Err(SessionError::ConnectionLost(reason.to_string())));
        }
        count
    }

    /// Hand an inbound frame to the call waiting for it.
    fn route(&self, frame: &str) {
        let response: Response = match serde_json::from_str(frame) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "discarding undecodable frame");
                return;
            }
        };
        let Some(id) = response.id else {
            warn!(error = ?response.error, "discarding response without id");
            return;
        };

        // Resolve while holding the lock so a timed-out waiter that finds
        // its entry gone can rely on the slot already being filled.
        let mut pending = self.pending();
        match pending.remove(&id) {
            Some(call) => {
                debug!(id, method = call.method, success = response.success, "response routed");
                let _ = call.slot.send(Ok(response));
            }
            None => warn!(id, "discarding response for unknown or expired call"),
        }
    }
}

async fn read_loop(transport: Arc<dyn Transport>, shared: Arc<Shared>) {
    loop {
        match transport.receive().await {
            Ok(frame) => shared.route(&frame),
            Err(e) => {
                let reason = match e {
                    SessionError::ConnectionLost(reason) => reason,
                    other => other.to_string(),
                };
                let previous = shared.begin_closing();
                if matches!(previous, SessionState::Ready | SessionState::Connecting) {
                    warn!(reason = %reason, "connection lost");
                    let failed = shared.fail_all(&reason);
                    if failed > 0 {
                        warn!(failed, "pending calls failed by connection loss");
                    }
                    transport.close().await;
                    shared.set_state(SessionState::Closed);
                } else {
                    shared.fail_all(&reason);
                }
                return;
            }
        }
    }
}

/// A connection to one peer.
pub struct Session {
    id: Uuid,
    name: String,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    config: SessionConfig,
    next_id: AtomicU64,
    server: OnceLock<PeerInfo>,
    tools: OnceCell<Arc<Catalog<ToolDescriptor>>>,
    resources: OnceCell<Arc<Catalog<ResourceDescriptor>>>,
    reader: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl Session {
    /// Start the reader task on an already opened transport and perform the
    /// `initialize` handshake. The session is ready when this returns.
    ///
    /// The session span is created under the caller's current span.
    pub async fn connect(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let name = name.into();
        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", name = %name, session_id = %id, transport = transport.kind());

        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Disconnected),
            pending: Mutex::new(HashMap::new()),
        });
        let session = Self {
            id,
            name,
            transport,
            shared,
            config,
            next_id: AtomicU64::new(1),
            server: OnceLock::new(),
            tools: OnceCell::new(),
            resources: OnceCell::new(),
            reader: tokio::sync::Mutex::new(None),
            span,
        };

        session.shared.set_state(SessionState::Connecting);
        let reader = tokio::spawn(
            read_loop(session.transport.clone(), session.shared.clone())
                .instrument(session.span.clone()),
        );
        *session.reader.lock().await = Some(reader);

        let handshake = async {
            let body = RequestBody::Initialize {
                protocol_version: PROTOCOL_VERSION.to_string(),
                client: PeerInfo::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            };
            let response = session.roundtrip(body, session.config.connect_timeout).await?;
            decode_payload::<InitializeResult>(response)
        }
        .instrument(session.span.clone())
        .await;

        match handshake {
            Ok(init) => {
                if init.protocol_version != PROTOCOL_VERSION {
                    warn!(
                        parent: &session.span,
                        peer_version = %init.protocol_version,
                        "peer speaks a different protocol version"
                    );
                }
                info!(
                    parent: &session.span,
                    peer = %init.server.name,
                    peer_version = %init.server.version,
                    tools = init.capabilities.tools,
                    resources = init.capabilities.resources,
                    "session ready"
                );
                let _ = session.server.set(init.server);
                session.shared.set_state(SessionState::Ready);
                Ok(session)
            }
            Err(e) => {
                let name = session.name.clone();
                session.close().await;
                Err(SessionError::Connection(format!(
                    "handshake with '{}' failed: {}",
                    name, e
                )))
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    /// Identity the peer reported during the handshake.
    pub fn server_info(&self) -> Option<&PeerInfo> {
        self.server.get()
    }

    fn ensure_ready(&self) -> SessionResult<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            state => Err(SessionError::NotConnected { state }),
        }
    }

    /// Tool catalog, fetched on first use and cached afterwards.
    pub async fn list_tools(&self) -> SessionResult<Arc<Catalog<ToolDescriptor>>> {
        self.ensure_ready()?;
        self.tools
            .get_or_try_init(|| async {
                let response = self
                    .roundtrip(RequestBody::ListTools, self.config.request_timeout)
                    .await?;
                let result: ListToolsResult = decode_payload(response)?;
                debug!(count = result.tools.len(), "tool catalog fetched");
                Ok::<_, SessionError>(Arc::new(Catalog::new(result.tools)))
            })
            .instrument(self.span.clone())
            .await
            .cloned()
    }

    /// Resource catalog, fetched on first use and cached afterwards.
    pub async fn list_resources(&self) -> SessionResult<Arc<Catalog<ResourceDescriptor>>> {
        self.ensure_ready()?;
        self.resources
            .get_or_try_init(|| async {
                let response = self
                    .roundtrip(RequestBody::ListResources, self.config.request_timeout)
                    .await?;
                let result: ListResourcesResult = decode_payload(response)?;
                debug!(count = result.resources.len(), "resource catalog fetched");
                Ok::<_, SessionError>(Arc::new(Catalog::new(result.resources)))
            })
            .instrument(self.span.clone())
            .await
            .cloned()
    }

    /// Invoke a tool. A failure reported by the peer is `Ok` with
    /// `success == false`; only transport problems are `Err`.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> SessionResult<CallResult> {
        self.call_tool_with_timeout(name, arguments, self.config.request_timeout)
            .await
    }

    pub async fn call_tool_with_timeout(
        &self,
        name: impl Into<String>,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> SessionResult<CallResult> {
        self.ensure_ready()?;
        let body = RequestBody::CallTool {
            name: name.into(),
            arguments,
        };
        let response = self
            .roundtrip(body, timeout)
            .instrument(self.span.clone())
            .await?;
        Ok(response.into_call_result())
    }

    /// Read a resource by URI. Same result discipline as
    /// [`call_tool`](Session::call_tool).
    pub async fn read_resource(&self, uri: impl Into<String>) -> SessionResult<CallResult> {
        self.read_resource_with_timeout(uri, self.config.request_timeout)
            .await
    }

    pub async fn read_resource_with_timeout(
        &self,
        uri: impl Into<String>,
        timeout: Duration,
    ) -> SessionResult<CallResult> {
        self.ensure_ready()?;
        let body = RequestBody::ReadResource { uri: uri.into() };
        let response = self
            .roundtrip(body, timeout)
            .instrument(self.span.clone())
            .await?;
        Ok(response.into_call_result())
    }

    /// Fail outstanding calls, close the transport and stop the reader.
    /// Safe to call more than once.
    pub async fn close(&self) {
        if self.state() == SessionState::Closed {
            return;
        }
        let previous = self.shared.begin_closing();
        debug!(parent: &self.span, from = %previous, "closing session");

        let failed = self.shared.fail_all("session closed");
        if failed > 0 {
            debug!(parent: &self.span, failed, "pending calls failed by close");
        }
        self.transport.close().await;

        if let Some(reader) = self.reader.lock().await.take() {
            if let Err(e) = reader.await {
                warn!(parent: &self.span, error = %e, "session reader task failed");
            }
        }

        self.shared.set_state(SessionState::Closed);
        info!(parent: &self.span, "session closed");
    }

    async fn roundtrip(&self, body: RequestBody, timeout: Duration) -> SessionResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let method = body.method();
        let frame = serde_json::to_string(&Request::new(id, body))?;
        let (slot, mut rx) = oneshot::channel();

        {
            // Checked under the pending lock so close() either sees this
            // entry when draining or we see its state change.
            let mut pending = self.shared.pending();
            let state = self.shared.state();
            if !matches!(state, SessionState::Ready | SessionState::Connecting) {
                return Err(SessionError::NotConnected { state });
            }
            pending.insert(id, PendingCall { method, slot });
        }

        debug!(id, method, "sending request");
        if let Err(e) = self.transport.send(frame).await {
            self.shared.pending().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::ConnectionLost(
                "pending call dropped".to_string(),
            )),
            Err(_) => {
                if self.shared.pending().remove(&id).is_some() {
                    warn!(id, method, timeout_ms = timeout.as_millis() as u64, "request timed out");
                    Err(SessionError::Timeout { method, timeout })
                } else {
                    // The reader won the race and already filled the slot.
                    rx.try_recv().unwrap_or(Err(SessionError::Timeout { method, timeout }))
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Without close() the reader would keep the transport alive.
        if let Ok(mut reader) = self.reader.try_lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }
}

fn decode_payload<T: DeserializeOwned>(response: Response) -> SessionResult<T> {
    let payload = response.into_call_result().into_result()?;
    serde_json::from_value(payload)
        .map_err(|e| SessionError::Protocol(format!("unexpected payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryPeer, MemoryTransport};
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use tether_core::ErrorCode;
    use tether_mcp::backends::{echo, sql};
    use tether_mcp::Dispatcher;

    /// Answer every frame with `dispatcher`, counting requests per method.
    fn serve(
        mut peer: MemoryPeer,
        dispatcher: Dispatcher,
    ) -> Arc<Mutex<HashMap<String, usize>>> {
        let counts = Arc::new(Mutex::new(HashMap::new()));
        let seen = counts.clone();
        tokio::spawn(async move {
            while let Some(frame) = peer.recv().await {
                if let Ok(request) = serde_json::from_str::<Value>(&frame) {
                    let method = request["method"].as_str().unwrap_or_default().to_string();
                    *seen.lock().unwrap().entry(method).or_insert(0) += 1;
                }
                let response = dispatcher.handle_frame(&frame).await.unwrap();
                if !peer.send(response) {
                    break;
                }
            }
        });
        counts
    }

    async fn connect_to(dispatcher: Dispatcher) -> (Session, Arc<Mutex<HashMap<String, usize>>>) {
        let (transport, peer) = MemoryTransport::pair();
        let counts = serve(peer, dispatcher);
        let session = Session::connect("test", Arc::new(transport), SessionConfig::default())
            .await
            .unwrap();
        (session, counts)
    }

    /// Peer that answers the handshake and then hands frames to the test.
    async fn connect_manual() -> (Session, tokio::sync::mpsc::UnboundedReceiver<String>, tokio::sync::mpsc::UnboundedSender<String>) {
        let (transport, peer) = MemoryTransport::pair();
        let (mut inbound, outbound) = peer.split();
        let handshake_reply = outbound.clone();
        let handshake = tokio::spawn(async move {
            let frame = inbound.recv().await.unwrap();
            let request: Request = serde_json::from_str(&frame).unwrap();
            let init = json!({
                "protocolVersion": PROTOCOL_VERSION,
                "server": {"name": "manual", "version": "0"},
                "capabilities": {"tools": true, "resources": true}
            });
            handshake_reply
                .send(serde_json::to_string(&Response::success(request.id, init)).unwrap())
                .unwrap();
            inbound
        });

        let session = Session::connect("manual", Arc::new(transport), SessionConfig::default())
            .await
            .unwrap();
        let inbound = handshake.await.unwrap();
        (session, inbound, outbound)
    }

    #[tokio::test]
    async fn test_handshake_records_server_info() {
        let (session, _) = connect_to(echo::dispatcher()).await;

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.server_info().unwrap().name, "echo-mcp");
        assert_eq!(session.transport_kind(), "memory");
    }

    #[tokio::test]
    async fn test_echo_scenario() {
        let (session, _) = connect_to(echo::dispatcher()).await;

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert!(tools.contains("echo"));

        let ok = session.call_tool("echo", json!({"text": "hi"})).await.unwrap();
        assert!(ok.success);
        assert_eq!(ok.payload, Some(json!("hi")));

        let missing = session.call_tool("echo", json!({})).await.unwrap();
        assert!(!missing.success);
        assert_eq!(missing.code, Some(ErrorCode::InvalidArguments));
        assert_eq!(missing.error.as_deref(), Some("missing required field: text"));

        let err = missing.into_result().unwrap_err();
        assert_eq!(err.message, "missing required field: text");
    }

    #[tokio::test]
    async fn test_unknown_tool_leaves_session_usable() {
        let (session, _) = connect_to(echo::dispatcher()).await;

        let unknown = session.call_tool("nope", json!({})).await.unwrap();
        assert_eq!(unknown.code, Some(ErrorCode::UnknownTool));
        assert_eq!(unknown.error.as_deref(), Some("Unknown tool: nope"));

        let resource = session.read_resource("echo://missing").await.unwrap();
        assert_eq!(resource.code, Some(ErrorCode::UnknownResource));

        let ok = session.call_tool("echo", json!({"text": "still here"})).await.unwrap();
        assert!(ok.success);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_sql_tables_before_and_after_connect() {
        let (session, _) = connect_to(sql::dispatcher()).await;

        let before = session.read_resource("sql://tables").await.unwrap();
        assert!(!before.success);
        assert_eq!(before.error.as_deref(), Some("No database connection"));

        let connected = session
            .call_tool("connect_database", json!({"server": "localhost", "database": "test_db"}))
            .await
            .unwrap();
        assert!(connected.success);

        let after = session.read_resource("sql://tables").await.unwrap();
        assert!(after.success);
        assert!(after.payload.unwrap()["tables"].as_array().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_discovery_is_one_round_trip() {
        let (session, counts) = connect_to(echo::dispatcher()).await;

        let (a, b) = tokio::join!(session.list_tools(), session.list_tools());
        let c = session.list_tools().await.unwrap();
        assert!(Arc::ptr_eq(&a.unwrap(), &c));
        assert!(Arc::ptr_eq(&b.unwrap(), &c));

        session.list_resources().await.unwrap();
        session.list_resources().await.unwrap();

        let counts = counts.lock().unwrap();
        assert_eq!(counts.get("listTools"), Some(&1));
        assert_eq!(counts.get("listResources"), Some(&1));
    }

    #[tokio::test]
    async fn test_failed_discovery_is_not_cached() {
        let (session, mut inbound, outbound) = connect_manual().await;

        let first = tokio::spawn(async move {
            let frame = inbound.recv().await.unwrap();
            let request: Request = serde_json::from_str(&frame).unwrap();
            let failure = Response::failure(Some(request.id), ErrorCode::HandlerFailed, "busy");
            outbound.send(serde_json::to_string(&failure).unwrap()).unwrap();

            let frame = inbound.recv().await.unwrap();
            let request: Request = serde_json::from_str(&frame).unwrap();
            let ok = Response::success(request.id, json!({"tools": []}));
            outbound.send(serde_json::to_string(&ok).unwrap()).unwrap();
            (inbound, outbound)
        });

        assert!(matches!(
            session.list_tools().await,
            Err(SessionError::Remote(_))
        ));
        assert!(session.list_tools().await.unwrap().is_empty());
        first.await.unwrap();
    }

    #[tokio::test]
    async fn test_responses_route_by_id_out_of_order() {
        let (session, mut inbound, outbound) = connect_manual().await;

        let peer = tokio::spawn(async move {
            let first: Request = serde_json::from_str(&inbound.recv().await.unwrap()).unwrap();
            let second: Request = serde_json::from_str(&inbound.recv().await.unwrap()).unwrap();
            for request in [&second, &first] {
                let RequestBody::CallTool { name, .. } = &request.body else {
                    panic!("expected callTool");
                };
                let reply = Response::success(request.id, json!(name));
                outbound.send(serde_json::to_string(&reply).unwrap()).unwrap();
            }
        });

        let (a, b) = tokio::join!(
            session.call_tool("first", json!({})),
            session.call_tool("second", json!({}))
        );
        assert_eq!(a.unwrap().payload, Some(json!("first")));
        assert_eq!(b.unwrap().payload, Some(json!("second")));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_resolves_only_that_call() {
        let (session, mut inbound, outbound) = connect_manual().await;

        let peer = tokio::spawn(async move {
            let slow: Request = serde_json::from_str(&inbound.recv().await.unwrap()).unwrap();
            let fast: Request = serde_json::from_str(&inbound.recv().await.unwrap()).unwrap();
            outbound
                .send(serde_json::to_string(&Response::success(fast.id, json!("fast"))).unwrap())
                .unwrap();
            (slow, inbound, outbound)
        });

        let slow = session.call_tool_with_timeout("slow", json!({}), Duration::from_millis(50));
        let fast = async {
            tokio::task::yield_now().await;
            session.call_tool("fast", json!({})).await
        };
        let (slow, fast) = tokio::join!(slow, fast);

        assert!(matches!(
            slow,
            Err(SessionError::Timeout { method: "callTool", .. })
        ));
        assert_eq!(fast.unwrap().payload, Some(json!("fast")));

        // A late reply for the expired call is discarded.
        let (slow_request, _inbound, outbound) = peer.await.unwrap();
        outbound
            .send(serde_json::to_string(&Response::success(slow_request.id, json!("late"))).unwrap())
            .unwrap();
        let next = session.call_tool_with_timeout("x", json!({}), Duration::from_millis(50)).await;
        assert!(matches!(next, Err(SessionError::Timeout { .. })));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_exactly_once_under_timeout_race() {
        let resolved = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let (session, mut inbound, outbound) = connect_manual().await;
            let session = Arc::new(session);

            let responder = tokio::spawn(async move {
                let request: Request =
                    serde_json::from_str(&inbound.recv().await.unwrap()).unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                let _ = outbound.send(
                    serde_json::to_string(&Response::success(request.id, json!("ok"))).unwrap(),
                );
                (inbound, outbound)
            });

            let result = session
                .call_tool_with_timeout("race", json!({}), Duration::from_millis(1))
                .await;
            match result {
                Ok(_) | Err(SessionError::Timeout { .. }) => {
                    resolved.fetch_add(1, Ordering::SeqCst);
                }
                Err(other) => panic!("unexpected resolution: {:?}", other),
            }
            let _peer = responder.await.unwrap();
            assert!(session.shared.pending().is_empty());
            session.close().await;
        }
        assert_eq!(resolved.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_close_resolves_all_pending() {
        let (session, _inbound, _outbound) = connect_manual().await;
        let session = Arc::new(session);

        let calls: Vec<_> = (0..5)
            .map(|i| {
                let session = session.clone();
                tokio::spawn(async move { session.call_tool(format!("t{}", i), json!({})).await })
            })
            .collect();

        while session.shared.pending().len() < 5 {
            tokio::task::yield_now().await;
        }
        session.close().await;

        for call in calls {
            match call.await.unwrap() {
                Err(SessionError::ConnectionLost(reason)) => assert_eq!(reason, "session closed"),
                other => panic!("expected ConnectionLost, got {:?}", other),
            }
        }
        assert_eq!(session.state(), SessionState::Closed);

        let after = session.call_tool("echo", json!({})).await;
        assert!(matches!(
            after,
            Err(SessionError::NotConnected {
                state: SessionState::Closed
            })
        ));
        session.close().await;
    }

    #[tokio::test]
    async fn test_peer_hangup_fails_pending_and_closes() {
        let (session, mut inbound, outbound) = connect_manual().await;

        let peer = tokio::spawn(async move {
            inbound.recv().await.unwrap();
            drop(outbound);
            inbound
        });

        let result = session.call_tool("echo", json!({"text": "x"})).await;
        assert!(matches!(result, Err(SessionError::ConnectionLost(_))));
        drop(peer.await.unwrap());

        while session.state() != SessionState::Closed {
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            session.list_tools().await,
            Err(SessionError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_garbage_frames_are_skipped() {
        let (session, mut inbound, outbound) = connect_manual().await;

        let peer = tokio::spawn(async move {
            let request: Request = serde_json::from_str(&inbound.recv().await.unwrap()).unwrap();
            outbound.send("peer log line, not json".to_string()).unwrap();
            outbound.send(r#"{"id":9999,"success":true}"#.to_string()).unwrap();
            outbound
                .send(serde_json::to_string(&Response::success(request.id, json!(1))).unwrap())
                .unwrap();
            (inbound, outbound)
        });

        let result = session.call_tool("x", json!({})).await.unwrap();
        assert_eq!(result.payload, Some(json!(1)));
        let _peer = peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_failure_is_connection_error() {
        let (transport, peer) = MemoryTransport::pair();
        drop(peer);

        let result = Session::connect("gone", Arc::new(transport), SessionConfig::default()).await;
        assert!(matches!(result, Err(SessionError::Connection(_))));
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (transport, _peer) = MemoryTransport::pair();
        let config = SessionConfig::default().with_connect_timeout(Duration::from_millis(20));

        match Session::connect("silent", Arc::new(transport), config).await {
            Err(SessionError::Connection(message)) => assert!(message.contains("timed out")),
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("handshake should not succeed"),
        }
    }
}
