//! Drives every configured peer through connect, exercise and cleanup.

use crate::config::{HostConfig, ServerSpec, StepAction};
use crate::report::{ClientReport, Report, TestOutcome, CONNECTION_TEST};
use futures::future::join_all;
use std::sync::Arc;
use tether_sdk::{transport, CallResult, Session, SessionConfig, SessionError, SessionResult, Transport};
use tracing::{error, info, warn, Instrument, Span};

/// Opens the transport for one configured peer.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, spec: &ServerSpec, config: &SessionConfig) -> SessionResult<Arc<dyn Transport>>;
}

/// Opens real stdio, WebSocket and HTTP transports.
pub struct TransportConnector;

#[async_trait::async_trait]
impl Connector for TransportConnector {
    async fn open(&self, spec: &ServerSpec, config: &SessionConfig) -> SessionResult<Arc<dyn Transport>> {
        tokio::time::timeout(config.connect_timeout, transport::open(&spec.transport, config))
            .await
            .map_err(|_| {
                SessionError::Connection(format!(
                    "opening {} transport timed out after {:?}",
                    spec.transport.kind(),
                    config.connect_timeout
                ))
            })?
    }
}

struct Client {
    spec: ServerSpec,
    session: Option<Session>,
    tests: Vec<TestOutcome>,
}

pub struct Host {
    config: HostConfig,
    session_config: SessionConfig,
    connector: Arc<dyn Connector>,
    clients: Vec<Client>,
    span: Span,
    closed: bool,
}

impl Host {
    pub fn new(config: HostConfig, connector: Arc<dyn Connector>) -> Self {
        let clients = config
            .servers
            .iter()
            .map(|spec| Client {
                spec: spec.clone(),
                session: None,
                tests: Vec::new(),
            })
            .collect();
        let span = tracing::info_span!("host", application = %config.application);

        Self {
            session_config: config.session_config(),
            config,
            connector,
            clients,
            span,
            closed: false,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Connect, exercise and close every peer.
    pub async fn run(mut self) -> Report {
        self.connect_all().await;
        self.run_all().await;
        self.cleanup_all().await;
        self.report()
    }

    /// Open every session concurrently. A failure is recorded against that
    /// client only. Does nothing once `cleanup_all` has run.
    pub async fn connect_all(&mut self) {
        if self.closed {
            warn!(parent: &self.span, "host already cleaned up, not reconnecting");
            return;
        }
        let connector = &self.connector;
        let session_config = &self.session_config;

        let attempts = self.clients.iter_mut().map(|client| {
            let span = tracing::info_span!(parent: &self.span, "client", name = %client.spec.name);
            async move {
                if client.session.is_some() {
                    return;
                }
                match connect(connector.as_ref(), &client.spec, session_config).await {
                    Ok(session) => {
                        info!(
                            peer = session.server_info().map(|p| p.name.as_str()).unwrap_or("unknown"),
                            "✓ connected"
                        );
                        client.tests.push(TestOutcome::success(CONNECTION_TEST));
                        client.session = Some(session);
                    }
                    Err(e) => {
                        error!(error = %e, "✗ connection failed");
                        client.tests.push(TestOutcome::failed(CONNECTION_TEST, e.to_string()));
                    }
                }
            }
            .instrument(span)
        });
        join_all(attempts).await;

        let connected = self.clients.iter().filter(|c| c.session.is_some()).count();
        info!(parent: &self.span, connected, total = self.clients.len(), "connection phase complete");
    }

    /// Discover and run the configured script on every connected session,
    /// all sessions concurrently.
    pub async fn run_all(&mut self) {
        let runs = self.clients.iter_mut().filter_map(|client| {
            let session = client.session.as_ref()?;
            let span = tracing::info_span!(parent: &self.span, "client", name = %client.spec.name);
            let tests = &mut client.tests;
            let spec = &client.spec;
            Some(
                async move {
                    tests.extend(exercise(session, spec).await);
                }
                .instrument(span),
            )
        });
        join_all(runs).await;
    }

    /// Close every session concurrently. Always completes.
    pub async fn cleanup_all(&mut self) {
        self.closed = true;
        let sessions: Vec<Session> = self
            .clients
            .iter_mut()
            .filter_map(|client| client.session.take())
            .collect();
        info!(parent: &self.span, count = sessions.len(), "closing sessions");

        join_all(sessions.iter().map(|session| session.close())).await;
        info!(parent: &self.span, "all sessions closed");
    }

    pub fn report(&self) -> Report {
        let clients = self
            .clients
            .iter()
            .map(|client| ClientReport {
                client: client.spec.name.clone(),
                transport: client.spec.transport.kind().to_string(),
                tests: client.tests.clone(),
            })
            .collect();
        Report::new(self.config.application.clone(), clients)
    }
}

async fn connect(
    connector: &dyn Connector,
    spec: &ServerSpec,
    config: &SessionConfig,
) -> SessionResult<Session> {
    let transport = connector.open(spec, config).await?;
    Session::connect(spec.name.clone(), transport, config.clone()).await
}

/// Catalog discovery followed by the configured script steps.
async fn exercise(session: &Session, spec: &ServerSpec) -> Vec<TestOutcome> {
    let mut tests = Vec::new();

    match session.list_tools().await {
        Ok(tools) => {
            info!(count = tools.len(), "✓ found tools");
            tests.push(TestOutcome::success("list_tools").with_count(tools.len()));
        }
        Err(e) => tests.push(TestOutcome::error("list_tools", e.to_string())),
    }
    match session.list_resources().await {
        Ok(resources) => {
            info!(count = resources.len(), "✓ found resources");
            tests.push(TestOutcome::success("list_resources").with_count(resources.len()));
        }
        Err(e) => tests.push(TestOutcome::error("list_resources", e.to_string())),
    }

    let mut previous_ok = true;
    for step in &spec.script {
        let label = step.label();
        if step.requires_previous && !previous_ok {
            info!(step = label, "skipping step, previous step did not succeed");
            tests.push(TestOutcome::skipped(label));
            previous_ok = false;
            continue;
        }

        let outcome = match &step.action {
            StepAction::CallTool { tool, arguments } => {
                session.call_tool(tool.as_str(), arguments.clone()).await
            }
            StepAction::ReadResource { uri } => session.read_resource(uri.as_str()).await,
        };

        match outcome {
            Ok(result) => {
                let recorded = step_outcome(label, result);
                previous_ok = recorded.is_success();
                tests.push(recorded);
            }
            Err(e) => {
                previous_ok = false;
                warn!(step = label, error = %e, "step failed");
                let fatal = e.is_fatal();
                tests.push(TestOutcome::error(label, e.to_string()));
                if fatal {
                    break;
                }
            }
        }
    }

    tests
}

fn step_outcome(label: &str, result: CallResult) -> TestOutcome {
    if result.success {
        info!(step = label, "✓ step completed");
        let payload = result.payload_json().unwrap_or_default();
        TestOutcome::success(label).with_result(payload)
    } else {
        let message = result
            .error
            .clone()
            .unwrap_or_else(|| "peer reported failure".to_string());
        warn!(step = label, code = ?result.code, error = %message, "✗ step returned an error");
        TestOutcome::error(label, message)
    }
}
