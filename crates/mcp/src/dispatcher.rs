//! Routes decoded requests to tool handlers and resource readers.
//!
//! Every failure a single call can hit (unknown name, schema violation,
//! handler error or panic) comes back as an error-shaped [`Response`]; the
//! dispatcher itself never fails, so one bad call cannot take the peer down.

use crate::resources::{ResourceReader, ResourceRegistry};
use crate::tools::{Tool, ToolRegistry};
use serde_json::Value;
use std::sync::Arc;
use tether_core::protocol::{
    InitializeResult, ListResourcesResult, ListToolsResult, PROTOCOL_VERSION,
};
use tether_core::{Capabilities, ErrorCode, PeerInfo, Request, RequestBody, Response};
use tracing::{debug, warn, Instrument, Span};

const METHODS: [&str; 5] = [
    "initialize",
    "listTools",
    "listResources",
    "callTool",
    "readResource",
];

pub struct Dispatcher {
    info: PeerInfo,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    span: Span,
}

impl Dispatcher {
    pub fn new(info: PeerInfo) -> Self {
        let span = tracing::info_span!("dispatcher", server = %info.name);
        Self {
            info,
            tools: ToolRegistry::new(),
            resources: ResourceRegistry::new(),
            span,
        }
    }

    /// Replace the span dispatch work is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_resource(mut self, reader: Arc<dyn ResourceReader>) -> Self {
        self.resources.register(reader);
        self
    }

    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Decode one frame, dispatch it and encode the response.
    pub async fn handle_frame(&self, frame: &str) -> serde_json::Result<String> {
        let response = match decode(frame) {
            Ok(request) => self.dispatch(request).await,
            Err(response) => {
                warn!(parent: &self.span, error = ?response.error, "rejected frame");
                response
            }
        };
        serde_json::to_string(&response)
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let id = request.id;
        let method = request.method();
        async move {
            debug!(id, method, "dispatching request");
            match request.body {
                RequestBody::Initialize {
                    protocol_version,
                    client,
                } => {
                    debug!(client = %client.name, %protocol_version, "initialize");
                    let result = InitializeResult {
                        protocol_version: PROTOCOL_VERSION.to_string(),
                        server: self.info.clone(),
                        capabilities: Capabilities {
                            tools: !self.tools.is_empty(),
                            resources: !self.resources.is_empty(),
                        },
                    };
                    encode(id, &result)
                }
                RequestBody::ListTools => encode(
                    id,
                    &ListToolsResult {
                        tools: self.tools.descriptors(),
                    },
                ),
                RequestBody::ListResources => encode(
                    id,
                    &ListResourcesResult {
                        resources: self.resources.descriptors(),
                    },
                ),
                RequestBody::CallTool { name, arguments } => {
                    self.call_tool(id, name, arguments).await
                }
                RequestBody::ReadResource { uri } => self.read_resource(id, uri).await,
            }
        }
        .instrument(self.span.clone())
        .await
    }

    async fn call_tool(&self, id: u64, name: String, arguments: Value) -> Response {
        let Some(entry) = self.tools.get(&name) else {
            warn!(tool = %name, "unknown tool");
            return Response::failure(Some(id), ErrorCode::UnknownTool, format!("Unknown tool: {}", name));
        };

        if let Err(e) = entry.descriptor.input_schema.validate(&arguments) {
            warn!(tool = %name, error = %e, "invalid arguments");
            return Response::failure(Some(id), ErrorCode::InvalidArguments, e.to_string());
        }

        // Own task, so a panicking handler surfaces as a JoinError
        let tool = entry.tool.clone();
        let outcome = tokio::spawn(async move { tool.call(arguments).await }.in_current_span()).await;

        match outcome {
            Ok(Ok(payload)) => Response::success(id, payload),
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "tool failed");
                Response::failure(Some(id), ErrorCode::HandlerFailed, format!("{:#}", e))
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "tool panicked");
                Response::failure(
                    Some(id),
                    ErrorCode::HandlerFailed,
                    format!("Tool {} panicked", name),
                )
            }
        }
    }

    async fn read_resource(&self, id: u64, uri: String) -> Response {
        let Some(reader) = self.resources.get(&uri) else {
            warn!(%uri, "unknown resource");
            return Response::failure(
                Some(id),
                ErrorCode::UnknownResource,
                format!("Unknown resource: {}", uri),
            );
        };

        let outcome = tokio::spawn(async move { reader.read().await }.in_current_span()).await;

        match outcome {
            Ok(Ok(content)) => Response::success(id, content),
            Ok(Err(e)) => Response::failure(Some(id), ErrorCode::HandlerFailed, format!("{:#}", e)),
            Err(e) => {
                warn!(%uri, error = %e, "resource reader panicked");
                Response::failure(
                    Some(id),
                    ErrorCode::HandlerFailed,
                    format!("Resource {} panicked", uri),
                )
            }
        }
    }
}

fn encode<T: serde::Serialize>(id: u64, payload: &T) -> Response {
    match serde_json::to_value(payload) {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::failure(Some(id), ErrorCode::HandlerFailed, e.to_string()),
    }
}

/// Decode a frame, or produce the error response owed for it.
fn decode(frame: &str) -> Result<Request, Response> {
    let value: Value = serde_json::from_str(frame).map_err(|e| {
        Response::failure(None, ErrorCode::InvalidRequest, format!("Parse error: {}", e))
    })?;

    let id = value.get("id").and_then(Value::as_u64);
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .map(str::to_string);

    match (id, method) {
        (None, _) => Err(Response::failure(
            None,
            ErrorCode::InvalidRequest,
            "Invalid request: missing numeric id",
        )),
        (Some(id), None) => Err(Response::failure(
            Some(id),
            ErrorCode::InvalidRequest,
            "Invalid request: missing method",
        )),
        (Some(id), Some(method)) if !METHODS.contains(&method.as_str()) => Err(Response::failure(
            Some(id),
            ErrorCode::UnknownMethod,
            format!("Unknown method: {}", method),
        )),
        (Some(id), Some(_)) => serde_json::from_value(value).map_err(|e| {
            Response::failure(
                Some(id),
                ErrorCode::InvalidRequest,
                format!("Invalid request: {}", e),
            )
        }),
    }
}
