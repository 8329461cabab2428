// Wire protocol: one JSON object per frame, requests correlated to responses by `id`.

use crate::catalog::{ResourceDescriptor, ToolDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision exchanged during `initialize`.
pub const PROTOCOL_VERSION: &str = "tether/1";

/// Longest frame either side accepts on a line-delimited stream (1 MiB).
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Request frame.
///
/// Serializes as `{"id": 7, "method": "callTool", "name": "echo", "arguments": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub body: RequestBody,
}

impl Request {
    pub fn new(id: u64, body: RequestBody) -> Self {
        Self { id, body }
    }

    pub fn method(&self) -> &'static str {
        self.body.method()
    }
}

/// The method-specific part of a request, tagged by `method`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum RequestBody {
    #[serde(rename_all = "camelCase")]
    Initialize {
        protocol_version: String,
        client: PeerInfo,
    },
    ListTools,
    ListResources,
    CallTool {
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    ReadResource {
        uri: String,
    },
}

impl RequestBody {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::ListTools => "listTools",
            Self::ListResources => "listResources",
            Self::CallTool { .. } => "callTool",
            Self::ReadResource { .. } => "readResource",
        }
    }
}

/// Response frame.
///
/// `id` is `null` only when the peer could not recover an id from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Option<u64>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl Response {
    pub fn success(id: u64, payload: Value) -> Self {
        Self {
            id: Some(id),
            success: true,
            payload: Some(payload),
            error: None,
            code: None,
        }
    }

    pub fn failure(id: Option<u64>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            payload: None,
            error: Some(message.into()),
            code: Some(code),
        }
    }

    pub fn into_call_result(self) -> CallResult {
        CallResult {
            success: self.success,
            payload: self.payload,
            error: self.error,
            code: self.code,
        }
    }
}

/// Machine-readable failure class carried next to the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// The frame could not be decoded.
    InvalidRequest,
    UnknownMethod,
    UnknownTool,
    UnknownResource,
    /// Arguments were rejected by the tool's input schema.
    InvalidArguments,
    /// The handler ran and reported (or panicked with) an error.
    HandlerFailed,
}

/// Outcome of a `callTool` or `readResource` round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl CallResult {
    /// Payload decoded as JSON when the peer sent JSON-encoded text.
    pub fn payload_json(&self) -> Option<Value> {
        match &self.payload {
            Some(Value::String(text)) => {
                serde_json::from_str(text).ok().or_else(|| Some(Value::String(text.clone())))
            }
            other => other.clone(),
        }
    }

    pub fn into_result(self) -> Result<Value, RemoteFailure> {
        if self.success {
            Ok(self.payload.unwrap_or(Value::Null))
        } else {
            Err(RemoteFailure {
                code: self.code,
                message: self
                    .error
                    .unwrap_or_else(|| "peer reported failure without a message".to_string()),
            })
        }
    }
}

/// A failure reported by the peer for one call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteFailure {
    pub code: Option<ErrorCode>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub version: String,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub resources: bool,
}

/// Payload of a successful `initialize` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server: PeerInfo,
    #[serde(default)]
    pub capabilities: Capabilities,
}

/// Payload of a successful `listTools` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

/// Payload of a successful `listResources` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResourcesResult {
    pub resources: Vec<ResourceDescriptor>,
}
