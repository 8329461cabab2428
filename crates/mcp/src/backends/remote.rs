// Simulated remote backend. Results are fabricated from the arguments; no
// computation or storage happens.

use crate::dispatcher::Dispatcher;
use crate::resources::FnResource;
use crate::tools::FnTool;
use serde_json::{json, Value};
use std::sync::Arc;
use tether_core::{FieldType, InputSchema, PeerInfo, PropertySchema, ResourceDescriptor, ToolDescriptor};

pub fn dispatcher() -> Dispatcher {
    Dispatcher::new(PeerInfo::new("remote-mcp-server", env!("CARGO_PKG_VERSION")))
        .with_tool(Arc::new(FnTool::new(
            ToolDescriptor::new(
                "remote_compute",
                "Perform computation on remote server",
                InputSchema::object()
                    .string("operation", "Operation name")
                    .property("data", PropertySchema::new(FieldType::Object, "Operation input")),
            ),
            remote_compute,
        )))
        .with_tool(Arc::new(FnTool::new(
            ToolDescriptor::new(
                "remote_storage",
                "Access remote storage",
                InputSchema::object()
                    .string("action", "Storage action")
                    .string("path", "Storage path"),
            ),
            remote_storage,
        )))
        .with_resource(Arc::new(FnResource::new(
            ResourceDescriptor::new("remote://data", "Remote Data", "Data from remote MCP server"),
            || {
                Ok(json!({
                    "uri": "remote://data",
                    "data": {"items": ["item1", "item2", "item3"], "count": 3, "source": "remote_server"}
                }))
            },
        )))
        .with_resource(Arc::new(FnResource::new(
            ResourceDescriptor::new(
                "remote://config",
                "Remote Configuration",
                "Configuration from remote MCP server",
            ),
            || {
                Ok(json!({
                    "uri": "remote://config",
                    "config": {
                        "server_name": "remote-mcp-server",
                        "version": env!("CARGO_PKG_VERSION"),
                        "capabilities": ["compute", "storage"]
                    }
                }))
            },
        )))
}

fn remote_compute(args: Value) -> anyhow::Result<Value> {
    let operation = args["operation"].as_str().unwrap_or("unknown");
    Ok(json!({
        "operation": operation,
        "input_data": args.get("data").cloned().unwrap_or_else(|| json!({})),
        "result": format!("Computed {} on remote server", operation),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

fn remote_storage(args: Value) -> anyhow::Result<Value> {
    let action = args["action"].as_str().unwrap_or("unknown");
    let path = args["path"].as_str().unwrap_or("/");
    Ok(json!({
        "action": action,
        "path": path,
        "result": format!("Performed {} on {}", action, path),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{Request, RequestBody};

    #[tokio::test]
    async fn test_remote_compute_echoes_operation() {
        let response = dispatcher()
            .dispatch(Request::new(
                1,
                RequestBody::CallTool {
                    name: "remote_compute".to_string(),
                    arguments: json!({"operation": "sum", "data": {"numbers": [1, 2]}}),
                },
            ))
            .await;

        let payload = response.payload.unwrap();
        assert_eq!(payload["result"], "Computed sum on remote server");
        assert_eq!(payload["input_data"]["numbers"], json!([1, 2]));
    }

    #[tokio::test]
    async fn test_remote_data_resource() {
        let response = dispatcher()
            .dispatch(Request::new(
                2,
                RequestBody::ReadResource {
                    uri: "remote://data".to_string(),
                },
            ))
            .await;
        assert_eq!(response.payload.unwrap()["data"]["count"], 3);
    }
}
