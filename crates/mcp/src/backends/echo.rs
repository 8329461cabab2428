use crate::dispatcher::Dispatcher;
use crate::resources::FnResource;
use crate::tools::FnTool;
use serde_json::json;
use std::sync::Arc;
use tether_core::{InputSchema, PeerInfo, ResourceDescriptor, ToolDescriptor};

pub fn dispatcher() -> Dispatcher {
    Dispatcher::new(PeerInfo::new("echo-mcp", env!("CARGO_PKG_VERSION")))
        .with_tool(Arc::new(FnTool::new(
            ToolDescriptor::new(
                "echo",
                "Return the given text unchanged",
                InputSchema::object()
                    .string("text", "Text to echo back")
                    .required("text"),
            ),
            |args| Ok(args["text"].clone()),
        )))
        .with_resource(Arc::new(FnResource::new(
            ResourceDescriptor::new("echo://info", "Echo Info", "Describes this server"),
            || Ok(json!({"server": "echo-mcp", "tools": ["echo"]})),
        )))
}
