// Peer side of the tether protocol: tool/resource registries, the request
// dispatcher and a newline-delimited server loop, plus the demo backends.

pub mod backends;
pub mod dispatcher;
pub mod resources;
pub mod server;
pub mod tools;

pub use dispatcher::Dispatcher;
pub use resources::{FnResource, ResourceReader, ResourceRegistry};
pub use server::McpServer;
pub use tools::{FnTool, Tool, ToolRegistry};
