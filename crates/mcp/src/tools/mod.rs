mod registry;

pub use registry::{FnTool, RegisteredTool, Tool, ToolRegistry};
