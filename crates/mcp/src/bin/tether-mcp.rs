// Stdio MCP server binary

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tether_core::logging::{self, LogTarget};
use tether_mcp::backends::Backend;
use tether_mcp::McpServer;

#[derive(Parser, Debug)]
#[command(name = "tether-mcp")]
#[command(about = "Serve a demo tool backend over stdin/stdout", long_about = None)]
struct Args {
    /// Backend to serve
    #[arg(short, long, value_enum, default_value = "echo", env = "TETHER_BACKEND")]
    backend: Backend,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries protocol frames, so logs go to stderr
    logging::init(&args.log_level, LogTarget::Stderr);

    let dispatcher = args.backend.dispatcher();
    tracing::info!(
        backend = ?args.backend,
        server = %dispatcher.info().name,
        tools = dispatcher.tools().len(),
        resources = dispatcher.resources().len(),
        "tether-mcp starting"
    );

    McpServer::new(Arc::new(dispatcher)).run_stdio().await?;

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
