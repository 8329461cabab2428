use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tether_core::logging::{self, LogTarget};
use tether_mcp::backends::Backend;

mod api;
mod config;
mod websocket;

use config::{AppState, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "tether-server")]
#[command(about = "Serve a demo tool backend over HTTP and WebSocket", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tether-server.toml")]
    config: PathBuf,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides the configuration file)
    #[arg(long)]
    host: Option<String>,

    /// Backend to serve (overrides the configuration file)
    #[arg(short, long, value_enum, env = "TETHER_BACKEND")]
    backend: Option<Backend>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("tether_server=info,tether_mcp=info,tower_http=info", LogTarget::Stdout);

    let args = Args::parse();

    let mut config = ServerConfig::load(&args.config)?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    let state = AppState::new(&config);
    tracing::info!(
        backend = ?config.backend,
        server = %state.dispatcher.info().name,
        "Starting tether peer server"
    );

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    api::serve(listener, state).await
}
