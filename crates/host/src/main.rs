use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tether_core::logging::{self, LogTarget};
use tether_host::{Host, HostConfig, TransportConnector};

#[derive(Parser, Debug)]
#[command(name = "tether-host")]
#[command(about = "Connect to every configured peer, exercise it and report", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tether.toml")]
    config: PathBuf,

    /// Where to write the JSON report (overrides the configuration file)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    logging::init("info", LogTarget::Stdout);

    let args = Args::parse();
    let mut config = HostConfig::load(&args.config)?;
    if let Some(output) = args.output {
        config.output = output;
    }
    let output = config.output.clone();

    tracing::info!(
        application = %config.application,
        servers = config.servers.len(),
        "Starting tether host"
    );

    let report = Host::new(config, Arc::new(TransportConnector)).run().await;

    report.print_summary(&mut std::io::stdout().lock())?;
    report.write_to(&output)?;
    tracing::info!(path = %output.display(), "Report written");

    if report.all_connected() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
