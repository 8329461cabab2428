use tracing_subscriber::{fmt, EnvFilter};

/// Where log lines go. Stdio peers must keep stdout free for frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// Install the process-wide subscriber. Call once from `main`.
///
/// `RUST_LOG` overrides `default_filter`.
pub fn init(default_filter: &str, target: LogTarget) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    match target {
        LogTarget::Stdout => builder.init(),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).init(),
    }
}
