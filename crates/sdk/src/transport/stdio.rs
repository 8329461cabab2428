//! Child-process transport: newline-delimited frames over stdin/stdout.

use super::Transport;
use crate::error::{SessionError, SessionResult};
use futures_util::{SinkExt, StreamExt};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tether_core::MAX_FRAME_BYTES;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct StdioTransport {
    command: String,
    writer: Mutex<Option<FramedWrite<ChildStdin, LinesCodec>>>,
    reader: Mutex<FramedRead<ChildStdout, LinesCodec>>,
    child: Mutex<Child>,
    shutdown_grace: Duration,
    shutdown: CancellationToken,
}

impl StdioTransport {
    /// Spawn `command` with piped stdin/stdout. stderr is inherited so the
    /// peer's logs reach the terminal.
    pub fn spawn(command: &str, args: &[String]) -> SessionResult<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Connection(format!("failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Connection("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Connection("child stdout unavailable".to_string()))?;

        debug!(command, pid = ?child.id(), "spawned stdio peer");

        Ok(Self {
            command: command.to_string(),
            writer: Mutex::new(Some(FramedWrite::new(stdin, LinesCodec::new()))),
            reader: Mutex::new(FramedRead::new(
                stdout,
                LinesCodec::new_with_max_length(MAX_FRAME_BYTES),
            )),
            child: Mutex::new(child),
            shutdown_grace: Duration::from_secs(5),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn send(&self, frame: String) -> SessionResult<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| SessionError::ConnectionLost("stdin closed".to_string()))?;
        writer
            .send(frame)
            .await
            .map_err(|e| SessionError::ConnectionLost(format!("write to '{}' failed: {}", self.command, e)))
    }

    async fn receive(&self) -> SessionResult<String> {
        let mut reader = self.reader.lock().await;
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                Err(SessionError::ConnectionLost("transport closed".to_string()))
            }
            line = reader.next() => match line {
                Some(Ok(line)) => Ok(line),
                Some(Err(e)) => Err(SessionError::ConnectionLost(format!("read failed: {}", e))),
                None => Err(SessionError::ConnectionLost(format!("'{}' closed stdout", self.command))),
            },
        }
    }

    async fn close(&self) {
        self.shutdown.cancel();

        // Dropping the framed writer closes the child's stdin.
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = SinkExt::<String>::close(&mut writer).await {
                debug!(command = %self.command, error = %e, "stdin close failed");
            }
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => debug!(command = %self.command, %status, "stdio peer exited"),
            Ok(Err(e)) => warn!(command = %self.command, error = %e, "failed to wait for stdio peer"),
            Err(_) => {
                warn!(
                    command = %self.command,
                    grace_ms = self.shutdown_grace.as_millis() as u64,
                    "stdio peer did not exit, killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(command = %self.command, error = %e, "failed to kill stdio peer");
                }
            }
        }
    }

    fn kind(&self) -> &'static str {
        "stdio"
    }
}
