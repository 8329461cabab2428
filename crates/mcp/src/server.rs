// Newline-delimited server loop: one request frame per line in, one
// response frame per line out. Requests are handled concurrently and
// responses are written as they complete.

use crate::dispatcher::Dispatcher;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tether_core::{ErrorCode, Response};
pub use tether_core::MAX_FRAME_BYTES;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn, Instrument};

pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serve on this process's stdin/stdout until stdin closes.
    pub async fn run_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve frames from `reader`, writing responses to `writer`.
    ///
    /// Returns once `reader` reaches EOF and every in-flight request has
    /// been answered.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut frames = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
        let mut sink = FramedWrite::new(writer, LinesCodec::new());
        let (tx, mut rx) = mpsc::channel::<String>(64);

        let writer_task = tokio::spawn(
            async move {
                while let Some(frame) = rx.recv().await {
                    if let Err(e) = sink.send(frame).await {
                        error!(error = %e, "failed to write response");
                        break;
                    }
                }
            }
            .in_current_span(),
        );

        info!(server = %self.dispatcher.info().name, "serving");

        while let Some(next) = frames.next().await {
            let frame = match next {
                Ok(frame) => frame,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(limit = MAX_FRAME_BYTES, "frame too large");
                    let response = Response::failure(
                        None,
                        ErrorCode::InvalidRequest,
                        format!("Frame exceeds {} bytes", MAX_FRAME_BYTES),
                    );
                    let encoded = serde_json::to_string(&response)?;
                    if tx.send(encoded).await.is_err() {
                        break;
                    }
                    continue;
                }
                Err(LinesCodecError::Io(e)) => {
                    return Err(e).context("failed to read request frame");
                }
            };

            if frame.trim().is_empty() {
                continue;
            }

            let dispatcher = self.dispatcher.clone();
            let tx = tx.clone();
            tokio::spawn(
                async move {
                    match dispatcher.handle_frame(&frame).await {
                        Ok(encoded) => {
                            if tx.send(encoded).await.is_err() {
                                debug!("writer closed before response was sent");
                            }
                        }
                        Err(e) => error!(error = %e, "failed to encode response"),
                    }
                }
                .in_current_span(),
            );
        }

        // In-flight handlers hold sender clones; the writer drains them all.
        drop(tx);
        writer_task.await.context("response writer task failed")?;
        info!("input closed, server stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;
    use serde_json::{json, Value};
    use tether_core::{InputSchema, PeerInfo, ToolDescriptor};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn server() -> McpServer {
        let dispatcher = Dispatcher::new(PeerInfo::new("test", "0.1.0")).with_tool(Arc::new(
            FnTool::new(
                ToolDescriptor::new(
                    "echo",
                    "Echo",
                    InputSchema::object().string("text", "Text").required("text"),
                ),
                |args| Ok(args["text"].clone()),
            ),
        ));
        McpServer::new(Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn test_serve_answers_every_frame() {
        let (client, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let handle = tokio::spawn(async move { server().serve(server_read, server_write).await });

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(
                concat!(
                    r#"{"id":1,"method":"callTool","name":"echo","arguments":{"text":"a"}}"#,
                    "\n\n",
                    "garbage\n",
                    r#"{"id":2,"method":"listTools"}"#,
                    "\n",
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let mut responses = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            responses.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        handle.await.unwrap().unwrap();

        assert_eq!(responses.len(), 3);
        let by_id = |id: Value| responses.iter().find(|r| r["id"] == id).cloned();
        assert_eq!(by_id(json!(1)).unwrap()["payload"], "a");
        assert_eq!(by_id(json!(2)).unwrap()["success"], true);
        assert_eq!(by_id(Value::Null).unwrap()["code"], "invalidRequest");
    }
}
