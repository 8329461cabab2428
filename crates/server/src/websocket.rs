use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::AppState;

/// WebSocket endpoint: every text message is one request frame.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Requests on one socket are dispatched concurrently; responses go back in
/// completion order through a single writer task.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("WebSocket client connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.into())).await {
                tracing::debug!(error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg_result) = stream.next().await {
        let text = match msg_result {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!("Ignoring non-UTF-8 binary message");
                    continue;
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket connection closed");
                break;
            }
            // axum answers pings itself
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
        };

        let dispatcher = state.dispatcher.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match dispatcher.handle_frame(&text).await {
                Ok(frame) => {
                    let _ = tx.send(frame).await;
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode response frame"),
            }
        });
    }

    drop(tx);
    let _ = writer.await;
    tracing::info!("WebSocket connection terminated");
}
