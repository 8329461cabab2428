use crate::config::AppState;
use crate::websocket;
use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Serve the peer API on an already bound listener until the process ends.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let app = create_router(state);

    tracing::info!(addr = %listener.local_addr()?, "Peer server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/rpc", post(rpc))
        .route("/mcp", get(websocket::ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "server": state.dispatcher.info(),
    }))
}

/// One request frame in, one response frame out.
async fn rpc(State(state): State<Arc<AppState>>, body: String) -> ApiResult<Response> {
    let frame = state.dispatcher.handle_frame(&body).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], frame).into_response())
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failure to produce a response frame at all. Protocol-level failures are
/// response frames and never take this path.
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let details = self
            .0
            .chain()
            .skip(1)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(": ");
        let response = ErrorResponse {
            error: self.0.to_string(),
            details: (!details.is_empty()).then_some(details),
        };

        tracing::error!(error = %response.error, "rpc handler failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Bind an ephemeral port and serve `backend` on it in the background.
#[cfg(test)]
pub(crate) async fn spawn_test_server(backend: tether_mcp::backends::Backend) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(&crate::config::ServerConfig {
        backend,
        ..Default::default()
    });
    tokio::spawn(serve(listener, state));
    addr
}
