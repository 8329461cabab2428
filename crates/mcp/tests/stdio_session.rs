//! Sessions against the real `tether-mcp` binary over its stdin/stdout.

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_sdk::transport::StdioTransport;
use tether_sdk::{ErrorCode, Session, SessionConfig, SessionState};

async fn connect(backend: &str) -> Session {
    let transport = StdioTransport::spawn(
        env!("CARGO_BIN_EXE_tether-mcp"),
        &["--backend".to_string(), backend.to_string()],
    )
    .unwrap()
    .with_shutdown_grace(Duration::from_secs(2));

    Session::connect(backend, Arc::new(transport), SessionConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_echo_over_stdio() {
    let session = connect("echo").await;
    assert_eq!(session.transport_kind(), "stdio");
    assert_eq!(session.server_info().unwrap().name, "echo-mcp");

    let tools = session.list_tools().await.unwrap();
    assert!(tools.contains("echo"));

    let ok = session.call_tool("echo", json!({"text": "hi"})).await.unwrap();
    assert!(ok.success);
    assert_eq!(ok.payload, Some(json!("hi")));

    let bad = session.call_tool("echo", json!({})).await.unwrap();
    assert!(!bad.success);
    assert_eq!(bad.code, Some(ErrorCode::InvalidArguments));
    assert_eq!(bad.error.as_deref(), Some("missing required field: text"));

    let started = Instant::now();
    session.close().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_sql_connect_then_read_tables_over_stdio() {
    let session = connect("sql").await;

    let before = session.read_resource("sql://tables").await.unwrap();
    assert!(!before.success);
    assert!(before.error.unwrap().contains("No database connection"));

    let connected = session
        .call_tool("connect_database", json!({"server": "localhost", "database": "test_db"}))
        .await
        .unwrap();
    assert!(connected.success);

    let after = session.read_resource("sql://tables").await.unwrap();
    assert!(after.success);
    assert_eq!(after.payload.unwrap()["database"], "test_db");

    session.close().await;
}
