//! # tether SDK
//!
//! Client sessions for tether peers. A [`Session`] runs the handshake,
//! correlates responses to requests by id and caches the peer's catalogs;
//! a [`Transport`] only moves frames.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether_sdk::{transport, SessionConfig, SessionResult, Session, TransportConfig};
//!
//! # async fn example() -> SessionResult<()> {
//! let config = SessionConfig::default();
//! let transport = transport::open(
//!     &TransportConfig::WebSocket { url: "ws://localhost:8765/mcp".to_string() },
//!     &config,
//! )
//! .await?;
//!
//! let session = Session::connect("remote", transport, config).await?;
//! for tool in session.list_tools().await?.iter() {
//!     println!("{}: {}", tool.name, tool.description);
//! }
//!
//! let result = session.call_tool("remote_compute", serde_json::json!({"operation": "sum"})).await?;
//! println!("{:?}", result.payload);
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use config::{HealthProbe, SessionConfig, TransportConfig};
pub use error::{SessionError, SessionResult};
pub use session::{Session, SessionState};
pub use transport::Transport;

// Re-export wire types callers need to inspect results.
pub use tether_core::{CallResult, ErrorCode, PeerInfo, ResourceDescriptor, ToolDescriptor};
