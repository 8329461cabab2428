use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_sdk::{SessionConfig, TransportConfig};

/// Host configuration, usually read from `tether.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_application")]
    pub application: String,

    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    #[serde(default = "default_servers")]
    pub servers: Vec<ServerSpec>,
}

/// One peer the host connects to, and what to do once connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub name: String,
    pub transport: TransportConfig,
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Name recorded in the report; defaults to the tool name or URI.
    #[serde(default)]
    pub test: Option<String>,
    /// Skip this step unless the step before it succeeded.
    #[serde(default)]
    pub requires_previous: bool,
    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepAction {
    CallTool {
        tool: String,
        #[serde(default = "empty_object")]
        arguments: Value,
    },
    ReadResource {
        uri: String,
    },
}

impl ScriptStep {
    pub fn call_tool(tool: &str, arguments: Value) -> Self {
        Self {
            test: None,
            requires_previous: false,
            action: StepAction::CallTool {
                tool: tool.to_string(),
                arguments,
            },
        }
    }

    pub fn read_resource(uri: &str) -> Self {
        Self {
            test: None,
            requires_previous: false,
            action: StepAction::ReadResource {
                uri: uri.to_string(),
            },
        }
    }

    pub fn named(mut self, test: &str) -> Self {
        self.test = Some(test.to_string());
        self
    }

    pub fn after_previous(mut self) -> Self {
        self.requires_previous = true;
        self
    }

    pub fn label(&self) -> &str {
        if let Some(test) = &self.test {
            return test;
        }
        match &self.action {
            StepAction::CallTool { tool, .. } => tool,
            StepAction::ReadResource { uri } => uri,
        }
    }
}

fn empty_object() -> Value {
    json!({})
}

fn default_application() -> String {
    "tether host".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("test_results.json")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

/// The demo topology: a WebSocket peer and two stdio peers.
fn default_servers() -> Vec<ServerSpec> {
    vec![
        ServerSpec {
            name: "remote".to_string(),
            transport: TransportConfig::WebSocket {
                url: "ws://localhost:8765/mcp".to_string(),
            },
            script: vec![
                ScriptStep::call_tool(
                    "remote_compute",
                    json!({"operation": "test", "data": {"message": "Hello from tether host"}}),
                )
                .named("call_tool"),
                ScriptStep::read_resource("remote://data").named("read_resource"),
            ],
        },
        ServerSpec {
            name: "sql".to_string(),
            transport: TransportConfig::Stdio {
                command: "tether-mcp".to_string(),
                args: vec!["--backend".to_string(), "sql".to_string()],
            },
            script: vec![
                ScriptStep::call_tool(
                    "connect_database",
                    json!({"server": "localhost", "database": "test_db"}),
                ),
                ScriptStep::call_tool("execute_query", json!({"query": "SELECT 1 as test_column"}))
                    .after_previous(),
            ],
        },
        ServerSpec {
            name: "internet".to_string(),
            transport: TransportConfig::Stdio {
                command: "tether-mcp".to_string(),
                args: vec!["--backend".to_string(), "search".to_string()],
            },
            script: vec![
                ScriptStep::call_tool("web_search", json!({"query": "Rust async runtime", "num_results": 3})),
                ScriptStep::call_tool("fetch_url", json!({"url": "https://httpbin.org/json"})),
            ],
        },
    ]
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            application: default_application(),
            output: default_output(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            servers: default_servers(),
        }
    }
}

impl HostConfig {
    /// Load from `config_path`, falling back to the demo topology when the
    /// file does not exist.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(path = %config_path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_demo_topology() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::load(&dir.path().join("tether.toml")).unwrap();

        let names: Vec<_> = config.servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["remote", "sql", "internet"]);
        assert_eq!(config.servers[1].script[0].label(), "connect_database");
        assert_eq!(config.servers[0].script[1].label(), "read_resource");
        assert!(config.servers[1].script[1].requires_previous);
    }

    #[test]
    fn test_load_servers_and_script() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
request_timeout_secs = 2
output = "out.json"

[[servers]]
name = "echo"
transport = {{ type = "stdio", command = "tether-mcp", args = ["--backend", "echo"] }}

[[servers.script]]
step = "call_tool"
tool = "echo"
arguments = {{ text = "hi" }}

[[servers.script]]
step = "read_resource"
uri = "echo://info"
test = "info"
requires_previous = true

[[servers]]
name = "web"
transport = {{ type = "http", url = "http://localhost:8765" }}
"#
        )
        .unwrap();

        let config = HostConfig::load(file.path()).unwrap();
        assert_eq!(config.output, PathBuf::from("out.json"));
        assert_eq!(config.session_config().request_timeout, Duration::from_secs(2));
        assert_eq!(config.servers.len(), 2);

        let echo = &config.servers[0];
        assert_eq!(
            echo.script,
            vec![
                ScriptStep::call_tool("echo", json!({"text": "hi"})),
                ScriptStep::read_resource("echo://info").named("info").after_previous(),
            ]
        );
        assert!(config.servers[1].script.is_empty());
        assert_eq!(config.servers[1].transport.kind(), "http");
    }

    #[test]
    fn test_unknown_transport_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[[servers]]\nname = \"x\"\ntransport = {{ type = \"carrier-pigeon\" }}\n"
        )
        .unwrap();

        assert!(HostConfig::load(file.path()).is_err());
    }
}
