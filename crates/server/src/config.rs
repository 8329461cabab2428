use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tether_mcp::backends::search::{self, SearchConfig, DUCKDUCKGO_ENDPOINT};
use tether_mcp::backends::Backend;
use tether_mcp::Dispatcher;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_backend")]
    pub backend: Backend,

    #[serde(default)]
    pub search: SearchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Hosts `fetch_url` may reach. Empty allows any host.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_backend() -> Backend {
    Backend::Remote
}

fn default_search_endpoint() -> String {
    DUCKDUCKGO_ENDPOINT.to_string()
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            allowed_domains: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backend: default_backend(),
            search: SearchSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `config_path`, falling back to defaults when it is missing.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(path = %config_path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .context("Failed to read configuration file")?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn dispatcher(&self) -> Dispatcher {
        match self.backend {
            Backend::Search => search::dispatcher_with(SearchConfig {
                endpoint: self.search.endpoint.clone(),
                allowed_domains: (!self.search.allowed_domains.is_empty())
                    .then(|| self.search.allowed_domains.clone()),
            }),
            other => other.dispatcher(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let span = tracing::info_span!("dispatcher", backend = ?config.backend);
        Self {
            dispatcher: Arc::new(config.dispatcher().with_span(span)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.addr(), "127.0.0.1:8765");
        assert_eq!(config.backend, Backend::Remote);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "port = 9000\nbackend = \"search\"\n\n[search]\nallowed_domains = [\"example.com\"]"
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.backend, Backend::Search);
        assert_eq!(config.search.endpoint, DUCKDUCKGO_ENDPOINT);

        let state = AppState::new(&config);
        assert_eq!(state.dispatcher.info().name, "internet-search-mcp");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend = \"telepathy\"").unwrap();

        let err = ServerConfig::load(file.path()).unwrap_err();
        assert_eq!(err.to_string(), "Failed to parse configuration file");
    }
}
