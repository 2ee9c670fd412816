//! Configuration management.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! TOML file, `PUBMED_MCP_*` environment variables (`__` between section and
//! key, e.g. `PUBMED_MCP_SERVER__PORT=8080`), the legacy `LOG_LEVEL`,
//! `NCBI_API_KEY` and `NCBI_EMAIL` variables, and finally CLI flags applied by
//! the binary.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::utils::RetryConfig;

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "pubmed-mcp.toml";

/// Prefix for structured environment overrides
pub const ENV_PREFIX: &str = "PUBMED_MCP";

/// Stands in for secrets in printed configuration
const REDACTED: &str = "<redacted>";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener and logging
    #[serde(default)]
    pub server: ServerConfig,

    /// NCBI E-utilities access
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// One of trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Reply with a single JSON body instead of an SSE stream
    #[serde(default)]
    pub json_response: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            json_response: false,
        }
    }
}

impl ServerConfig {
    /// Resolve `host:port` to a bindable address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ConfigError::Invalid(format!("host '{}': {}", self.host, e)))?
            .next()
            .ok_or_else(|| ConfigError::Invalid(format!("host '{}' has no address", self.host)))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// E-utilities settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout, 1..=300 seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// NCBI API key (raises the rate limit from 3 to 10 requests/second)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Contact address NCBI asks E-utilities clients to send
    #[serde(default)]
    pub email: Option<String>,

    /// Client name sent as the `tool` parameter
    #[serde(default = "default_tool")]
    pub tool: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            api_key: None,
            email: None,
            tool: default_tool(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default().max_retries(self.max_retries)
    }
}

fn default_base_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_tool() -> Option<String> {
    Some(env!("CARGO_PKG_NAME").to_string())
}

impl Config {
    /// Apply the unprefixed environment variables understood for compatibility
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = non_empty("LOG_LEVEL") {
            self.server.log_level = level;
        }
        if let Some(key) = non_empty("NCBI_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(email) = non_empty("NCBI_EMAIL") {
            self.upstream.email = Some(email);
        }
    }

    /// Check ranges and normalize the log level
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let level = self.server.log_level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log_level '{}' (expected one of {})",
                self.server.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        self.server.log_level = level;

        if !(1..=300).contains(&self.upstream.timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "upstream.timeout_secs {} (expected 1..=300)",
                self.upstream.timeout_secs
            )));
        }

        if self.upstream.max_retries > 5 {
            return Err(ConfigError::Invalid(format!(
                "upstream.max_retries {} (expected at most 5)",
                self.upstream.max_retries
            )));
        }

        match Url::parse(&self.upstream.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "upstream.base_url '{}' is not an http(s) URL",
                    self.upstream.base_url
                )))
            }
        }

        Ok(self)
    }

    /// A copy safe to print or log: the API key is masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.upstream.api_key.is_some() {
            copy.upstream.api_key = Some(REDACTED.to_string());
        }
        copy
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// The config file to read: the explicit path, or `pubmed-mcp.toml` if present
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            candidate.is_file().then_some(candidate)
        }
    }
}

/// Load configuration from an optional file and the environment
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(file) = find_config_file(path) {
        tracing::debug!("Loading configuration from {}", file.display());
        builder = builder.add_source(config::File::from(file.as_path()).required(true));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut config: Config = settings.try_deserialize()?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()
}
