//! CLI configuration.
//!
//! Sources, later overriding earlier:
//!  1. Built-in defaults
//!  2. `<config_dir>/bus-lens/config.toml`, or the file given by `--config` /
//!     `BUS_LENS_CONFIG` (which must then exist)
//!  3. Environment variables prefixed `BUS_LENS__` with `__` between keys,
//!     e.g. `BUS_LENS__CLIENT__RELAY_URL=http://localhost:3001/proxy`

use bus_lens_core::{ClientConfig, ServiceBusError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "BUS_LENS";

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid client configuration: {0}")]
    InvalidClient(#[source] ServiceBusError),
}

/// CLI configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub client: ClientSettings,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
    pub store: StoreConfig,
}

/// Client settings as they appear in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub api_version: String,
    pub relay_url: Option<String>,
    pub request_timeout_seconds: u64,
    pub token_ttl_minutes: i64,
    pub list_cache_ttl_seconds: u64,
    pub dead_letter_peek_timeout_seconds: u32,
    pub dead_letter_max_message_count: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let defaults = ClientConfig::default();
        Self {
            api_version: defaults.api_version,
            relay_url: defaults.relay_url,
            request_timeout_seconds: defaults.request_timeout.as_secs(),
            token_ttl_minutes: defaults.token_ttl_minutes,
            list_cache_ttl_seconds: defaults.list_cache_ttl.as_secs(),
            dead_letter_peek_timeout_seconds: defaults.dead_letter_peek_timeout_seconds,
            dead_letter_max_message_count: defaults.dead_letter_max_message_count,
        }
    }
}

impl ClientSettings {
    /// Convert into a validated [`ClientConfig`]
    pub fn to_client_config(&self) -> Result<ClientConfig, ConfigError> {
        let relay_url = self.relay_url.clone().filter(|url| !url.trim().is_empty());
        ClientConfig::builder()
            .api_version(self.api_version.clone())
            .relay_url(relay_url)
            .request_timeout(Duration::from_secs(self.request_timeout_seconds))
            .token_ttl_minutes(self.token_ttl_minutes)
            .list_cache_ttl(Duration::from_secs(self.list_cache_ttl_seconds))
            .dead_letter_peek_timeout_seconds(self.dead_letter_peek_timeout_seconds)
            .dead_letter_max_message_count(self.dead_letter_max_message_count)
            .build()
            .map_err(ConfigError::InvalidClient)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Output formatting preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

/// Output format options
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Where connection profiles and history are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub directory: Option<PathBuf>,
}

impl StoreConfig {
    /// Configured directory, else `<data_dir>/bus-lens`, else `./.bus-lens`
    pub fn resolve_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("bus-lens"))
                .unwrap_or_else(|| PathBuf::from(".bus-lens"))
        })
    }
}

/// `<config_dir>/bus-lens/config.toml`, when the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bus-lens").join("config.toml"))
}

/// Load configuration from the default or explicit file and the environment
pub fn load_configuration(explicit_path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    match explicit_path {
        Some(path) => load_from(Some(path), true, ENV_PREFIX),
        None => load_from(default_config_path().as_deref(), false, ENV_PREFIX),
    }
}

fn load_from(
    path: Option<&Path>,
    required: bool,
    env_prefix: &str,
) -> Result<CliConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        if required && !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        builder = builder.add_source(
            config::File::from(path)
                .required(required)
                .format(config::FileFormat::Toml),
        );
    }

    let config = builder
        .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}
