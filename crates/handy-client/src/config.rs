//! Client configuration with YAML support

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::session::LogLevel;

/// Default device API base URL
pub const DEFAULT_BASE_URL: &str = "https://www.handyfeeling.com/api/v1/";
/// Default control-file upload endpoint
pub const DEFAULT_UPLOAD_URL: &str = "https://www.handyfeeling.com/api/sync/upload";

/// Handy client configuration
///
/// Can be loaded from YAML, JSON, or constructed programmatically.
///
/// ```yaml
/// connection:
///   base_url: "https://www.handyfeeling.com/api/v1/"
///   connection_key: "abc123"
///
/// timeouts:
///   request_ms: 30000
///   upload_ms: 120000
///
/// log_level: errors
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandyConfig {
    /// Connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Command lifecycle log verbosity
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Device API base URL; commands go to `{base_url}{key}/{endpoint}`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Control-file upload endpoint
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// Connection key of the device (can also be set later on the client)
    #[serde(default)]
    pub connection_key: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            upload_url: default_upload_url(),
            connection_key: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_upload_url() -> String {
    DEFAULT_UPLOAD_URL.to_string()
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// General request timeout in milliseconds (default: 30s)
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,

    /// Connect timeout in milliseconds (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Upload timeout in milliseconds (default: 2 minutes)
    #[serde(default = "default_upload_timeout")]
    pub upload_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_timeout(),
            connect_ms: default_connect_timeout(),
            upload_ms: default_upload_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_upload_timeout() -> u64 {
    120_000
}

impl HandyConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder() -> HandyConfigBuilder {
        HandyConfigBuilder::default()
    }
}

/// Builder for HandyConfig
#[derive(Default)]
pub struct HandyConfigBuilder {
    config: HandyConfig,
}

impl HandyConfigBuilder {
    /// Set the device API base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.connection.base_url = url.into();
        self
    }

    /// Set the upload endpoint URL
    pub fn upload_url(mut self, url: impl Into<String>) -> Self {
        self.config.connection.upload_url = url.into();
        self
    }

    /// Set the connection key
    pub fn connection_key(mut self, key: impl Into<String>) -> Self {
        self.config.connection.connection_key = Some(key.into());
        self
    }

    /// Set the log verbosity
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// Set request timeout in milliseconds
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.request_ms = ms;
        self
    }

    /// Set connect timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.connect_ms = ms;
        self
    }

    /// Set upload timeout in milliseconds
    pub fn upload_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.upload_ms = ms;
        self
    }

    /// Build the configuration
    pub fn build(self) -> HandyConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
