//! Configuration file handling for handy-cli

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use handy_client::config::{DEFAULT_BASE_URL, DEFAULT_UPLOAD_URL};
use handy_client::{HandyConfig, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Configuration for the CLI tool
///
/// ```toml
/// connection_key = "abc123"
/// log_level = "responses"
/// output = "json"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Device connection key
    pub connection_key: Option<String>,
    /// Device API base URL
    pub base_url: Option<String>,
    /// Control-file upload endpoint
    pub upload_url: Option<String>,
    /// Command lifecycle log verbosity
    pub log_level: Option<String>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("handy-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, args: ArgOverrides<'_>) -> Result<MergedConfig> {
        let output = match (args.output, &self.output) {
            (Some(format), _) => format,
            (None, Some(name)) => OutputFormat::from_str(name, true)
                .map_err(|e| anyhow!("Invalid output format in config: {}", e))?,
            (None, None) => OutputFormat::default(),
        };
        let log_level = match (args.log_level, &self.log_level) {
            (Some(level), _) => level,
            (None, Some(name)) => name
                .parse()
                .map_err(|e: String| anyhow!("Invalid log level in config: {}", e))?,
            (None, None) => LogLevel::default(),
        };

        Ok(MergedConfig {
            connection_key: args
                .connection_key
                .map(String::from)
                .or_else(|| self.connection_key.clone())
                .filter(|key| !key.is_empty()),
            base_url: args
                .base_url
                .map(String::from)
                .or_else(|| self.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            upload_url: self
                .upload_url
                .clone()
                .unwrap_or_else(|| DEFAULT_UPLOAD_URL.to_string()),
            output,
            log_level,
            no_color: args.no_color || self.no_color.unwrap_or(false),
        })
    }
}

/// Values given on the command line (or through the environment)
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgOverrides<'a> {
    pub connection_key: Option<&'a str>,
    pub base_url: Option<&'a str>,
    pub output: Option<OutputFormat>,
    pub log_level: Option<LogLevel>,
    pub no_color: bool,
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub connection_key: Option<String>,
    pub base_url: String,
    pub upload_url: String,
    pub output: OutputFormat,
    pub log_level: LogLevel,
    pub no_color: bool,
}

impl MergedConfig {
    /// Client configuration for the resolved settings
    pub fn client_config(&self) -> HandyConfig {
        let mut builder = HandyConfig::builder()
            .base_url(self.base_url.as_str())
            .upload_url(self.upload_url.as_str())
            .log_level(self.log_level);
        if let Some(key) = &self.connection_key {
            builder = builder.connection_key(key.as_str());
        }
        builder.build()
    }
}
