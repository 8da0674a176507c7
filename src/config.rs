//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Kismet REST client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Devices requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Device view to query ("all", "phydot11_accesspoints", ...)
    #[serde(default = "default_view")]
    pub view: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_page_size() -> usize {
    500
}

fn default_request_timeout() -> u64 {
    30
}

fn default_view() -> String {
    "all".to_string()
}

fn default_user_agent() -> String {
    format!("kismet-extract/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout(),
            view: default_view(),
            user_agent: default_user_agent(),
        }
    }
}

/// Snapshot reader configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    /// Rows fetched per cursor step
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    256
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("kismet-extract").join("config.toml")),
            Some(PathBuf::from("/etc/kismet-extract/config.toml")),
            Some(PathBuf::from("./kismet-extract.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Remote overrides
        if let Some(size) = lookup("KISMET_EXTRACT_PAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.remote.page_size = size;
        }
        if let Some(secs) = lookup("KISMET_EXTRACT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.remote.request_timeout_secs = secs;
        }
        if let Some(view) = lookup("KISMET_EXTRACT_VIEW") {
            self.remote.view = view;
        }

        // Snapshot overrides
        if let Some(size) = lookup("KISMET_EXTRACT_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.snapshot.batch_size = size;
        }

        // Logging overrides
        if let Some(level) = lookup("KISMET_EXTRACT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("KISMET_EXTRACT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# kismet-extract configuration
#
# Environment variables override these settings:
# - KISMET_EXTRACT_PAGE_SIZE
# - KISMET_EXTRACT_TIMEOUT_SECS
# - KISMET_EXTRACT_VIEW
# - KISMET_EXTRACT_BATCH_SIZE
# - KISMET_EXTRACT_LOG_LEVEL
# - KISMET_EXTRACT_LOG_FORMAT

[remote]
# Devices requested from Kismet per page
page_size = 500

# Per-request timeout in seconds
request_timeout_secs = 30

# Kismet device view to query
view = "all"

[snapshot]
# Rows read from the snapshot per cursor step
batch_size = 256

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty or json
format = "pretty"
"#
    .to_string()
}
