//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::HttpBackendConfig;
use crate::workflow::{PollConfig, UploadConfig, WorkflowSettings};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub uploads: UploadsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Document backend connection
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Bearer token, if the backend requires one
    pub api_token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_max_retries() -> u32 {
    3
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            api_token: None,
            request_timeout_ms: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Status polling schedule
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay() -> u64 {
    2000
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_max_failures() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    200
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            interval_ms: default_poll_interval(),
            max_backoff_ms: default_max_backoff(),
            max_consecutive_failures: default_max_failures(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Client-side upload limits
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: usize,

    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_max_file_mb() -> usize {
    25
}

fn default_allowed_extensions() -> Vec<String> {
    UploadConfig::default().allowed_extensions
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_file_mb: default_max_file_mb(),
            allowed_extensions: default_allowed_extensions(),
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

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
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
            dirs::config_dir().map(|p| p.join("ledgerdesk").join("config.toml")),
            Some(PathBuf::from("/etc/ledgerdesk/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `LEDGERDESK_*` overrides from a variable lookup
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Backend overrides
        if let Some(url) = lookup("LEDGERDESK_API_URL") {
            self.backend.url = url;
        }
        if let Some(token) = lookup("LEDGERDESK_API_TOKEN") {
            self.backend.api_token = Some(token).filter(|t| !t.is_empty());
        }

        // Polling overrides
        if let Some(interval) = lookup("LEDGERDESK_POLL_INTERVAL_MS") {
            match interval.parse() {
                Ok(ms) => self.polling.interval_ms = ms,
                Err(_) => tracing::warn!(value = %interval, "Ignoring invalid LEDGERDESK_POLL_INTERVAL_MS"),
            }
        }

        // Logging overrides
        if let Some(level) = lookup("LEDGERDESK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LEDGERDESK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Settings for the HTTP backend client
    pub fn http_backend(&self) -> HttpBackendConfig {
        HttpBackendConfig {
            base_url: self.backend.url.clone(),
            api_token: self.backend.api_token.clone(),
            request_timeout_ms: self.backend.request_timeout_ms,
            max_retries: self.backend.max_retries,
        }
    }

    /// Settings for a document workspace
    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            polling: PollConfig {
                initial_delay: Duration::from_millis(self.polling.initial_delay_ms),
                interval: Duration::from_millis(self.polling.interval_ms),
                max_backoff: Duration::from_millis(self.polling.max_backoff_ms),
                max_consecutive_failures: self.polling.max_consecutive_failures.max(1),
                max_attempts: self.polling.max_attempts,
            },
            uploads: UploadConfig {
                max_file_bytes: self.uploads.max_file_mb.saturating_mul(1024 * 1024),
                allowed_extensions: self
                    .uploads
                    .allowed_extensions
                    .iter()
                    .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                    .collect(),
            },
            ..WorkflowSettings::default()
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
    r#"# Ledgerdesk Configuration
#
# Environment variables override these settings:
# - LEDGERDESK_API_URL
# - LEDGERDESK_API_TOKEN
# - LEDGERDESK_POLL_INTERVAL_MS
# - LEDGERDESK_LOG_LEVEL
# - LEDGERDESK_LOG_FORMAT

[backend]
# Document backend base URL
url = "http://localhost:8000/api"

# Bearer token sent with every request
# api_token = ""

# Request timeout (ms)
request_timeout_ms = 30000

# Retries for read requests on transient errors
max_retries = 3

[polling]
# Wait before the first status check (ms)
initial_delay_ms = 2000

# Wait between status checks (ms)
interval_ms = 3000

# Upper bound for the backoff after failed checks (ms)
max_backoff_ms = 30000

# Give up after this many failed checks in a row
max_consecutive_failures = 10

# Give up after this many checks in total
max_attempts = 200

[uploads]
# Largest accepted file (MB)
max_file_mb = 25

# Accepted file extensions
allowed_extensions = ["pdf", "png", "jpg", "jpeg", "xlsx", "xls", "csv"]

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
