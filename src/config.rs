//! Uploader configuration

use crate::error::{Result, UploadError};
use crate::upload::partition::DEFAULT_PART_SIZE;
use crate::upload::strategy::DEFAULT_MULTIPART_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding `api-url`
pub const ENV_API_URL: &str = "SIGNAGE_API_URL";
/// Environment variable overriding `api-token`
pub const ENV_API_TOKEN: &str = "SIGNAGE_API_TOKEN";
/// Environment variable overriding `log-level`
pub const ENV_LOG_LEVEL: &str = "SIGNAGE_LOG_LEVEL";

/// Log level for the uploader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Off => write!(f, "off"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" => Ok(LogLevel::Off),
            other => Err(UploadError::config_error(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

/// Backend endpoint paths, relative to `api-url`
///
/// `record-update` may contain an `{id}` placeholder which is replaced by the
/// record id being updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ApiRoutes {
    pub create_multipart: String,
    pub part_urls: String,
    pub single_shot_url: String,
    pub complete_multipart: String,
    pub record_update: String,
}

impl Default for ApiRoutes {
    fn default() -> Self {
        Self {
            create_multipart: "/ads/multipart/create".to_string(),
            part_urls: "/ads/multipart/urls".to_string(),
            single_shot_url: "/ads/upload-url".to_string(),
            complete_multipart: "/ads/multipart/complete".to_string(),
            record_update: "/ads/{id}".to_string(),
        }
    }
}

impl ApiRoutes {
    /// Resolve the record update path for a record id
    pub fn record_update_path(&self, record_id: &str) -> String {
        self.record_update.replace("{id}", record_id)
    }
}

/// Configuration for an uploader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UploaderConfig {
    /// Base URL of the backend REST API
    #[serde(default)]
    pub api_url: String,

    /// Bearer token attached to backend calls
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub api_token: Option<String>,

    /// Size of every part except the last (default: 5 MiB)
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Files strictly larger than this are uploaded in parts (default: 50 MiB)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,

    /// Prefix of generated file identifiers (default: "ad-")
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Per-request timeout in seconds (default: 300)
    #[serde(skip_serializing_if = "Option::is_none", default = "default_request_timeout")]
    pub request_timeout: Option<u64>,

    /// Log level (default: info)
    #[serde(default)]
    pub log_level: LogLevel,

    /// Backend endpoint paths
    #[serde(default)]
    pub routes: ApiRoutes,
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

fn default_file_prefix() -> String {
    "ad-".to_string()
}

fn default_request_timeout() -> Option<u64> {
    Some(300)
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_token: None,
            part_size: DEFAULT_PART_SIZE,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            file_prefix: default_file_prefix(),
            request_timeout: default_request_timeout(),
            log_level: LogLevel::Info,
            routes: ApiRoutes::default(),
        }
    }
}

impl UploaderConfig {
    /// Create a configuration pointing at a backend
    pub fn new<S: Into<String>>(api_url: S) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Set the bearer token
    pub fn api_token<S: Into<String>>(mut self, token: S) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Set the part size in bytes
    pub fn part_size(mut self, size: u64) -> Self {
        self.part_size = size;
        self
    }

    /// Set the multi-part threshold in bytes
    pub fn multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold;
        self
    }

    /// Set the file identifier prefix
    pub fn file_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Set the request timeout in seconds, `None` disables it
    pub fn request_timeout(mut self, timeout: Option<u64>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the backend routes
    pub fn routes(mut self, routes: ApiRoutes) -> Self {
        self.routes = routes;
        self
    }

    /// Overlay values taken from the `SIGNAGE_*` environment variables
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            self.api_url = url;
        }
        if let Ok(token) = std::env::var(ENV_API_TOKEN) {
            self.api_token = Some(token);
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.log_level = level.parse()?;
        }
        Ok(self)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(UploadError::config_error("api-url must be set"));
        }
        if self.part_size == 0 {
            return Err(UploadError::config_error(
                "part-size must be greater than 0",
            ));
        }
        if self.multipart_threshold == 0 {
            return Err(UploadError::config_error(
                "multipart-threshold must be greater than 0",
            ));
        }
        if self.request_timeout == Some(0) {
            return Err(UploadError::config_error(
                "request-timeout must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Convert the configuration to a JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(UploadError::from)
    }

    /// Create a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(UploadError::from)
    }

    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            UploadError::config_error(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&contents)
    }
}
