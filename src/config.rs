//! Configuration management for the S3 data watcher
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from YAML files and environment variables.

use crate::error::WatcherError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the service configuration file
pub const CONFIG_FILE_PATH_DEFAULT: &str = "/etc/s3_data_watcher/config.yml";

/// Main configuration structure
///
/// Holds the NATS connection settings, the job table location, the
/// reconnect rate limit, and logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// NATS message bus configuration
    #[serde(default)]
    pub nats_config: NatsConfig,

    /// Path to the YAML job table, re-read on every dispatch pass
    #[serde(default = "default_job_file_path")]
    pub job_file_path: PathBuf,

    /// Minimum number of seconds between two connect attempts
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// NATS message bus configuration
///
/// Negative values for `max_reconnects`, `reconnect_wait` and
/// `request_timeout` leave the client library default in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// Server URL, e.g. `nats://nats:4222`
    #[serde(default = "default_nats_url")]
    pub url: String,

    /// Subject carrying the object-store notifications
    #[serde(default)]
    pub subject: String,

    /// Maximum reconnect attempts made by the client itself
    #[serde(default = "default_unset")]
    pub max_reconnects: i64,

    /// Seconds the client waits between its own reconnect attempts
    #[serde(default = "default_unset")]
    pub reconnect_wait: i64,

    /// Request timeout in seconds
    #[serde(default = "default_unset")]
    pub request_timeout: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,

    /// Log file path (if None, stderr only)
    pub file_path: Option<PathBuf>,

    /// Log raw message payloads at debug level
    #[serde(default)]
    pub include_payload: bool,
}

fn default_nats_url() -> String {
    "nats://nats:4222".to_string()
}

fn default_unset() -> i64 {
    -1
}

fn default_job_file_path() -> PathBuf {
    PathBuf::from("/etc/s3_data_watcher/jobs.yml")
}

fn default_reconnect_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            subject: String::new(),
            max_reconnects: default_unset(),
            reconnect_wait: default_unset(),
            request_timeout: default_unset(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
            include_payload: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nats_config: NatsConfig::default(),
            job_file_path: default_job_file_path(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NatsConfig {
    /// Client-side reconnect limit, if configured.
    pub fn max_reconnects(&self) -> Option<usize> {
        usize::try_from(self.max_reconnects).ok()
    }

    /// Client-side wait between its own reconnect attempts, if configured.
    pub fn reconnect_wait(&self) -> Option<Duration> {
        u64::try_from(self.reconnect_wait)
            .ok()
            .map(Duration::from_secs)
    }

    /// Request timeout, if configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        u64::try_from(self.request_timeout)
            .ok()
            .map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from file with environment overrides
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged, so that a deployment can be configured entirely from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();

        Ok(config)
    }

    /// Load configuration from a file that must exist, with environment
    /// overrides
    ///
    /// Used for a path the operator named explicitly.
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing, unreadable or malformed
    pub fn load_required(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(
                WatcherError::Config(format!("Config file not found at {}", path)).into(),
            );
        }

        Self::load(path)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| WatcherError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WatcherError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("S3_DATA_WATCHER_NATS_URL") {
            tracing::debug!(url = %url, "Env override: S3_DATA_WATCHER_NATS_URL");
            self.nats_config.url = url;
        }

        if let Ok(subject) = std::env::var("S3_DATA_WATCHER_NATS_SUBJECT") {
            tracing::debug!(subject = %subject, "Env override: S3_DATA_WATCHER_NATS_SUBJECT");
            self.nats_config.subject = subject;
        }

        if let Ok(job_file) = std::env::var("S3_DATA_WATCHER_JOB_FILE") {
            tracing::debug!(job_file = %job_file, "Env override: S3_DATA_WATCHER_JOB_FILE");
            self.job_file_path = PathBuf::from(job_file);
        }

        if let Ok(level) = std::env::var("S3_DATA_WATCHER_LOG_LEVEL") {
            tracing::debug!(level = %level, "Env override: S3_DATA_WATCHER_LOG_LEVEL");
            self.logging.level = level;
        }

        if let Ok(interval) = std::env::var("S3_DATA_WATCHER_RECONNECT_INTERVAL") {
            match interval.parse::<u64>() {
                Ok(v) => self.reconnect_interval_secs = v,
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for S3_DATA_WATCHER_RECONNECT_INTERVAL: {}",
                        interval
                    );
                }
            }
        }
    }

    /// Minimum time between two connect attempts.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any required field is empty or out of range
    pub fn validate(&self) -> Result<()> {
        if self.nats_config.url.is_empty() {
            return Err(WatcherError::Config("NATS URL is not given".to_string()).into());
        }

        if self.nats_config.subject.is_empty() {
            return Err(WatcherError::Config("NATS subject is not given".to_string()).into());
        }

        if self.job_file_path.as_os_str().is_empty() {
            return Err(WatcherError::Config("job file path is not given".to_string()).into());
        }

        if self.reconnect_interval_secs == 0 {
            return Err(WatcherError::Config(
                "reconnect_interval_secs must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.nats_config.subject = "s3.events".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.nats_config.url, "nats://nats:4222");
        assert!(config.nats_config.subject.is_empty());
        assert_eq!(config.nats_config.max_reconnects, -1);
        assert_eq!(config.reconnect_interval(), Duration::from_secs(60));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_config_requires_subject() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("subject"));
    }

    #[test]
    fn test_config_validation_success() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_url() {
        let mut config = valid_config();
        config.nats_config.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_interval() {
        let mut config = valid_config();
        config.reconnect_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unset_client_options_map_to_none() {
        let nats = NatsConfig::default();
        assert_eq!(nats.max_reconnects(), None);
        assert_eq!(nats.reconnect_wait(), None);
        assert_eq!(nats.request_timeout(), None);
    }

    #[test]
    fn test_client_options_from_yaml() {
        let yaml = r#"
nats_config:
  url: nats://localhost:4222
  subject: minio.events
  max_reconnects: 5
  reconnect_wait: 2
  request_timeout: 10
job_file_path: /tmp/jobs.yml
reconnect_interval_secs: 30
logging:
  level: debug
  json_format: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.nats_config.subject, "minio.events");
        assert_eq!(config.nats_config.max_reconnects(), Some(5));
        assert_eq!(config.nats_config.reconnect_wait(), Some(Duration::from_secs(2)));
        assert_eq!(
            config.nats_config.request_timeout(),
            Some(Duration::from_secs(10))
        );
        assert_eq!(config.job_file_path, PathBuf::from("/tmp/jobs.yml"));
        assert_eq!(config.reconnect_interval_secs, 30);
        assert!(config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("nats_config:\n  subject: a.b\n").unwrap();
        assert_eq!(config.nats_config.url, "nats://nats:4222");
        assert_eq!(config.reconnect_interval_secs, 60);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = Config::from_yaml("nats_config: [unclosed").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/s3_data_watcher/config.yml").unwrap();
        assert_eq!(config.nats_config.url, "nats://nats:4222");
    }

    #[test]
    #[serial]
    fn test_load_required_rejects_missing_file() {
        let err = Config::load_required("/nonexistent/s3_data_watcher/config.yml").unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
        assert!(err.to_string().contains("/nonexistent/s3_data_watcher/config.yml"));
    }

    #[test]
    #[serial]
    fn test_load_required_reads_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"nats_config:\n  subject: a.b\n").unwrap();

        let config = Config::load_required(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.nats_config.subject, "a.b");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("S3_DATA_WATCHER_NATS_URL", "nats://env:4222");
        std::env::set_var("S3_DATA_WATCHER_NATS_SUBJECT", "env.subject");
        std::env::set_var("S3_DATA_WATCHER_JOB_FILE", "/env/jobs.yml");
        std::env::set_var("S3_DATA_WATCHER_RECONNECT_INTERVAL", "not-a-number");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("S3_DATA_WATCHER_NATS_URL");
        std::env::remove_var("S3_DATA_WATCHER_NATS_SUBJECT");
        std::env::remove_var("S3_DATA_WATCHER_JOB_FILE");
        std::env::remove_var("S3_DATA_WATCHER_RECONNECT_INTERVAL");

        assert_eq!(config.nats_config.url, "nats://env:4222");
        assert_eq!(config.nats_config.subject, "env.subject");
        assert_eq!(config.job_file_path, PathBuf::from("/env/jobs.yml"));
        assert_eq!(config.reconnect_interval_secs, 60);
    }
}
