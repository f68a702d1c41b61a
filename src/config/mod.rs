//! Configuration management for AuditBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use auditbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `AUDITBOX__<section>__<key>`
//!
//! Examples:
//! - `AUDITBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `AUDITBOX__WORKER__BATCH_SIZE=10`
//! - `AUDITBOX__QUEUE__VISIBILITY_TIMEOUT=45s`
//!
//! Secrets are read from `S3_ACCESS_KEY` / `S3_SECRET_KEY` (or the AWS names)
//! and `OPENSEARCH_PASSWORD`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/auditbox.toml`.
//! This can be overridden using the `AUDITBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    Config, QueueBackend, QueueConfig, SearchBackend, SearchConfig, ServerConfig, StorageConfig,
    StorageProvider, TelemetryConfig, WorkerConfig,
};
pub use validation::{MAX_BATCH_SIZE, MAX_WAIT_TIME, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`AUDITBOX__*`)
    /// 2. TOML file (default: `config/auditbox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (worker limits, queue targets, credentials)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path plus environment and secrets
    pub fn load_with_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load(Some(path))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[worker]\nbatch_size = 3\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.worker.batch_size, 3);
        assert_eq!(config.queue.archive_target, "audit-log-archive");
    }

    #[test]
    fn test_validation_catches_oversized_batch() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[worker]\nbatch_size = 50\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidBatchSize { value: 50, .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
data_dir = "data"
max_body_bytes = "1MB"

[queue]
backend = "fjall"
index_target = "idx"
archive_target = "arc"
cleanup_target = "cln"
visibility_timeout = "1m"

[worker]
enabled = false
batch_size = 5
wait_time = "20s"
receive_backoff = "2s"

[storage]
provider = "memory"
bucket = "audit-archive"

[search]
backend = "opensearch"
endpoint = "https://search.internal:9200"
index = "audit-logs-v2"
request_timeout = "10s"
username = "auditbox"

[telemetry]
log_level = "debug"
live_feed_capacity = 64
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.queue.index_target, "idx");
        assert_eq!(config.queue.visibility_timeout.as_duration().as_secs(), 60);
        assert!(!config.worker.enabled);
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert_eq!(config.search.index, "audit-logs-v2");
        assert_eq!(config.search.username.as_deref(), Some("auditbox"));
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.telemetry.live_feed_capacity, 64);
    }
}
