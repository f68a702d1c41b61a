use super::models::{Config, SearchBackend, StorageProvider};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Largest batch a single receive may request
pub const MAX_BATCH_SIZE: usize = 10;
/// Longest long-poll a single receive may wait
pub const MAX_WAIT_TIME: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("worker.batch_size must be between 1 and {max}, got {value}")]
    InvalidBatchSize { value: usize, max: usize },

    #[error("worker.wait_time ({value_ms}ms) exceeds limit of {max_ms}ms")]
    WaitTimeTooLong { value_ms: u128, max_ms: u128 },

    #[error("worker.receive_backoff must be positive")]
    InvalidReceiveBackoff,

    #[error("queue.{field} must not be empty")]
    EmptyQueueTarget { field: &'static str },

    #[error("Queue target '{target}' must not contain ':'")]
    InvalidQueueTarget { target: String },

    #[error("Queue target '{target}' is used by more than one worker")]
    DuplicateQueueTarget { target: String },

    #[error("queue.visibility_timeout must be positive")]
    InvalidVisibilityTimeout,

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("storage.bucket must not be empty")]
    EmptyBucket,

    #[error("Invalid search endpoint '{endpoint}', expected 'http://' or 'https://'")]
    InvalidSearchEndpoint { endpoint: String },

    #[error("search.index must not be empty")]
    EmptySearchIndex,

    #[error("telemetry.live_feed_capacity must be positive")]
    InvalidLiveFeedCapacity,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_queue(config)?;
    validate_storage(config)?;
    validate_search(config)?;
    validate_telemetry(config)?;
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    let worker = &config.worker;
    if worker.batch_size == 0 || worker.batch_size > MAX_BATCH_SIZE {
        return Err(ValidationError::InvalidBatchSize {
            value: worker.batch_size,
            max: MAX_BATCH_SIZE,
        });
    }

    let wait = worker.wait_time.as_duration();
    if wait > MAX_WAIT_TIME {
        return Err(ValidationError::WaitTimeTooLong {
            value_ms: wait.as_millis(),
            max_ms: MAX_WAIT_TIME.as_millis(),
        });
    }

    if worker.receive_backoff.as_duration().is_zero() {
        return Err(ValidationError::InvalidReceiveBackoff);
    }

    Ok(())
}

/// Every worker needs its own, well-formed target
fn validate_queue(config: &Config) -> Result<(), ValidationError> {
    let queue = &config.queue;
    let targets = [
        ("index_target", &queue.index_target),
        ("archive_target", &queue.archive_target),
        ("cleanup_target", &queue.cleanup_target),
    ];

    let mut seen = HashSet::new();
    for (field, target) in targets {
        if target.is_empty() {
            return Err(ValidationError::EmptyQueueTarget { field });
        }
        if target.contains(':') {
            return Err(ValidationError::InvalidQueueTarget {
                target: target.clone(),
            });
        }
        if !seen.insert(target.as_str()) {
            return Err(ValidationError::DuplicateQueueTarget {
                target: target.clone(),
            });
        }
    }

    if queue.visibility_timeout.as_duration().is_zero() {
        return Err(ValidationError::InvalidVisibilityTimeout);
    }

    Ok(())
}

/// Validate storage credentials when provider is S3
fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.bucket.is_empty() {
        return Err(ValidationError::EmptyBucket);
    }

    if config.storage.provider == StorageProvider::S3
        && (config.storage.access_key.is_none() || config.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }

    Ok(())
}

fn validate_search(config: &Config) -> Result<(), ValidationError> {
    if config.search.backend != SearchBackend::OpenSearch {
        return Ok(());
    }

    let endpoint = &config.search.endpoint;
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ValidationError::InvalidSearchEndpoint {
            endpoint: endpoint.clone(),
        });
    }

    if config.search.index.is_empty() {
        return Err(ValidationError::EmptySearchIndex);
    }

    Ok(())
}

fn validate_telemetry(config: &Config) -> Result<(), ValidationError> {
    if config.telemetry.live_feed_capacity == 0 {
        return Err(ValidationError::InvalidLiveFeedCapacity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = Config::default();
        config.worker.batch_size = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidBatchSize { value: 0, .. })
        ));

        config.worker.batch_size = 11;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidBatchSize { value: 11, max: 10 })
        ));

        config.worker.batch_size = 10;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_wait_time_limit() {
        let mut config = Config::default();
        config.worker.wait_time = HumanDuration::from_secs(21);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::WaitTimeTooLong { .. })
        ));

        config.worker.wait_time = HumanDuration::from_secs(0);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_duplicate_queue_targets() {
        let mut config = Config::default();
        config.queue.cleanup_target = config.queue.archive_target.clone();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateQueueTarget { target }) if target == "audit-log-archive"
        ));
    }

    #[test]
    fn test_empty_and_malformed_queue_targets() {
        let mut config = Config::default();
        config.queue.index_target = String::new();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptyQueueTarget { field: "index_target" })
        ));

        config.queue.index_target = "audit:index".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidQueueTarget { .. })
        ));
    }

    #[test]
    fn test_s3_requires_credentials() {
        let mut config = Config::default();
        config.storage.provider = StorageProvider::S3;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingS3Credentials)
        ));

        config.storage.access_key = Some("key".to_string());
        config.storage.secret_key = Some("secret".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_search_endpoint_scheme() {
        let mut config = Config::default();
        config.search.endpoint = "localhost:9200".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidSearchEndpoint { .. })
        ));

        config.search.backend = SearchBackend::Memory;
        assert!(validate(&config).is_ok());
    }
}
