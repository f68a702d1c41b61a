use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::CreateLogRequest;

pub const MAX_BULK_LOGS: usize = 1000;
pub const MAX_MESSAGE_BYTES: usize = 4096;
const MAX_FIELD_BYTES: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogValidationError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("message exceeds {MAX_MESSAGE_BYTES} bytes")]
    MessageTooLong,
    #[error("field '{0}' exceeds {MAX_FIELD_BYTES} bytes")]
    FieldTooLong(&'static str),
    #[error("metadata must be an object when present")]
    InvalidMetadata,
    #[error("logs must contain between 1 and {MAX_BULK_LOGS} entries")]
    InvalidBatchSize,
    #[error("before_date must not be in the future")]
    CutoffInFuture,
}

pub fn validate_log(request: &CreateLogRequest) -> Result<(), LogValidationError> {
    if request.message.trim().is_empty() {
        return Err(LogValidationError::EmptyMessage);
    }
    if request.message.len() > MAX_MESSAGE_BYTES {
        return Err(LogValidationError::MessageTooLong);
    }

    let bounded = [
        ("id", &request.id),
        ("tenant_id", &request.tenant_id),
        ("user_id", &request.user_id),
        ("session_id", &request.session_id),
        ("resource", &request.resource),
        ("resource_id", &request.resource_id),
        ("ip_address", &request.ip_address),
        ("user_agent", &request.user_agent),
    ];
    for (name, value) in bounded {
        if value.as_ref().is_some_and(|value| value.len() > MAX_FIELD_BYTES) {
            return Err(LogValidationError::FieldTooLong(name));
        }
    }

    if let Some(metadata) = &request.metadata {
        if !metadata.is_object() {
            return Err(LogValidationError::InvalidMetadata);
        }
    }

    Ok(())
}

pub fn validate_batch(requests: &[CreateLogRequest]) -> Result<(), LogValidationError> {
    if !(1..=MAX_BULK_LOGS).contains(&requests.len()) {
        return Err(LogValidationError::InvalidBatchSize);
    }
    requests.iter().try_for_each(validate_log)
}

pub fn validate_cutoff(before: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), LogValidationError> {
    if before > now {
        return Err(LogValidationError::CutoffInFuture);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(message: &str) -> CreateLogRequest {
        serde_json::from_value(serde_json::json!({
            "action": "VIEW",
            "severity": "INFO",
            "message": message,
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_log() {
        assert_eq!(validate_log(&request("opened dashboard")), Ok(()));
    }

    #[test]
    fn test_empty_and_long_messages() {
        assert_eq!(validate_log(&request("  ")), Err(LogValidationError::EmptyMessage));
        let long = "x".repeat(MAX_MESSAGE_BYTES + 1);
        assert_eq!(validate_log(&request(&long)), Err(LogValidationError::MessageTooLong));
    }

    #[test]
    fn test_field_limits() {
        let mut log = request("ok");
        log.user_agent = Some("a".repeat(MAX_FIELD_BYTES + 1));
        assert_eq!(validate_log(&log), Err(LogValidationError::FieldTooLong("user_agent")));
    }

    #[test]
    fn test_metadata_must_be_object() {
        let mut log = request("ok");
        log.metadata = Some(serde_json::json!([1, 2]));
        assert_eq!(validate_log(&log), Err(LogValidationError::InvalidMetadata));
    }

    #[test]
    fn test_batch_bounds() {
        assert_eq!(validate_batch(&[]), Err(LogValidationError::InvalidBatchSize));
        assert_eq!(validate_batch(&[request("a"), request("b")]), Ok(()));
    }

    #[test]
    fn test_cutoff_in_future() {
        let now = Utc::now();
        assert!(validate_cutoff(now - Duration::days(1), now).is_ok());
        assert_eq!(
            validate_cutoff(now + Duration::hours(1), now),
            Err(LogValidationError::CutoffInFuture)
        );
    }
}
