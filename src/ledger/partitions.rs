/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `tasks`: task:{task_id} -> Task (JSON)
/// - `logs`: log:{sortable_micros:020}:{log_id} -> LogRecord (JSON)
/// - `log_ids`: logid:{log_id} -> primary log key (bytes)
///
/// Log keys sort by event time, so "everything before a cutoff" is a single
/// range scan from `log:` up to [`encode_log_upper_bound`].
use chrono::{DateTime, Utc};

pub const LOG_PREFIX: &str = "log:";

/// Shift signed microseconds into unsigned space so byte order matches time order,
/// including timestamps before the epoch.
fn sortable_micros(timestamp: &DateTime<Utc>) -> u64 {
    (timestamp.timestamp_micros() as u64) ^ (1u64 << 63)
}

/// Encode a task key: task:{task_id}
pub fn encode_task_key(task_id: &str) -> Vec<u8> {
    format!("task:{}", task_id).into_bytes()
}

/// Decode a task key: task:{task_id} -> task_id
pub fn decode_task_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("task:").map(String::from)
}

/// Encode a log key: log:{sortable_micros:020}:{log_id}
pub fn encode_log_key(event_timestamp: &DateTime<Utc>, log_id: &str) -> Vec<u8> {
    format!("log:{:020}:{}", sortable_micros(event_timestamp), log_id).into_bytes()
}

/// Exclusive upper bound covering every log whose timestamp is at or below
/// `cutoff` at microsecond precision. Callers still filter on `< cutoff`.
pub fn encode_log_upper_bound(cutoff: &DateTime<Utc>) -> Vec<u8> {
    format!("log:{:020}:", sortable_micros(cutoff).saturating_add(1)).into_bytes()
}

/// Encode a log identity key: logid:{log_id}
pub fn encode_log_id_key(log_id: &str) -> Vec<u8> {
    format!("logid:{}", log_id).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_task_key_encoding() {
        let key = encode_task_key("task_123");
        assert_eq!(key, b"task:task_123");
        assert_eq!(decode_task_key(&key).unwrap(), "task_123");
        assert!(decode_task_key(b"log:1").is_none());
    }

    #[test]
    fn test_log_keys_sort_by_time() {
        let before_epoch = Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = early + Duration::microseconds(1);

        let a = encode_log_key(&before_epoch, "zzz");
        let b = encode_log_key(&early, "zzz");
        let c = encode_log_key(&late, "aaa");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_upper_bound_includes_cutoff_instant() {
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bound = encode_log_upper_bound(&cutoff);

        assert!(encode_log_key(&cutoff, "x") < bound);
        assert!(encode_log_key(&(cutoff - Duration::seconds(1)), "x") < bound);
        assert!(encode_log_key(&(cutoff + Duration::microseconds(1)), "x") >= bound);
        assert!(bound.starts_with(LOG_PREFIX.as_bytes()));
    }

    #[test]
    fn test_log_id_key_encoding() {
        assert_eq!(encode_log_id_key("l-1"), b"logid:l-1");
    }
}
