//! Queue client abstraction: publish, long-poll receive and delete-by-handle on
//! named targets, with at-least-once, visibility-timeout delivery.

pub mod memory;
pub mod store;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::ledger::{Session, StoreError};
use crate::models::LogRecord;

pub use memory::MemoryQueue;
pub use store::FjallQueue;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] StoreError),

    #[error("Message encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid receipt handle: {0}")]
    InvalidHandle(String),

    #[error("Invalid queue target: {0:?}")]
    InvalidTarget(String),

    #[error("Receipt handle {0} no longer owns the message")]
    StaleHandle(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Payload exchanged between orchestrators and workers.
///
/// Wire format: `{"id": "<task_id>", "before_date": "<RFC3339>", "logs": [...]}`
/// with the last two fields omitted when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    #[serde(rename = "id")]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<LogRecord>>,
}

impl QueueMessage {
    pub fn index(task_id: impl Into<String>, logs: Vec<LogRecord>) -> Self {
        Self {
            task_id: task_id.into(),
            before_date: None,
            logs: Some(logs),
        }
    }

    pub fn cutoff(task_id: impl Into<String>, before_date: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            before_date: Some(before_date),
            logs: None,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(body: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Opaque token that acknowledges one delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub(crate) fn issue(seq: u64, receive_count: u32) -> Self {
        Self(format!("{seq}.{receive_count}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn sequence(&self) -> Result<u64> {
        self.parts().map(|(seq, _)| seq)
    }

    /// `(sequence, receive_count)` of the delivery this handle acknowledges.
    pub(crate) fn parts(&self) -> Result<(u64, u32)> {
        self.0
            .split_once('.')
            .and_then(|(seq, count)| Some((seq.parse().ok()?, count.parse().ok()?)))
            .ok_or_else(|| QueueError::InvalidHandle(self.0.clone()))
    }
}

impl From<String> for ReceiptHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One delivery: the raw body plus the handle needed to delete it.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub body: String,
    pub handle: ReceiptHandle,
    pub receive_count: u32,
}

impl ReceivedMessage {
    pub fn decode(&self) -> std::result::Result<QueueMessage, serde_json::Error> {
        QueueMessage::decode(&self.body)
    }
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn publish(&self, target: &str, message: &QueueMessage) -> Result<()>;

    /// Publish as part of `session`. Errors surface immediately so the caller
    /// can roll back. Local backends keep the message hidden until the session
    /// commits; the default publishes right away.
    async fn publish_in(&self, _session: &mut Session, target: &str, message: &QueueMessage) -> Result<()> {
        self.publish(target, message).await
    }

    /// Wait up to `wait` for at least one visible message and return at most
    /// `max_messages`. Returned messages stay invisible to other receivers for
    /// the visibility timeout and reappear unless deleted.
    async fn receive_batch(
        &self,
        target: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>>;

    /// Deleting with a handle from an earlier delivery of a redelivered
    /// message fails with [`QueueError::StaleHandle`].
    async fn delete(&self, target: &str, handle: &ReceiptHandle) -> Result<()>;
}

/// Names of the three worker targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTargets {
    pub index: String,
    pub archive: String,
    pub cleanup: String,
}

impl Default for QueueTargets {
    fn default() -> Self {
        Self {
            index: "audit-log-index".to_string(),
            archive: "audit-log-archive".to_string(),
            cleanup: "audit-log-cleanup".to_string(),
        }
    }
}

pub(crate) fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() || target.contains(':') {
        return Err(QueueError::InvalidTarget(target.to_string()));
    }
    Ok(())
}

/// Result of one pass over a target: what was leased, and when the next
/// currently-invisible message becomes visible again.
pub(crate) struct Sweep {
    pub messages: Vec<ReceivedMessage>,
    pub next_visible: Option<Instant>,
}

/// Repeat `sweep` until it yields messages or `wait` elapses, sleeping until a
/// publish notification or the next visibility expiry in between.
pub(crate) async fn long_poll<F>(notify: &Notify, wait: Duration, mut sweep: F) -> Result<Vec<ReceivedMessage>>
where
    F: FnMut(Instant) -> Result<Sweep>,
{
    let deadline = Instant::now() + wait;
    loop {
        let notified = notify.notified();
        tokio::pin!(notified);
        // Register before sweeping so a publish racing the sweep still wakes us.
        notified.as_mut().enable();

        let now = Instant::now();
        let pass = sweep(now)?;
        if !pass.messages.is_empty() || now >= deadline {
            return Ok(pass.messages);
        }

        let wake_at = pass
            .next_visible
            .map_or(deadline, |visible| visible.min(deadline));
        let _ = tokio::time::timeout_at(wake_at, notified).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cutoff_message_wire_format() {
        let before = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let json = QueueMessage::cutoff("t-1", before).encode().unwrap();
        assert_eq!(json, r#"{"id":"t-1","before_date":"2024-01-31T00:00:00Z"}"#);
    }

    #[test]
    fn test_decode_ignores_missing_optionals() {
        let message = QueueMessage::decode(r#"{"id":"t-2"}"#).unwrap();
        assert_eq!(message.task_id, "t-2");
        assert!(message.before_date.is_none());
        assert!(message.logs.is_none());
    }

    #[test]
    fn test_receipt_handle_sequence() {
        assert_eq!(ReceiptHandle::issue(42, 3).sequence().unwrap(), 42);
        assert_eq!(ReceiptHandle::issue(42, 3).parts().unwrap(), (42, 3));
        assert!(ReceiptHandle::from("7.x".to_string()).parts().is_err());
        assert!(ReceiptHandle::from("garbage".to_string()).sequence().is_err());
    }

    #[test]
    fn test_validate_target() {
        assert!(validate_target("audit-log-index").is_ok());
        assert!(validate_target("").is_err());
        assert!(validate_target("a:b").is_err());
    }
}
