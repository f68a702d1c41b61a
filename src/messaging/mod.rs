//! Live log feed
//!
//! Committed logs are pushed to in-process subscribers over a bounded
//! `tokio::sync::broadcast` channel. Sending never blocks: a subscriber that
//! falls behind loses the oldest notifications, and the loss is counted.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::LogRecord;
use crate::observability::Metrics;

/// Channel carrying every tenant's logs
pub const GLOBAL_CHANNEL: &str = "logs";

pub fn tenant_channel(tenant_id: &str) -> String {
    format!("{}:{}", GLOBAL_CHANNEL, tenant_id)
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Publish failed: {0}")]
    PublishFailed(String),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

/// Best-effort fan-out of committed logs
pub trait LogBroadcaster: Send + Sync {
    /// Returns how many subscriber deliveries were queued.
    fn broadcast(&self, logs: &[LogRecord]) -> Result<usize>;
}

#[derive(Debug, Clone)]
pub struct LiveEvent {
    pub log: LogRecord,
}

impl LiveEvent {
    /// Whether the event belongs on `channel` (`logs` or `logs:{tenant}`).
    pub fn matches(&self, channel: &str) -> bool {
        match channel.strip_prefix(GLOBAL_CHANNEL) {
            Some("") => true,
            Some(rest) => rest.strip_prefix(':') == Some(self.log.tenant_id.as_str()),
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct LiveFeed {
    sender: broadcast::Sender<LiveEvent>,
    metrics: Arc<Metrics>,
}

impl LiveFeed {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, metrics }
    }

    pub fn subscribe(&self, channel: impl Into<String>) -> Subscription {
        Subscription {
            channel: channel.into(),
            receiver: self.sender.subscribe(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl LogBroadcaster for LiveFeed {
    fn broadcast(&self, logs: &[LogRecord]) -> Result<usize> {
        let mut delivered = 0;
        for log in logs {
            // Err only means nobody is listening right now.
            if let Ok(receivers) = self.sender.send(LiveEvent { log: log.clone() }) {
                delivered += receivers;
            }
        }
        Ok(delivered)
    }
}

/// A subscriber's view of one channel.
pub struct Subscription {
    channel: String,
    receiver: broadcast::Receiver<LiveEvent>,
    metrics: Arc<Metrics>,
}

impl Subscription {
    /// Next event for this channel, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<LiveEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.matches(&self.channel) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(channel = %self.channel, missed, "Live subscriber lagged");
                    for _ in 0..missed {
                        self.metrics.broadcast_dropped();
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, Severity};
    use chrono::Utc;

    fn log(id: &str, tenant: &str) -> LogRecord {
        LogRecord::builder()
            .id(id)
            .tenant_id(tenant)
            .user_id("u1")
            .action(Action::Create)
            .severity(Severity::Info)
            .event_timestamp(Utc::now())
            .message("created")
            .build()
    }

    #[test]
    fn test_channel_matching() {
        let event = LiveEvent { log: log("a", "acme") };
        assert!(event.matches(GLOBAL_CHANNEL));
        assert!(event.matches(&tenant_channel("acme")));
        assert!(!event.matches(&tenant_channel("globex")));
        assert!(!event.matches("other"));
    }

    #[test]
    fn test_broadcast_without_subscribers_is_not_an_error() {
        let feed = LiveFeed::new(8, Arc::new(Metrics::new()));
        assert_eq!(feed.broadcast(&[log("a", "acme")]).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tenant_subscription_filters() {
        let feed = LiveFeed::new(8, Arc::new(Metrics::new()));
        let mut acme = feed.subscribe(tenant_channel("acme"));

        feed.broadcast(&[log("g1", "globex"), log("a1", "acme")]).unwrap();

        let event = acme.next().await.unwrap();
        assert_eq!(event.log.id, "a1");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_counts_drops() {
        let metrics = Arc::new(Metrics::new());
        let feed = LiveFeed::new(2, Arc::clone(&metrics));
        let mut all = feed.subscribe(GLOBAL_CHANNEL);

        let logs: Vec<LogRecord> = (0..5).map(|i| log(&format!("l{i}"), "acme")).collect();
        feed.broadcast(&logs).unwrap();

        let event = all.next().await.unwrap();
        assert_eq!(event.log.id, "l3");
        assert_eq!(metrics.snapshot().broadcasts_dropped, 3);
    }
}
