//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use auditbox::app::Components;
use auditbox::ledger::{Ledger, Session};
use auditbox::models::{Action, LogRecord, Severity};
use auditbox::queue::{
    MemoryQueue, QueueClient, QueueError, QueueMessage, QueueTargets, ReceiptHandle,
    ReceivedMessage,
};
use auditbox::search::MemorySearchIndex;
use auditbox::storage::{BlobStore, StorageClient, StorageError, UploadMetadata};
use auditbox::worker::WorkerSettings;

/// Pipeline over in-process backends with a throwaway ledger.
pub struct Harness {
    pub components: Components,
    pub queue: Arc<MemoryQueue>,
    pub search: Arc<MemorySearchIndex>,
    pub archive: Arc<StorageClient>,
    _temp: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let archive = Arc::new(StorageClient::in_memory());
        Self::build(archive.clone(), archive, |queue| queue)
    }

    /// Archive uploads go to `blobs` instead of the in-memory bucket.
    pub fn with_blob_store(blobs: Arc<dyn BlobStore>) -> Self {
        Self::build(blobs, Arc::new(StorageClient::in_memory()), |queue| queue)
    }

    /// The pipeline sees the memory queue through `wrap`; `queue` stays the
    /// unwrapped one for inspection.
    pub fn with_queue(wrap: impl FnOnce(Arc<MemoryQueue>) -> Arc<dyn QueueClient>) -> Self {
        let archive = Arc::new(StorageClient::in_memory());
        Self::build(archive.clone(), archive, wrap)
    }

    fn build(
        blobs: Arc<dyn BlobStore>,
        archive: Arc<StorageClient>,
        wrap: impl FnOnce(Arc<MemoryQueue>) -> Arc<dyn QueueClient>,
    ) -> Self {
        let temp = TempDir::new().expect("temp dir");
        let ledger = Ledger::open(temp.path().join("ledger")).expect("open ledger");
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30)));
        let search = Arc::new(MemorySearchIndex::new());
        let components = Components::new(
            ledger,
            wrap(queue.clone()),
            search.clone(),
            blobs,
            QueueTargets::default(),
            64,
        );
        Self {
            components,
            queue,
            search,
            archive,
            _temp: temp,
        }
    }

    pub fn targets(&self) -> &QueueTargets {
        &self.components.targets
    }
}

/// Short waits so an empty queue does not stall a test.
pub fn settings() -> WorkerSettings {
    WorkerSettings {
        batch_size: 10,
        wait_time: Duration::from_millis(20),
        receive_backoff: Duration::from_millis(10),
    }
}

pub fn log_at(tenant: &str, event_timestamp: DateTime<Utc>) -> LogRecord {
    LogRecord::builder()
        .tenant_id(tenant)
        .user_id("u1")
        .action(Action::Update)
        .severity(Severity::Info)
        .event_timestamp(event_timestamp)
        .message("updated settings")
        .build()
}

pub fn draft() -> LogRecord {
    log_at("", Utc::now())
}

/// Object store that refuses every upload.
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put_once(&self, key: &str, _data: Vec<u8>) -> Result<UploadMetadata, StorageError> {
        Err(StorageError::Io(std::io::Error::other(format!(
            "bucket unavailable while writing {key}"
        ))))
    }
}

/// Queue whose every call fails.
pub struct DownQueue;

#[async_trait]
impl QueueClient for DownQueue {
    async fn publish(&self, target: &str, _message: &QueueMessage) -> Result<(), QueueError> {
        Err(QueueError::InvalidTarget(format!("{target} unreachable")))
    }

    async fn receive_batch(
        &self,
        target: &str,
        _max_messages: usize,
        _wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        Err(QueueError::InvalidTarget(format!("{target} unreachable")))
    }

    async fn delete(&self, target: &str, _handle: &ReceiptHandle) -> Result<(), QueueError> {
        Err(QueueError::InvalidTarget(format!("{target} unreachable")))
    }
}

/// Memory queue that refuses publishes to one target.
pub struct RejectingQueue {
    pub inner: Arc<MemoryQueue>,
    pub rejected: String,
}

impl RejectingQueue {
    fn check(&self, target: &str) -> Result<(), QueueError> {
        if target == self.rejected {
            return Err(QueueError::InvalidTarget(format!("{target} unreachable")));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueClient for RejectingQueue {
    async fn publish(&self, target: &str, message: &QueueMessage) -> Result<(), QueueError> {
        self.check(target)?;
        self.inner.publish(target, message).await
    }

    async fn publish_in(
        &self,
        session: &mut Session,
        target: &str,
        message: &QueueMessage,
    ) -> Result<(), QueueError> {
        self.check(target)?;
        self.inner.publish_in(session, target, message).await
    }

    async fn receive_batch(
        &self,
        target: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.inner.receive_batch(target, max_messages, wait).await
    }

    async fn delete(&self, target: &str, handle: &ReceiptHandle) -> Result<(), QueueError> {
        self.inner.delete(target, handle).await
    }
}
