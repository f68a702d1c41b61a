//! Component wiring shared by the HTTP adapter and the workers

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, info_span};

use crate::config::{Config, QueueBackend, SearchBackend};
use crate::ledger::{Ledger, LogStore, StoreError, TaskStore};
use crate::messaging::LiveFeed;
use crate::observability::Metrics;
use crate::pipeline::{CreateLog, InitiateRetention};
use crate::queue::{FjallQueue, MemoryQueue, QueueClient, QueueError, QueueTargets};
use crate::search::{MemorySearchIndex, OpenSearchClient, OpenSearchConfig, SearchError, SearchIndex};
use crate::storage::{Archiver, BlobStore, StorageClient, StorageError};
use crate::worker::{ArchiveHandler, CleanupHandler, IndexHandler, TaskHandler, Worker, WorkerSettings};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to open ledger: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to open queue: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to configure storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to configure search: {0}")]
    Search(#[from] SearchError),
}

/// Shared handles to every backend the pipeline talks to.
#[derive(Clone)]
pub struct Components {
    pub ledger: Ledger,
    pub queue: Arc<dyn QueueClient>,
    pub search: Arc<dyn SearchIndex>,
    pub blobs: Arc<dyn BlobStore>,
    pub targets: QueueTargets,
    pub feed: LiveFeed,
    pub metrics: Arc<Metrics>,
}

impl Components {
    pub fn new(
        ledger: Ledger,
        queue: Arc<dyn QueueClient>,
        search: Arc<dyn SearchIndex>,
        blobs: Arc<dyn BlobStore>,
        targets: QueueTargets,
        feed_capacity: usize,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        Self {
            ledger,
            queue,
            search,
            blobs,
            targets,
            feed: LiveFeed::new(feed_capacity, Arc::clone(&metrics)),
            metrics,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let ledger = Ledger::open(config.server.ledger_path())?;

        let visibility = config.queue.visibility_timeout.as_duration();
        let queue: Arc<dyn QueueClient> = match config.queue.backend {
            QueueBackend::Memory => Arc::new(MemoryQueue::new(visibility)),
            QueueBackend::Fjall => Arc::new(FjallQueue::open(&ledger, visibility)?),
        };

        let search: Arc<dyn SearchIndex> = match config.search.backend {
            SearchBackend::Memory => Arc::new(MemorySearchIndex::new()),
            SearchBackend::OpenSearch => {
                Arc::new(OpenSearchClient::new(OpenSearchConfig::from(&config.search))?)
            }
        };

        let blobs: Arc<dyn BlobStore> = Arc::new(StorageClient::from_config(&config.storage)?);

        let targets = QueueTargets {
            index: config.queue.index_target.clone(),
            archive: config.queue.archive_target.clone(),
            cleanup: config.queue.cleanup_target.clone(),
        };

        info!(
            queue = ?config.queue.backend,
            search = ?config.search.backend,
            storage = ?config.storage.provider,
            "Components initialized"
        );

        Ok(Self::new(
            ledger,
            queue,
            search,
            blobs,
            targets,
            config.telemetry.live_feed_capacity,
        ))
    }

    pub fn task_store(&self) -> TaskStore {
        TaskStore::new(self.ledger.clone())
    }

    pub fn log_store(&self) -> LogStore {
        LogStore::new(self.ledger.clone())
    }

    pub fn create_log(&self) -> CreateLog {
        CreateLog::new(
            self.ledger.clone(),
            Arc::clone(&self.queue),
            self.targets.index.clone(),
            Arc::new(self.feed.clone()),
            Arc::clone(&self.metrics),
        )
        .with_span(info_span!("create_log", queue_target = %self.targets.index))
    }

    pub fn retention(&self) -> InitiateRetention {
        InitiateRetention::new(
            self.ledger.clone(),
            Arc::clone(&self.queue),
            self.targets.archive.clone(),
            Arc::clone(&self.metrics),
        )
        .with_span(info_span!("retention", queue_target = %self.targets.archive))
    }

    pub fn index_worker(&self, settings: &WorkerSettings) -> Worker {
        let handler = IndexHandler::new(Arc::clone(&self.search));
        self.worker(&self.targets.index, Arc::new(handler), settings)
    }

    pub fn archive_worker(&self, settings: &WorkerSettings) -> Worker {
        let handler = ArchiveHandler::new(
            self.log_store(),
            self.task_store(),
            Archiver::new(Arc::clone(&self.blobs)),
            Arc::clone(&self.queue),
            self.targets.cleanup.clone(),
            Arc::clone(&self.metrics),
        );
        self.worker(&self.targets.archive, Arc::new(handler), settings)
    }

    pub fn cleanup_worker(&self, settings: &WorkerSettings) -> Worker {
        let handler = CleanupHandler::new(self.log_store(), Arc::clone(&self.search));
        self.worker(&self.targets.cleanup, Arc::new(handler), settings)
    }

    /// One worker per type: index, archive, cleanup.
    pub fn workers(&self, settings: &WorkerSettings) -> Vec<Worker> {
        vec![
            self.index_worker(settings),
            self.archive_worker(settings),
            self.cleanup_worker(settings),
        ]
    }

    fn worker(
        &self,
        target: &str,
        handler: Arc<dyn TaskHandler>,
        settings: &WorkerSettings,
    ) -> Worker {
        Worker::new(
            target,
            Arc::clone(&self.queue),
            self.ledger.clone(),
            handler,
            settings.clone(),
            Arc::clone(&self.metrics),
        )
    }
}
