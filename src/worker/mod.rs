//! Queue workers
//!
//! One poll loop ([`runner::Worker`]) drives every worker type. The loop owns
//! the task lifecycle (`pending -> running -> succeeded | failed`) and the
//! message delete; a [`TaskHandler`] supplies the per-type effect.

pub mod archive;
pub mod cleanup;
pub mod index;
pub mod runner;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::WorkerConfig;
use crate::ledger::{Session, StoreError};
use crate::models::Task;
use crate::queue::{QueueError, QueueMessage};
use crate::search::SearchError;
use crate::storage::StorageError;

pub use archive::ArchiveHandler;
pub use cleanup::CleanupHandler;
pub use index::IndexHandler;
pub use runner::{Outcome, Worker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Index,
    Archive,
    Cleanup,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Index => "index",
            WorkerKind::Archive => "archive",
            WorkerKind::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Poll-loop tuning shared by every worker type
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: usize,
    pub wait_time: Duration,
    pub receive_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            wait_time: Duration::from_secs(20),
            receive_backoff: Duration::from_secs(2),
        }
    }
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            wait_time: config.wait_time.as_duration(),
            receive_backoff: config.receive_backoff.as_duration(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to load task: {0}")]
    TaskFetch(#[source] StoreError),

    #[error("Failed to update task status: {0}")]
    StatusUpdate(#[source] StoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Message for task {task_id} is missing '{field}'")]
    MissingField { task_id: String, field: &'static str },

    #[error("Undecodable message: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Per-type effect of a worker.
///
/// Both hooks run inside the session that marks the task succeeded, so any
/// ledger writes they stage commit or roll back together with that update.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> WorkerKind;

    async fn execute(&self, session: &mut Session, task: &Task, message: &QueueMessage) -> Result<()>;

    /// Runs after the succeeded update has been staged.
    async fn after_success(
        &self,
        _session: &mut Session,
        _task: &Task,
        _message: &QueueMessage,
    ) -> Result<()> {
        Ok(())
    }
}
