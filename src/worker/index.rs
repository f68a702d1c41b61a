use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::ledger::Session;
use crate::models::Task;
use crate::queue::QueueMessage;
use crate::search::SearchIndex;

use super::{Result, TaskHandler, WorkerError, WorkerKind};

/// Upserts the logs carried by the message into the search index.
pub struct IndexHandler {
    search: Arc<dyn SearchIndex>,
}

impl IndexHandler {
    pub fn new(search: Arc<dyn SearchIndex>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl TaskHandler for IndexHandler {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Index
    }

    async fn execute(&self, _session: &mut Session, task: &Task, message: &QueueMessage) -> Result<()> {
        let logs = message.logs.as_deref().ok_or_else(|| WorkerError::MissingField {
            task_id: task.task_id.clone(),
            field: "logs",
        })?;

        self.search.index_logs_bulk(logs).await?;
        debug!(task_id = %task.task_id, count = logs.len(), "Indexed logs");
        Ok(())
    }
}
