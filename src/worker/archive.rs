use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::ledger::{LogStore, Session, TaskStore};
use crate::models::{Task, TaskType};
use crate::observability::Metrics;
use crate::queue::{QueueClient, QueueMessage};
use crate::storage::Archiver;

use super::{Result, TaskHandler, WorkerError, WorkerKind};

/// Uploads every log older than the cutoff as one archive object, then
/// schedules the matching cleanup task.
pub struct ArchiveHandler {
    logs: LogStore,
    tasks: TaskStore,
    archiver: Archiver,
    queue: Arc<dyn QueueClient>,
    cleanup_target: String,
    metrics: Arc<Metrics>,
}

impl ArchiveHandler {
    pub fn new(
        logs: LogStore,
        tasks: TaskStore,
        archiver: Archiver,
        queue: Arc<dyn QueueClient>,
        cleanup_target: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            logs,
            tasks,
            archiver,
            queue,
            cleanup_target: cleanup_target.into(),
            metrics,
        }
    }
}

pub(crate) fn cutoff(task: &Task, message: &QueueMessage) -> Result<DateTime<Utc>> {
    message.before_date.ok_or_else(|| WorkerError::MissingField {
        task_id: task.task_id.clone(),
        field: "before_date",
    })
}

#[async_trait]
impl TaskHandler for ArchiveHandler {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Archive
    }

    async fn execute(&self, _session: &mut Session, task: &Task, message: &QueueMessage) -> Result<()> {
        let before = cutoff(task, message)?;
        let logs = self.logs.find_for_archival(task.tenant_id.as_deref(), before)?;
        let upload = self.archiver.upload_logs(&task.task_id, &logs).await?;

        info!(
            task_id = %task.task_id,
            key = %upload.key,
            count = logs.len(),
            bytes = upload.size,
            "Archived logs"
        );
        Ok(())
    }

    /// Cleanup task and message are staged with the archive task's success.
    async fn after_success(&self, session: &mut Session, task: &Task, message: &QueueMessage) -> Result<()> {
        let before = cutoff(task, message)?;
        let cleanup = Task::pending(TaskType::LogCleanup, task.tenant_id.clone(), task.user_id.clone());
        let cleanup = self.tasks.create(Some(&mut *session), cleanup)?;

        self.queue
            .publish_in(
                &mut *session,
                &self.cleanup_target,
                &QueueMessage::cutoff(&cleanup.task_id, before),
            )
            .await?;

        let metrics = Arc::clone(&self.metrics);
        session.on_commit(move || metrics.task_created());

        info!(task_id = %task.task_id, cleanup_task_id = %cleanup.task_id, "Scheduled log cleanup");
        Ok(())
    }
}
