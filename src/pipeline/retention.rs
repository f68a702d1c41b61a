use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Instrument, Span, info, info_span};

use crate::ledger::{Ledger, TaskStore};
use crate::models::{Task, TaskType, tenant_scope};
use crate::observability::Metrics;
use crate::queue::{QueueClient, QueueMessage};

use super::{PipelineError, Result};

/// Starts the archive-then-cleanup saga for logs older than a cutoff.
pub struct InitiateRetention {
    ledger: Ledger,
    tasks: TaskStore,
    queue: Arc<dyn QueueClient>,
    archive_target: String,
    metrics: Arc<Metrics>,
    span: Span,
}

impl InitiateRetention {
    pub fn new(
        ledger: Ledger,
        queue: Arc<dyn QueueClient>,
        archive_target: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            tasks: TaskStore::new(ledger.clone()),
            ledger,
            queue,
            archive_target: archive_target.into(),
            metrics,
            span: info_span!("retention"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// An empty `tenant_id` covers every tenant.
    pub async fn execute(&self, tenant_id: &str, user_id: &str, before: DateTime<Utc>) -> Result<Task> {
        self.run(tenant_id, user_id, before)
            .instrument(self.span.clone())
            .await
    }

    async fn run(&self, tenant_id: &str, user_id: &str, before: DateTime<Utc>) -> Result<Task> {
        let task = Task::pending(TaskType::Archive, tenant_scope(tenant_id), user_id);
        let task_store = self.tasks.clone();
        let queue = Arc::clone(&self.queue);
        let target = self.archive_target.clone();

        let task = self
            .ledger
            .run_in_transaction(move |session| {
                Box::pin(async move {
                    let task = task_store.create(Some(&mut *session), task)?;
                    queue
                        .publish_in(&mut *session, &target, &QueueMessage::cutoff(&task.task_id, before))
                        .await?;
                    Ok::<_, PipelineError>(task)
                })
            })
            .await?;

        self.metrics.task_created();
        info!(task_id = %task.task_id, tenant_id, %before, "Retention requested");
        Ok(task)
    }
}
