//! Poll loop shared by every worker type

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::ledger::{Ledger, TaskStore};
use crate::models::{Task, TaskStatus};
use crate::observability::Metrics;
use crate::queue::{QueueClient, QueueMessage, ReceivedMessage};

use super::{Result, TaskHandler, WorkerError, WorkerKind, WorkerSettings};

fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// How a delivered message was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// The task had already left `pending`; the delivery was a duplicate.
    Skipped(TaskStatus),
}

pub struct Worker {
    kind: WorkerKind,
    target: String,
    queue: Arc<dyn QueueClient>,
    ledger: Ledger,
    tasks: TaskStore,
    handler: Arc<dyn TaskHandler>,
    settings: WorkerSettings,
    metrics: Arc<Metrics>,
    span: Span,
}

impl Worker {
    pub fn new(
        target: impl Into<String>,
        queue: Arc<dyn QueueClient>,
        ledger: Ledger,
        handler: Arc<dyn TaskHandler>,
        settings: WorkerSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let kind = handler.kind();
        Self {
            kind,
            target: target.into(),
            queue,
            tasks: TaskStore::new(ledger.clone()),
            ledger,
            handler,
            settings,
            metrics,
            span: info_span!("worker", kind = %kind),
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped. The
    /// signal is checked between batches, so stopping may take up to one
    /// receive wait; a received batch is always handled to completion.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let span = self.span.clone();
        async move {
            info!(queue_target = %self.target, "Worker started");
            while !stopping(&shutdown) {
                if let Some(batch) = self.receive().await {
                    self.process_batch(batch).await;
                }
            }
            info!("Worker stopped");
        }
        .instrument(span)
        .await
    }

    /// Receive and handle a single batch. Returns the number of deliveries.
    pub async fn poll_once(&self) -> usize {
        let span = self.span.clone();
        async {
            match self.receive().await {
                Some(batch) => self.process_batch(batch).await,
                None => 0,
            }
        }
        .instrument(span)
        .await
    }

    /// `None` after a receive error, once the backoff has elapsed.
    async fn receive(&self) -> Option<Vec<ReceivedMessage>> {
        match self
            .queue
            .receive_batch(&self.target, self.settings.batch_size, self.settings.wait_time)
            .await
        {
            Ok(batch) => {
                self.metrics.messages_received(batch.len());
                Some(batch)
            }
            Err(error) => {
                self.metrics.receive_error();
                warn!(
                    queue_target = %self.target,
                    %error,
                    backoff_ms = self.settings.receive_backoff.as_millis() as u64,
                    "Receive failed, backing off"
                );
                tokio::time::sleep(self.settings.receive_backoff).await;
                None
            }
        }
    }

    async fn process_batch(&self, batch: Vec<ReceivedMessage>) -> usize {
        let count = batch.len();
        for received in batch {
            self.process(&received).await;

            // Deleted whatever the outcome, including undecodable bodies.
            match self.queue.delete(&self.target, &received.handle).await {
                Ok(()) => self.metrics.message_deleted(),
                Err(error) => warn!(handle = %received.handle, %error, "Failed to delete message"),
            }
        }
        count
    }

    async fn process(&self, received: &ReceivedMessage) {
        let message = match received.decode() {
            Ok(message) => message,
            Err(error) => {
                error!(
                    handle = %received.handle,
                    error = %WorkerError::Decode(error),
                    "Dropping malformed message"
                );
                return;
            }
        };

        match self.handle_message(&message).await {
            Ok(Outcome::Succeeded) => {
                self.metrics.task_succeeded();
                info!(task_id = %message.task_id, "Task succeeded");
            }
            Ok(Outcome::Skipped(status)) => {
                self.metrics.task_skipped();
                info!(task_id = %message.task_id, %status, "Task already handled, skipping");
            }
            Err(error @ WorkerError::TaskFetch(_)) => {
                error!(task_id = %message.task_id, %error, "Task lookup failed");
            }
            Err(error) => {
                self.metrics.task_failed();
                error!(
                    task_id = %message.task_id,
                    receive_count = received.receive_count,
                    %error,
                    "Task failed"
                );
            }
        }
    }

    /// Drive one task through its lifecycle.
    pub async fn handle_message(&self, message: &QueueMessage) -> Result<Outcome> {
        let task = self
            .tasks
            .get_by_id(&message.task_id)
            .map_err(WorkerError::TaskFetch)?;

        if task.status != TaskStatus::Pending {
            return Ok(Outcome::Skipped(task.status));
        }

        self.tasks
            .update_status(None, &task.task_id, TaskStatus::Running, None)
            .map_err(WorkerError::StatusUpdate)?;
        debug!(task_id = %task.task_id, task_type = %task.task_type, "Task running");

        match self.complete(&task, message).await {
            Ok(()) => Ok(Outcome::Succeeded),
            Err(err) => {
                if let Err(mark_error) = self.tasks.update_status(
                    None,
                    &task.task_id,
                    TaskStatus::Failed,
                    Some(err.to_string()),
                ) {
                    warn!(task_id = %task.task_id, error = %mark_error, "Failed to mark task failed");
                }
                Err(err)
            }
        }
    }

    /// Effect plus success bookkeeping in one session.
    async fn complete(&self, task: &Task, message: &QueueMessage) -> Result<()> {
        let handler = Arc::clone(&self.handler);
        let tasks = self.tasks.clone();
        let task = task.clone();
        let message = message.clone();

        self.ledger
            .run_in_transaction(move |session| {
                Box::pin(async move {
                    handler.execute(&mut *session, &task, &message).await?;
                    tasks.update_status(
                        Some(&mut *session),
                        &task.task_id,
                        TaskStatus::Succeeded,
                        None,
                    )?;
                    handler.after_success(&mut *session, &task, &message).await?;
                    Ok::<_, WorkerError>(())
                })
            })
            .await
    }
}
