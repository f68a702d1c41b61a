use std::sync::Arc;

use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::ledger::{Ledger, LogStore, TaskStore};
use crate::messaging::LogBroadcaster;
use crate::models::{LogRecord, Task, TaskType, tenant_scope};
use crate::observability::Metrics;
use crate::queue::{QueueClient, QueueMessage};

use super::{PipelineError, Result};

/// Write path: persist logs, record a reindex task and hand the logs to the
/// index worker, all inside one ledger session.
pub struct CreateLog {
    ledger: Ledger,
    logs: LogStore,
    tasks: TaskStore,
    queue: Arc<dyn QueueClient>,
    index_target: String,
    broadcaster: Arc<dyn LogBroadcaster>,
    metrics: Arc<Metrics>,
    span: Span,
}

impl CreateLog {
    pub fn new(
        ledger: Ledger,
        queue: Arc<dyn QueueClient>,
        index_target: impl Into<String>,
        broadcaster: Arc<dyn LogBroadcaster>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            logs: LogStore::new(ledger.clone()),
            tasks: TaskStore::new(ledger.clone()),
            ledger,
            queue,
            index_target: index_target.into(),
            broadcaster,
            metrics,
            span: info_span!("create_log"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn execute(&self, tenant_id: &str, user_id: &str, log: LogRecord) -> Result<LogRecord> {
        self.execute_bulk(tenant_id, user_id, vec![log])
            .await?
            .pop()
            .ok_or(PipelineError::EmptyBatch)
    }

    /// One reindex task covers the whole batch.
    pub async fn execute_bulk(
        &self,
        tenant_id: &str,
        user_id: &str,
        logs: Vec<LogRecord>,
    ) -> Result<Vec<LogRecord>> {
        self.run(tenant_id, user_id, logs)
            .instrument(self.span.clone())
            .await
    }

    async fn run(&self, tenant_id: &str, user_id: &str, logs: Vec<LogRecord>) -> Result<Vec<LogRecord>> {
        if logs.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        let prepared = logs
            .into_iter()
            .map(|log| prepare(tenant_id, log))
            .collect::<Result<Vec<_>>>()?;

        let task = Task::pending(TaskType::Reindex, tenant_scope(tenant_id), user_id);
        let staged = prepared.clone();
        let log_store = self.logs.clone();
        let task_store = self.tasks.clone();
        let queue = Arc::clone(&self.queue);
        let target = self.index_target.clone();

        let task = self
            .ledger
            .run_in_transaction(move |session| {
                Box::pin(async move {
                    log_store.insert_bulk(Some(&mut *session), &staged)?;
                    let task = task_store.create(Some(&mut *session), task)?;
                    // Becomes visible to the index worker only once the rows commit.
                    queue
                        .publish_in(&mut *session, &target, &QueueMessage::index(&task.task_id, staged))
                        .await?;
                    Ok::<_, PipelineError>(task)
                })
            })
            .await?;

        self.metrics.task_created();
        info!(task_id = %task.task_id, count = prepared.len(), "Logs accepted");

        match self.broadcaster.broadcast(&prepared) {
            Ok(delivered) => debug!(delivered, "Live feed notified"),
            Err(error) => {
                self.metrics.broadcast_dropped();
                warn!(%error, "Live feed notification failed");
            }
        }

        Ok(prepared)
    }
}

/// Assign an id and bind the record to the caller's tenant.
fn prepare(tenant_id: &str, mut log: LogRecord) -> Result<LogRecord> {
    if log.user_id.is_empty() {
        return Err(PipelineError::InvalidLog("user_id is required".to_string()));
    }

    if log.tenant_id.is_empty() {
        if tenant_id.is_empty() {
            return Err(PipelineError::InvalidLog("tenant_id is required".to_string()));
        }
        log.tenant_id = tenant_id.to_string();
    } else if !tenant_id.is_empty() && log.tenant_id != tenant_id {
        return Err(PipelineError::TenantMismatch {
            caller: tenant_id.to_string(),
            log: log.tenant_id,
        });
    }

    if log.id.is_empty() {
        log.id = Uuid::new_v4().to_string();
    }
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::StoreError;
    use crate::messaging::{LiveFeed, MessagingError, tenant_channel};
    use crate::models::{Action, Severity, TaskStatus};
    use crate::queue::MemoryQueue;
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    const INDEX: &str = "audit-log-index";

    struct Fixture {
        create_log: CreateLog,
        ledger: Ledger,
        queue: Arc<MemoryQueue>,
        feed: LiveFeed,
        metrics: Arc<Metrics>,
        _temp: TempDir,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::open(temp.path().join("ledger")).unwrap();
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30)));
        let metrics = Arc::new(Metrics::new());
        let feed = LiveFeed::new(16, Arc::clone(&metrics));
        let create_log = CreateLog::new(
            ledger.clone(),
            queue.clone(),
            INDEX,
            Arc::new(feed.clone()),
            Arc::clone(&metrics),
        );
        Fixture {
            create_log,
            ledger,
            queue,
            feed,
            metrics,
            _temp: temp,
        }
    }

    fn draft(tenant: &str) -> LogRecord {
        LogRecord::builder()
            .tenant_id(tenant)
            .user_id("u1")
            .action(Action::Create)
            .severity(Severity::Info)
            .event_timestamp(Utc::now())
            .message("created invoice")
            .build()
    }

    #[tokio::test]
    async fn test_execute_persists_log_task_and_message() {
        let fx = fixture();
        let mut subscriber = fx.feed.subscribe(tenant_channel("acme"));

        let log = fx.create_log.execute("acme", "u1", draft("")).await.unwrap();
        assert!(!log.id.is_empty());
        assert_eq!(log.tenant_id, "acme");

        let stored = LogStore::new(fx.ledger.clone()).get_by_id(&log.id).unwrap();
        assert_eq!(stored, Some(log.clone()));

        let messages = fx.queue.peek(INDEX);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].logs.as_deref(), Some(std::slice::from_ref(&log)));

        let task = TaskStore::new(fx.ledger.clone())
            .get_by_id(&messages[0].task_id)
            .unwrap();
        assert_eq!(task.task_type, TaskType::Reindex);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.tenant_id.as_deref(), Some("acme"));
        assert_eq!(task.user_id, "u1");

        assert_eq!(subscriber.next().await.unwrap().log.id, log.id);
        assert_eq!(fx.metrics.snapshot().tasks_created, 1);
    }

    #[tokio::test]
    async fn test_execute_bulk_uses_one_task() {
        let fx = fixture();
        let logs = fx
            .create_log
            .execute_bulk("acme", "u1", vec![draft("acme"), draft("")])
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_ne!(logs[0].id, logs[1].id);

        let messages = fx.queue.peek(INDEX);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].logs.as_ref().map(Vec::len), Some(2));
        assert_eq!(
            TaskStore::new(fx.ledger.clone())
                .list_by_type(TaskType::Reindex)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_tenant_mismatch_writes_nothing() {
        let fx = fixture();
        let err = fx
            .create_log
            .execute("acme", "u1", draft("globex"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TenantMismatch { .. }));
        assert!(fx.queue.is_empty(INDEX));
        assert_eq!(LogStore::new(fx.ledger.clone()).count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let fx = fixture();
        let err = fx.create_log.execute_bulk("acme", "u1", Vec::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyBatch));
    }

    #[tokio::test]
    async fn test_duplicate_id_rolls_back() {
        let fx = fixture();
        let mut first = draft("acme");
        first.id = "fixed-id".to_string();
        fx.create_log.execute("acme", "u1", first.clone()).await.unwrap();

        let err = fx.create_log.execute("acme", "u1", first).await.unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::DuplicateLog(_))));
        assert_eq!(fx.queue.len(INDEX), 1);
        assert_eq!(
            TaskStore::new(fx.ledger.clone())
                .list_by_type(TaskType::Reindex)
                .unwrap()
                .len(),
            1
        );
    }

    struct BrokenFeed;

    impl LogBroadcaster for BrokenFeed {
        fn broadcast(&self, _logs: &[LogRecord]) -> crate::messaging::Result<usize> {
            Err(MessagingError::PublishFailed("feed offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_broadcast_failure_is_not_surfaced() {
        let fx = fixture();
        let create_log = CreateLog::new(
            fx.ledger.clone(),
            fx.queue.clone(),
            INDEX,
            Arc::new(BrokenFeed),
            Arc::clone(&fx.metrics),
        );

        assert!(create_log.execute("acme", "u1", draft("")).await.is_ok());
        assert_eq!(fx.metrics.snapshot().broadcasts_dropped, 1);
    }

    #[test]
    fn test_prepare_requires_a_tenant() {
        assert!(matches!(
            prepare("", draft("")),
            Err(PipelineError::InvalidLog(_))
        ));
        assert_eq!(prepare("", draft("acme")).unwrap().tenant_id, "acme");
    }
}
