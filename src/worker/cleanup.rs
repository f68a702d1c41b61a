use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::ledger::{LogStore, Session};
use crate::models::Task;
use crate::queue::QueueMessage;
use crate::search::SearchIndex;

use super::archive::cutoff;
use super::{Result, TaskHandler, WorkerKind};

/// Deletes archived rows from the ledger and their documents from search.
///
/// Row removal is staged on the worker session, so a failed search delete
/// leaves the rows in place.
pub struct CleanupHandler {
    logs: LogStore,
    search: Arc<dyn SearchIndex>,
}

impl CleanupHandler {
    pub fn new(logs: LogStore, search: Arc<dyn SearchIndex>) -> Self {
        Self { logs, search }
    }
}

#[async_trait]
impl TaskHandler for CleanupHandler {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Cleanup
    }

    async fn execute(&self, session: &mut Session, task: &Task, message: &QueueMessage) -> Result<()> {
        let before = cutoff(task, message)?;
        let removed = self
            .logs
            .cleanup_before(Some(session), task.tenant_id.as_deref(), before)?;

        if !removed.is_empty() {
            self.search.delete_logs_bulk(&removed).await?;
        }

        info!(task_id = %task.task_id, removed = removed.len(), "Cleaned up logs");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::models::{Action, LogRecord, Severity, TaskType};
    use crate::search::{MemorySearchIndex, SearchError};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn log(id: &str, tenant: &str, day: u32) -> LogRecord {
        LogRecord::builder()
            .id(id)
            .tenant_id(tenant)
            .user_id("u1")
            .action(Action::Delete)
            .severity(Severity::Info)
            .event_timestamp(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap())
            .message("removed member")
            .build()
    }

    #[tokio::test]
    async fn test_removes_rows_and_documents_on_commit() {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::open(temp.path()).unwrap();
        let logs = LogStore::new(ledger.clone());
        let search = Arc::new(MemorySearchIndex::new());

        let rows = [log("a", "acme", 1), log("b", "acme", 20), log("c", "globex", 1)];
        logs.insert_bulk(None, &rows).unwrap();
        search.index_logs_bulk(&rows).await.unwrap();

        let handler = CleanupHandler::new(logs.clone(), search.clone());
        let task = Task::pending(TaskType::LogCleanup, Some("acme".to_string()), "admin");
        let before = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

        let mut session = ledger.begin();
        handler
            .execute(&mut session, &task, &QueueMessage::cutoff(&task.task_id, before))
            .await
            .unwrap();
        assert!(logs.get_by_id("a").unwrap().is_some());
        session.commit().unwrap();

        assert!(logs.get_by_id("a").unwrap().is_none());
        assert!(logs.get_by_id("b").unwrap().is_some());
        assert!(logs.get_by_id("c").unwrap().is_some());
        assert!(!search.contains("a"));
        assert!(search.contains("b"));
        assert!(search.contains("c"));
    }

    struct Unavailable;

    #[async_trait]
    impl SearchIndex for Unavailable {
        async fn index_log(&self, _log: &LogRecord) -> crate::search::Result<()> {
            Err(SearchError::Timeout)
        }

        async fn index_logs_bulk(&self, _logs: &[LogRecord]) -> crate::search::Result<()> {
            Err(SearchError::Timeout)
        }

        async fn delete_logs_bulk(&self, _ids: &[String]) -> crate::search::Result<()> {
            Err(SearchError::Timeout)
        }
    }

    #[tokio::test]
    async fn test_search_failure_is_returned() {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::open(temp.path()).unwrap();
        let logs = LogStore::new(ledger.clone());
        logs.insert_bulk(None, &[log("a", "acme", 1)]).unwrap();

        let handler = CleanupHandler::new(logs.clone(), Arc::new(Unavailable));
        let task = Task::pending(TaskType::LogCleanup, None, "admin");
        let before = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();

        let mut session = ledger.begin();
        let err = handler
            .execute(&mut session, &task, &QueueMessage::cutoff(&task.task_id, before))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::worker::WorkerError::Search(SearchError::Timeout)));
        session.rollback();
        assert!(logs.get_by_id("a").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_nothing_to_remove_skips_search() {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::open(temp.path()).unwrap();
        let handler = CleanupHandler::new(LogStore::new(ledger.clone()), Arc::new(Unavailable));
        let task = Task::pending(TaskType::LogCleanup, None, "admin");

        let mut session = ledger.begin();
        handler
            .execute(&mut session, &task, &QueueMessage::cutoff(&task.task_id, Utc::now()))
            .await
            .unwrap();
        assert_eq!(session.pending_writes(), 0);
    }
}
