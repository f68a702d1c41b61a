use chrono::Utc;
use tracing::debug;

use crate::models::{Task, TaskStatus, TaskType};

use super::error::{Result, StoreError};
use super::partitions::{decode_task_key, encode_task_key};
use super::store::{Ledger, Session};

/// Persistence for task records. Tasks are never deleted.
#[derive(Clone)]
pub struct TaskStore {
    ledger: Ledger,
}

impl TaskStore {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub fn create(&self, session: Option<&mut Session>, task: Task) -> Result<Task> {
        let key = encode_task_key(&task.task_id);
        let value = serde_json::to_vec(&task)?;

        let mut handle = self.ledger.resolve(session);
        let transactional = handle.is_transactional();
        handle.insert(self.ledger.tasks(), key, value);
        handle.finish()?;

        debug!(task_id = %task.task_id, task_type = %task.task_type, transactional, "Created task");
        Ok(task)
    }

    /// Move a task to `status`, validating the step against the committed record.
    ///
    /// The read and the write are separate operations, so two concurrent callers
    /// can both pass validation for the same task.
    pub fn update_status(
        &self,
        session: Option<&mut Session>,
        task_id: &str,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut task = self.get_by_id(task_id)?;
        if !task.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to: status,
            });
        }

        task.status = status;
        if error_message.is_some() {
            task.error_message = error_message;
        }
        task.updated_at = Utc::now();

        let value = serde_json::to_vec(&task)?;
        let mut handle = self.ledger.resolve(session);
        handle.insert(self.ledger.tasks(), encode_task_key(task_id), value);
        handle.finish()?;

        debug!(task_id, status = %status, "Updated task status");
        Ok(())
    }

    pub fn get_by_id(&self, task_id: &str) -> Result<Task> {
        self.find(task_id)?
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    pub fn find(&self, task_id: &str) -> Result<Option<Task>> {
        match self.ledger.tasks().get(encode_task_key(task_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// All tasks of one type, in key order.
    pub fn list_by_type(&self, task_type: TaskType) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for item in self.ledger.tasks().prefix("task:") {
            let (key, value) = item?;
            if decode_task_key(&key).is_none() {
                return Err(StoreError::InvalidKey(String::from_utf8_lossy(&key).into_owned()));
            }
            let task: Task = serde_json::from_slice(&value)?;
            if task.task_type == task_type {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }
}
