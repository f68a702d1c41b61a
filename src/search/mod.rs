//! Search index client: document upserts and bulk deletes keyed by log id.

pub mod opensearch;

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::models::LogRecord;

pub use opensearch::{OpenSearchClient, OpenSearchConfig};

/// Ids per bulk delete request.
pub const DELETE_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Search request timed out")]
    Timeout,

    #[error("Search index returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Bulk request rejected {failed} of {total} items")]
    BulkItems { failed: usize, total: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid search configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index_log(&self, log: &LogRecord) -> Result<()>;

    /// Upsert every log. An empty slice is a no-op.
    async fn index_logs_bulk(&self, logs: &[LogRecord]) -> Result<()>;

    /// Remove documents by id. An empty slice is a no-op.
    async fn delete_logs_bulk(&self, ids: &[String]) -> Result<()>;
}

/// NDJSON body of `index` actions, one action line plus one source line per log.
pub fn bulk_index_body(logs: &[LogRecord]) -> Result<String> {
    let mut body = String::new();
    for log in logs {
        body.push_str(&json!({ "index": { "_id": log.id } }).to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(log)?);
        body.push('\n');
    }
    Ok(body)
}

/// NDJSON body of `delete` actions.
pub fn bulk_delete_body(ids: &[String]) -> String {
    let mut body = String::new();
    for id in ids {
        body.push_str(&json!({ "delete": { "_id": id } }).to_string());
        body.push('\n');
    }
    body
}

/// In-process index used for local runs and tests.
#[derive(Default)]
pub struct MemorySearchIndex {
    documents: RwLock<BTreeMap<String, LogRecord>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<LogRecord> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn index_log(&self, log: &LogRecord) -> Result<()> {
        self.index_logs_bulk(std::slice::from_ref(log)).await
    }

    async fn index_logs_bulk(&self, logs: &[LogRecord]) -> Result<()> {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        for log in logs {
            documents.insert(log.id.clone(), log.clone());
        }
        Ok(())
    }

    async fn delete_logs_bulk(&self, ids: &[String]) -> Result<()> {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            documents.remove(id);
        }
        Ok(())
    }
}
