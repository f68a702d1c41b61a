//! Write-path and retention orchestrators. Each creates its task and
//! publishes the matching queue message inside one ledger session.

pub mod create_log;
pub mod retention;

use thiserror::Error;

use crate::ledger::StoreError;
use crate::queue::QueueError;

pub use create_log::CreateLog;
pub use retention::InitiateRetention;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("No logs supplied")]
    EmptyBatch,

    #[error("Tenant mismatch: caller '{caller}' cannot write logs for tenant '{log}'")]
    TenantMismatch { caller: String, log: String },

    #[error("Invalid log: {0}")]
    InvalidLog(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
