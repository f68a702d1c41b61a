//! Domain records shared by the ledger, the queue payloads and the workers.

pub mod log;
pub mod task;

pub use log::{Action, LogRecord, Severity};
pub use task::{Task, TaskStatus, TaskType, tenant_scope};
