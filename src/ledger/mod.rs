/// Fjall-based persistence layer for tasks and audit logs
///
/// The ledger is the single local "transactional" resource of the pipeline.
/// Writes are grouped into a [`Session`] (an atomic Fjall write batch) and
/// become visible together on commit:
///
/// - Tasks: outbox records (status, type, tenant scope, failure message)
/// - Logs: audit rows ordered by event timestamp, plus an id index
///
/// Stores accept an optional session. Without one every call commits on its own.
///
/// ## Usage
///
/// ```rust,ignore
/// use auditbox::ledger::{Ledger, TaskStore};
///
/// let ledger = Ledger::open("data/ledger")?;
/// let tasks = TaskStore::new(ledger.clone());
/// let mut session = ledger.begin();
/// tasks.create(Some(&mut session), task)?;
/// session.commit()?;
/// ```

pub mod error;
pub mod logs;
pub mod partitions;
pub mod store;
pub mod tasks;

pub use error::{Result, StoreError};
pub use logs::{ARCHIVAL_PAGE_SIZE, LogStore};
pub use store::{Handle, Ledger, Session, TxFuture};
pub use tasks::TaskStore;
