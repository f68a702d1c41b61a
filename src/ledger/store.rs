use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::error::{Result, StoreError};

/// Future returned by a [`Ledger::run_in_transaction`] callback. It borrows the
/// session for as long as the callback runs.
pub type TxFuture<'s, T, E> = Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send + 's>>;

/// Fjall-backed persistent storage for tasks and log records
#[derive(Clone)]
pub struct Ledger {
    keyspace: Keyspace,
    tasks: PartitionHandle,
    logs: PartitionHandle,
    log_ids: PartitionHandle,
}

impl Ledger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let tasks = keyspace.open_partition("tasks", PartitionCreateOptions::default())?;
        let logs = keyspace.open_partition("logs", PartitionCreateOptions::default())?;
        let log_ids = keyspace.open_partition("log_ids", PartitionCreateOptions::default())?;

        info!("Ledger opened successfully");
        Ok(Self {
            keyspace,
            tasks,
            logs,
            log_ids,
        })
    }

    /// Start a unit of work. Nothing staged on the session is visible until
    /// [`Session::commit`]; dropping it discards the writes.
    pub fn begin(&self) -> Session {
        Session {
            batch: self.keyspace.batch(),
            writes: 0,
            on_commit: Vec::new(),
        }
    }

    /// Run `f` inside a fresh session, committing when it returns `Ok` and
    /// rolling back when it returns `Err`.
    ///
    /// ```rust,ignore
    /// let task = ledger
    ///     .run_in_transaction(move |session| {
    ///         Box::pin(async move {
    ///             let task = tasks.create(Some(&mut *session), task)?;
    ///             queue.publish(&target, &message).await?;
    ///             Ok::<_, PipelineError>(task)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_in_transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut Session) -> TxFuture<'s, T, E>,
        E: From<StoreError>,
    {
        let mut session = self.begin();
        match f(&mut session).await {
            Ok(value) => {
                let writes = session.pending_writes();
                session.commit()?;
                debug!(writes, "Transaction committed");
                Ok(value)
            }
            Err(err) => {
                debug!(writes = session.pending_writes(), "Transaction rolled back");
                session.rollback();
                Err(err)
            }
        }
    }

    /// The bound session when one is supplied, otherwise an auto-commit
    /// writer that applies its writes atomically on [`Handle::finish`].
    pub fn resolve<'a>(&self, session: Option<&'a mut Session>) -> Handle<'a> {
        match session {
            Some(session) => Handle::Bound(session),
            None => Handle::AutoCommit(self.begin()),
        }
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Open an extra partition in the ledger keyspace, so its writes can join
    /// ledger sessions.
    pub(crate) fn partition(&self, name: &str) -> Result<PartitionHandle> {
        Ok(self
            .keyspace
            .open_partition(name, PartitionCreateOptions::default())?)
    }

    pub(crate) fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub(crate) fn tasks(&self) -> &PartitionHandle {
        &self.tasks
    }

    pub(crate) fn logs(&self) -> &PartitionHandle {
        &self.logs
    }

    pub(crate) fn log_ids(&self) -> &PartitionHandle {
        &self.log_ids
    }
}

type CommitHook = Box<dyn FnOnce() + Send>;

/// A pending atomic write set. Reads made while a session is open observe
/// committed state only.
pub struct Session {
    batch: Batch,
    writes: usize,
    on_commit: Vec<CommitHook>,
}

impl Session {
    /// Apply the staged writes, then run the commit hooks in registration order.
    pub fn commit(self) -> Result<()> {
        if self.writes > 0 {
            self.batch.commit()?;
        }
        for hook in self.on_commit {
            hook();
        }
        Ok(())
    }

    /// Run `hook` once the writes are durable. Dropped unrun on rollback or a
    /// failed commit.
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.on_commit.push(Box::new(hook));
    }

    pub fn rollback(self) {
        drop(self);
    }

    pub fn pending_writes(&self) -> usize {
        self.writes
    }

    pub(crate) fn insert(&mut self, partition: &PartitionHandle, key: Vec<u8>, value: Vec<u8>) {
        self.batch.insert(partition, key, value);
        self.writes += 1;
    }

    fn remove(&mut self, partition: &PartitionHandle, key: Vec<u8>) {
        self.batch.remove(partition, key);
        self.writes += 1;
    }
}

/// Writer resolved from an optional session.
pub enum Handle<'a> {
    AutoCommit(Session),
    Bound(&'a mut Session),
}

impl Handle<'_> {
    pub fn is_transactional(&self) -> bool {
        matches!(self, Handle::Bound(_))
    }

    fn session(&mut self) -> &mut Session {
        match self {
            Handle::AutoCommit(session) => session,
            Handle::Bound(session) => session,
        }
    }

    pub(crate) fn insert(&mut self, partition: &PartitionHandle, key: Vec<u8>, value: Vec<u8>) {
        self.session().insert(partition, key, value);
    }

    pub(crate) fn remove(&mut self, partition: &PartitionHandle, key: Vec<u8>) {
        self.session().remove(partition, key);
    }

    /// Apply auto-commit writes. Bound sessions are committed by their owner.
    pub fn finish(self) -> Result<()> {
        match self {
            Handle::AutoCommit(session) => session.commit(),
            Handle::Bound(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_ledger() -> (Ledger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Ledger::open(temp_dir.path().join("test_ledger")).unwrap();
        (ledger, temp_dir)
    }

    #[test]
    fn test_open_ledger() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Ledger::open(temp_dir.path().join("test_ledger")).is_ok());
    }

    #[test]
    fn test_auto_commit_handle_applies_on_finish() {
        let (ledger, _temp) = create_test_ledger();
        let mut handle = ledger.resolve(None);
        assert!(!handle.is_transactional());

        handle.insert(ledger.tasks(), b"task:a".to_vec(), b"{}".to_vec());
        assert!(ledger.tasks().get("task:a").unwrap().is_none());

        handle.finish().unwrap();
        assert!(ledger.tasks().get("task:a").unwrap().is_some());
    }

    #[test]
    fn test_dropped_session_discards_writes() {
        let (ledger, _temp) = create_test_ledger();
        {
            let mut session = ledger.begin();
            let mut handle = ledger.resolve(Some(&mut session));
            assert!(handle.is_transactional());
            handle.insert(ledger.tasks(), b"task:b".to_vec(), b"{}".to_vec());
            handle.finish().unwrap();
            assert_eq!(session.pending_writes(), 1);
        }
        assert!(ledger.tasks().get("task:b").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_in_transaction_commits_on_ok() {
        let (ledger, _temp) = create_test_ledger();
        let tasks = ledger.tasks().clone();

        let value = ledger
            .run_in_transaction(move |session| {
                Box::pin(async move {
                    session.insert(&tasks, b"task:c".to_vec(), b"{}".to_vec());
                    Ok::<_, StoreError>(7)
                })
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert!(ledger.tasks().get("task:c").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_in_transaction_rolls_back_on_err() {
        let (ledger, _temp) = create_test_ledger();
        let tasks = ledger.tasks().clone();

        let result: std::result::Result<(), StoreError> = ledger
            .run_in_transaction(move |session| {
                Box::pin(async move {
                    session.insert(&tasks, b"task:d".to_vec(), b"{}".to_vec());
                    Err::<(), _>(StoreError::TaskNotFound("boom".into()))
                })
            })
            .await;

        assert!(matches!(result, Err(StoreError::TaskNotFound(_))));
        assert!(ledger.tasks().get("task:d").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_hooks_run_after_writes_are_visible() {
        let (ledger, _temp) = create_test_ledger();
        let tasks = ledger.tasks().clone();
        let (seen_tx, seen_rx) = std::sync::mpsc::channel();

        ledger
            .run_in_transaction(move |session| {
                let reader = tasks.clone();
                Box::pin(async move {
                    session.insert(&tasks, b"task:e".to_vec(), b"{}".to_vec());
                    session.on_commit(move || {
                        let visible = reader.get("task:e").map(|v| v.is_some()).unwrap_or(false);
                        let _ = seen_tx.send(visible);
                    });
                    Ok::<_, StoreError>(())
                })
            })
            .await
            .unwrap();

        assert_eq!(seen_rx.try_recv(), Ok(true));
    }

    #[tokio::test]
    async fn test_commit_hooks_skipped_on_rollback() {
        let (ledger, _temp) = create_test_ledger();
        let (fired_tx, fired_rx) = std::sync::mpsc::channel::<()>();

        let result: std::result::Result<(), StoreError> = ledger
            .run_in_transaction(move |session| {
                Box::pin(async move {
                    session.on_commit(move || {
                        let _ = fired_tx.send(());
                    });
                    Err(StoreError::TaskNotFound("boom".into()))
                })
            })
            .await;

        assert!(result.is_err());
        assert!(fired_rx.try_recv().is_err());
    }

    #[test]
    fn test_hooks_run_for_sessions_without_writes() {
        let (ledger, _temp) = create_test_ledger();
        let (fired_tx, fired_rx) = std::sync::mpsc::channel::<()>();
        let mut session = ledger.begin();
        session.on_commit(move || {
            let _ = fired_tx.send(());
        });
        session.commit().unwrap();
        assert!(fired_rx.try_recv().is_ok());
    }

    #[test]
    fn test_persist() {
        let (ledger, _temp) = create_test_ledger();
        ledger.persist().unwrap();
    }
}
