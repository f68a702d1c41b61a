use std::collections::HashSet;
use std::ops::Bound;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::LogRecord;

use super::error::{Result, StoreError};
use super::partitions::{LOG_PREFIX, encode_log_id_key, encode_log_key, encode_log_upper_bound};
use super::store::{Ledger, Session};

/// Rows read per range scan when collecting logs for an archive.
pub const ARCHIVAL_PAGE_SIZE: usize = 1000;

/// Persistence for audit log rows, keyed by event time.
#[derive(Clone)]
pub struct LogStore {
    ledger: Ledger,
    page_size: usize,
}

impl LogStore {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            page_size: ARCHIVAL_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Insert every record or none. Records must carry an id; an id that is
    /// already stored, or repeated within `logs`, fails the whole call.
    pub fn insert_bulk(&self, session: Option<&mut Session>, logs: &[LogRecord]) -> Result<()> {
        let mut seen = HashSet::with_capacity(logs.len());
        for log in logs {
            if log.id.is_empty() {
                return Err(StoreError::InvalidKey("log id must not be empty".into()));
            }
            if !seen.insert(log.id.as_str())
                || self.ledger.log_ids().get(encode_log_id_key(&log.id))?.is_some()
            {
                return Err(StoreError::DuplicateLog(log.id.clone()));
            }
        }

        let mut handle = self.ledger.resolve(session);
        for log in logs {
            let key = encode_log_key(&log.event_timestamp, &log.id);
            handle.insert(self.ledger.log_ids(), encode_log_id_key(&log.id), key.clone());
            handle.insert(self.ledger.logs(), key, serde_json::to_vec(log)?);
        }
        handle.finish()?;

        debug!(count = logs.len(), "Inserted logs");
        Ok(())
    }

    pub fn get_by_id(&self, log_id: &str) -> Result<Option<LogRecord>> {
        let Some(key) = self.ledger.log_ids().get(encode_log_id_key(log_id))? else {
            return Ok(None);
        };
        match self.ledger.logs().get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Every log with `event_timestamp < before` inside the tenant scope, oldest first.
    /// Reads in pages of `page_size` rows.
    pub fn find_for_archival(
        &self,
        tenant_id: Option<&str>,
        before: DateTime<Utc>,
    ) -> Result<Vec<LogRecord>> {
        let mut matched = Vec::new();
        let mut cursor: Option<Vec<u8>> = None;
        let mut pages = 0usize;

        loop {
            let page = self.scan_page(cursor.take(), &before)?;
            pages += 1;
            let exhausted = page.len() < self.page_size;
            cursor = page.last().map(|(key, _)| key.clone());

            matched.extend(
                page.into_iter()
                    .map(|(_, log)| log)
                    .filter(|log| log.event_timestamp < before && log.in_scope(tenant_id)),
            );

            if exhausted || cursor.is_none() {
                break;
            }
        }

        debug!(count = matched.len(), pages, "Collected logs for archival");
        Ok(matched)
    }

    /// Stage removal of every log before `before` inside the tenant scope and
    /// return the removed ids. Rows disappear when the session commits.
    pub fn cleanup_before(
        &self,
        session: Option<&mut Session>,
        tenant_id: Option<&str>,
        before: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let start = Bound::Included(LOG_PREFIX.as_bytes().to_vec());
        let end = Bound::Excluded(encode_log_upper_bound(&before));

        let mut handle = self.ledger.resolve(session);
        let mut removed = Vec::new();
        for item in self.ledger.logs().range((start, end)) {
            let (key, value) = item?;
            let log: LogRecord = serde_json::from_slice(&value)?;
            if log.event_timestamp >= before || !log.in_scope(tenant_id) {
                continue;
            }
            handle.remove(self.ledger.logs(), key.to_vec());
            handle.remove(self.ledger.log_ids(), encode_log_id_key(&log.id));
            removed.push(log.id);
        }
        handle.finish()?;

        debug!(count = removed.len(), "Staged log cleanup");
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.ledger.logs().iter() {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn scan_page(
        &self,
        after: Option<Vec<u8>>,
        before: &DateTime<Utc>,
    ) -> Result<Vec<(Vec<u8>, LogRecord)>> {
        let start = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Included(LOG_PREFIX.as_bytes().to_vec()),
        };
        let end = Bound::Excluded(encode_log_upper_bound(before));

        let mut page = Vec::with_capacity(self.page_size);
        for item in self.ledger.logs().range((start, end)).take(self.page_size) {
            let (key, value) = item?;
            page.push((key.to_vec(), serde_json::from_slice(&value)?));
        }
        Ok(page)
    }
}
