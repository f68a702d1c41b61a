//! Archive codec: a gzip-compressed JSON array of log records, stored at
//! `archives/{task_id}_{unix_timestamp}.json.gz`.

use std::io::{Read, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::models::LogRecord;

use super::{BlobStore, Result, UploadMetadata};

pub const ARCHIVE_PREFIX: &str = "archives";

pub fn archive_key(task_id: &str, at: DateTime<Utc>) -> String {
    format!("{}/{}_{}.json.gz", ARCHIVE_PREFIX, task_id, at.timestamp())
}

pub fn encode_archive(logs: &[LogRecord]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(logs)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

pub fn decode_archive(bytes: &[u8]) -> Result<Vec<LogRecord>> {
    let mut json = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Serializes log batches and uploads them write-once.
#[derive(Clone)]
pub struct Archiver {
    store: Arc<dyn BlobStore>,
}

impl Archiver {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Upload `logs` as one archive object for `task_id`. An empty slice still
    /// produces an object holding `[]`.
    pub async fn upload_logs(&self, task_id: &str, logs: &[LogRecord]) -> Result<UploadMetadata> {
        let key = archive_key(task_id, Utc::now());
        let body = encode_archive(logs)?;
        self.store.put_once(&key, body).await
    }
}
