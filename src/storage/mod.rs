//! Object storage abstraction for log archives
//! Uses Apache Arrow object_store crate

pub mod archive;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::{ObjectStore, PutMode, PutOptions, path::Path as StoragePath};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageConfig, StorageProvider};

pub use archive::{ARCHIVE_PREFIX, Archiver, archive_key, decode_archive, encode_archive};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("Archive encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Write-once blob sink used by the archive worker.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `data` under `key`, failing if the key is already taken.
    async fn put_once(&self, key: &str, data: Vec<u8>) -> Result<UploadMetadata>;
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            bucket: "auditbox-local".to_string(),
        }
    }

    /// Build the backend selected by configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Memory => Ok(Self {
                bucket: config.bucket.clone(),
                ..Self::in_memory()
            }),
            StorageProvider::Local => {
                std::fs::create_dir_all(&config.root)?;
                let store = LocalFileSystem::new_with_prefix(&config.root)?;
                tracing::info!(root = %config.root.display(), "Using local archive storage");
                Ok(Self::new(Arc::new(store), config.bucket.clone()))
            }
            StorageProvider::S3 => {
                let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key)
                else {
                    return Err(StorageError::InvalidConfig(
                        "S3 storage requires access and secret keys".to_string(),
                    ));
                };

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(&config.bucket)
                    .with_region(&config.region)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_allow_http(config.allow_http);
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }

                tracing::info!(bucket = %config.bucket, region = %config.region, "Using S3 archive storage");
                Ok(Self::new(Arc::new(builder.build()?), config.bucket.clone()))
            }
        }
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;

        tracing::info!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    /// Keys stored directly under `prefix`
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = StoragePath::from(prefix);
        let listing = self.store.list_with_delimiter(Some(&prefix)).await?;
        Ok(listing
            .objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect())
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for StorageClient {
    async fn put_once(&self, key: &str, data: Vec<u8>) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();

        let put_result = match self
            .store
            .put_opts(&path, data.into(), PutOptions::from(PutMode::Create))
            .await
        {
            Ok(result) => result,
            Err(object_store::Error::AlreadyExists { .. }) => {
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(key, size, "Uploaded to storage");

        Ok(UploadMetadata {
            key: key.to_string(),
            etag: put_result.e_tag,
            size,
        })
    }
}
