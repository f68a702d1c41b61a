use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Root for the ledger keyspace, which also holds the durable queue
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
}

impl ServerConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MB
}

/// Queue backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Memory,
    #[default]
    Fjall,
}

/// Queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    #[serde(default = "default_index_target")]
    pub index_target: String,
    #[serde(default = "default_archive_target")]
    pub archive_target: String,
    #[serde(default = "default_cleanup_target")]
    pub cleanup_target: String,
    /// How long a received message stays hidden before it is redelivered
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout: HumanDuration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            index_target: default_index_target(),
            archive_target: default_archive_target(),
            cleanup_target: default_cleanup_target(),
            visibility_timeout: default_visibility_timeout(),
        }
    }
}

fn default_index_target() -> String {
    "audit-log-index".to_string()
}

fn default_archive_target() -> String {
    "audit-log-archive".to_string()
}

fn default_cleanup_target() -> String {
    "audit-log-cleanup".to_string()
}

fn default_visibility_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

/// Worker poll-loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_workers_enabled")]
    pub enabled: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_wait_time")]
    pub wait_time: HumanDuration,
    #[serde(default = "default_receive_backoff")]
    pub receive_backoff: HumanDuration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_workers_enabled(),
            batch_size: default_batch_size(),
            wait_time: default_wait_time(),
            receive_backoff: default_receive_backoff(),
        }
    }
}

fn default_workers_enabled() -> bool {
    true
}

fn default_batch_size() -> usize {
    5
}

fn default_wait_time() -> HumanDuration {
    HumanDuration::from_secs(20)
}

fn default_receive_backoff() -> HumanDuration {
    HumanDuration::from_secs(2)
}

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
    S3,
}

/// Archive storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Filesystem root for the `local` provider
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub allow_http: bool,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: default_bucket(),
            root: default_storage_root(),
            endpoint: None,
            region: default_region(),
            allow_http: false,
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_bucket() -> String {
    "auditbox-archive".to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/archive")
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Search backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    Memory,
    #[default]
    OpenSearch,
}

/// Search index configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub backend: SearchBackend,
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_index")]
    pub index: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    pub username: Option<String>,
    /// Loaded from environment, not from config file
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: SearchBackend::default(),
            endpoint: default_search_endpoint(),
            index: default_search_index(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            username: None,
            password: None,
        }
    }
}

fn default_search_endpoint() -> String {
    "http://localhost:9200".to_string()
}

fn default_search_index() -> String {
    "audit-logs".to_string()
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(5)
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Buffered notifications per live-feed subscriber
    #[serde(default = "default_live_feed_capacity")]
    pub live_feed_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            live_feed_capacity: default_live_feed_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_live_feed_capacity() -> usize {
    1024
}
