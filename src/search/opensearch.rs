//! OpenSearch REST client for the audit log index

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url, header::CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::models::LogRecord;

use super::{
    DELETE_CHUNK_SIZE, Result, SearchError, SearchIndex, bulk_delete_body, bulk_index_body,
};

const NDJSON: &str = "application/x-ndjson";

/// OpenSearch client configuration
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    pub endpoint: String,
    pub index: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
    pub delete_chunk_size: usize,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            index: "audit-logs".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            username: None,
            password: None,
            delete_chunk_size: DELETE_CHUNK_SIZE,
        }
    }
}

impl From<&SearchConfig> for OpenSearchConfig {
    fn from(config: &SearchConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            index: config.index.clone(),
            connect_timeout: config.connect_timeout.as_duration(),
            request_timeout: config.request_timeout.as_duration(),
            username: config.username.clone(),
            password: config.password.clone(),
            delete_chunk_size: DELETE_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

impl BulkResponse {
    /// Items whose action object carries an `error` field.
    fn failed_items(&self) -> usize {
        self.items
            .iter()
            .filter(|item| {
                item.as_object()
                    .and_then(|actions| actions.values().next())
                    .is_some_and(|action| action.get("error").is_some())
            })
            .count()
    }
}

pub struct OpenSearchClient {
    client: Client,
    base: Url,
    config: OpenSearchConfig,
}

impl OpenSearchClient {
    pub fn new(config: OpenSearchConfig) -> Result<Self> {
        if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
            return Err(SearchError::InvalidConfig(format!(
                "endpoint must be http(s): {}",
                config.endpoint
            )));
        }

        let base = Url::parse(&config.endpoint)
            .map_err(|e| SearchError::InvalidConfig(format!("endpoint {}: {}", config.endpoint, e)))?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(concat!("auditbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        Ok(Self { client, base, config })
    }

    /// `{endpoint}/{index}/{segments..}` with every segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::InvalidConfig(format!("endpoint cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .push(&self.config.index)
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else {
                    SearchError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn bulk(&self, body: String, total: usize) -> Result<()> {
        let request = self
            .client
            .post(self.url(&["_bulk"])?)
            .header(CONTENT_TYPE, NDJSON)
            .body(body);

        let response: BulkResponse = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(format!("Failed to read bulk response: {}", e)))?;

        let failed = response.failed_items();
        if response.errors || failed > 0 {
            warn!(failed, total, "Bulk request partially rejected");
            return Err(SearchError::BulkItems { failed, total });
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for OpenSearchClient {
    async fn index_log(&self, log: &LogRecord) -> Result<()> {
        let request = self
            .client
            .put(self.url(&["_doc", log.id.as_str()])?)
            .json(log);
        self.send(request).await?;
        debug!(log_id = %log.id, "Indexed log");
        Ok(())
    }

    async fn index_logs_bulk(&self, logs: &[LogRecord]) -> Result<()> {
        if logs.is_empty() {
            return Ok(());
        }
        self.bulk(bulk_index_body(logs)?, logs.len()).await?;
        debug!(count = logs.len(), "Bulk indexed logs");
        Ok(())
    }

    async fn delete_logs_bulk(&self, ids: &[String]) -> Result<()> {
        for chunk in ids.chunks(self.config.delete_chunk_size.max(1)) {
            self.bulk(bulk_delete_body(chunk), chunk.len()).await?;
            debug!(count = chunk.len(), "Bulk deleted documents");
        }
        Ok(())
    }
}
