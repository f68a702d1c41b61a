//! Request and response bodies of the HTTP adapter.
//!
//! A single log submission (`POST /logs`):
//!
//! ```json
//! {
//!   "action": "UPDATE",
//!   "severity": "WARNING",
//!   "message": "changed billing plan",
//!   "resource": "subscription",
//!   "resource_id": "sub_42",
//!   "before_state": {"plan": "basic"},
//!   "after_state": {"plan": "pro"}
//! }
//! ```
//!
//! `id`, `tenant_id`, `user_id` and `event_timestamp` are optional; they
//! default to a fresh identifier, the caller's identity headers and the
//! receive time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Action, LogRecord, Severity};
use crate::observability::MetricsSnapshot;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLogRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub action: Action,
    pub severity: Severity,
    #[serde(default)]
    pub event_timestamp: Option<DateTime<Utc>>,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub before_state: Option<Value>,
    #[serde(default)]
    pub after_state: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl CreateLogRequest {
    /// Fill absent identity fields from the caller and the receive time.
    pub fn into_record(self, caller_user: &str, received_at: DateTime<Utc>) -> LogRecord {
        LogRecord {
            id: self.id.unwrap_or_default(),
            tenant_id: self.tenant_id.unwrap_or_default(),
            user_id: self
                .user_id
                .filter(|user| !user.is_empty())
                .unwrap_or_else(|| caller_user.to_string()),
            action: self.action,
            severity: self.severity,
            event_timestamp: self.event_timestamp.unwrap_or(received_at),
            message: self.message,
            session_id: self.session_id,
            resource: self.resource,
            resource_id: self.resource_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            before_state: self.before_state,
            after_state: self.after_state,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkCreateLogsRequest {
    pub logs: Vec<CreateLogRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkCreateLogsResponse {
    pub count: usize,
    pub logs: Vec<LogRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupRequest {
    pub before_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub metrics: MetricsSnapshot,
}
