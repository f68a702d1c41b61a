use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Update,
    Delete,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// One audit event as persisted in the ledger and shipped to search and archives.
///
/// `id` and `tenant_id` may arrive empty; the write path assigns an identifier
/// and stamps the caller's tenant before anything is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct LogRecord {
    #[serde(default)]
    #[builder(default)]
    pub id: String,
    #[serde(default)]
    #[builder(default)]
    pub tenant_id: String,
    pub user_id: String,
    pub action: Action,
    pub severity: Severity,
    pub event_timestamp: DateTime<Utc>,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl LogRecord {
    /// True when the record falls inside `scope`. `None` or an empty scope matches every tenant.
    pub fn in_scope(&self, scope: Option<&str>) -> bool {
        match scope {
            Some(tenant) if !tenant.is_empty() => self.tenant_id == tenant,
            _ => true,
        }
    }
}
