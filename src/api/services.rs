use std::collections::HashMap;

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::info;

use super::{
    error::ApiError,
    models::{BulkCreateLogsRequest, BulkCreateLogsResponse, CleanupRequest, CreateLogRequest, HealthResponse},
    state::AppState,
    utils::{identity, read_body, require_json},
    validation::{validate_batch, validate_cutoff, validate_log},
};

/// Check the content type, read the bounded body and parse it.
async fn json_body<T: DeserializeOwned>(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
) -> Result<T, ApiError> {
    require_json(headers)?;
    let bytes = read_body(body, state.max_body_bytes).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Record one audit log (POST /logs)
///
/// The log row, its reindex task and the index message commit together;
/// the response carries the stored record including its assigned id.
pub async fn create_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let caller = identity(&headers)?;
    let request: CreateLogRequest = json_body(&state, &headers, body).await?;
    validate_log(&request)?;

    let record = request.into_record(&caller.user_id, Utc::now());
    let log = state
        .create_log
        .execute(&caller.tenant_id, &caller.user_id, record)
        .await?;

    Ok((StatusCode::CREATED, Json(log)))
}

/// Record a batch of audit logs under one reindex task (POST /logs/bulk)
pub async fn create_logs_bulk(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let caller = identity(&headers)?;
    let request: BulkCreateLogsRequest = json_body(&state, &headers, body).await?;
    validate_batch(&request.logs)?;

    let received_at = Utc::now();
    let records = request
        .logs
        .into_iter()
        .map(|log| log.into_record(&caller.user_id, received_at))
        .collect();
    let logs = state
        .create_log
        .execute_bulk(&caller.tenant_id, &caller.user_id, records)
        .await?;

    let response = BulkCreateLogsResponse {
        count: logs.len(),
        logs,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Start archival and cleanup of logs older than `before_date` (POST /logs/cleanup)
///
/// Responds 202 with the archive task; poll `GET /tasks/{task_id}` for progress.
pub async fn request_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let caller = identity(&headers)?;
    let request: CleanupRequest = json_body(&state, &headers, body).await?;
    validate_cutoff(request.before_date, Utc::now())?;

    let task = state
        .retention
        .execute(&caller.tenant_id, &caller.user_id, request.before_date)
        .await?;

    info!(task_id = %task.task_id, tenant_id = %caller.tenant_id, "Cleanup accepted");
    Ok((StatusCode::ACCEPTED, Json(task)))
}

/// Task status (GET /tasks/{task_id})
///
/// Tenant callers only see their own tasks; another tenant's task is reported
/// as missing.
pub async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = identity(&headers)?;
    let task = state.tasks.get_by_id(&task_id)?;

    let visible = caller.tenant_id.is_empty() || task.tenant_id.as_deref() == Some(caller.tenant_id.as_str());
    if !visible {
        return Err(ApiError::NotFound(format!("task {task_id}")));
    }

    Ok((StatusCode::OK, Json(task)))
}

/// Liveness plus pipeline counters (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let response = HealthResponse {
        status: "healthy".to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}
