use std::future::Future;
use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{create_log, create_logs_bulk, get_task, health, request_cleanup},
    state::AppState,
    stream::stream_logs,
};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/logs", post(create_log))
        .route("/logs/bulk", post(create_logs_bulk))
        .route("/logs/cleanup", post(request_cleanup))
        .route("/logs/stream", get(stream_logs))
        .route("/tasks/{task_id}", get(get_task))
        .route("/health", get(health))
        .with_state(state)
        // Content-Encoding is undone before handlers see the body, so size
        // limits apply to the decompressed payload.
        .layer(RequestDecompressionLayer::new())
}

/// Serve the API on `address` until `shutdown` resolves.
pub async fn serve<F>(address: SocketAddr, state: AppState, shutdown: F) -> Result<(), AnyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(address).await?;
    info!(%address, "AuditBox API listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
