//! System handlers (§6 "System").

use axum::extract::State;
use axum::Json;

use crate::dto::{ApiResponse, SystemStatusResponse};
use crate::errors::ApiResult;
use crate::state::AppState;

pub async fn system_status(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<SystemStatusResponse>>> {
    let stats = state.store.get_dashboard_stats().await?;
    let uptime_seconds = (chrono::Utc::now() - state.started_at).num_seconds();
    let settings = state.settings.read().await;
    Ok(ApiResponse::ok(SystemStatusResponse {
        uptime_seconds,
        total_books: stats.total_books,
        soft_deleted_books: stats.soft_deleted_books,
        total_authors: stats.total_authors,
        total_series: stats.total_series,
        queue_worker_count: settings.worker_count,
    }))
}

/// Tails recent process-wide log lines, outside the OperationLog kept per
/// operation (§6 "Persistent state layout" — the daily rolling file next to
/// the binary).
pub async fn system_logs(State(_state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<String>>>> {
    let log_path = crate::logging::today_log_path();

    let lines = match tokio::fs::read_to_string(&log_path).await {
        Ok(contents) => contents.lines().rev().take(500).map(str::to_string).collect(),
        Err(_) => Vec::new(),
    };
    Ok(ApiResponse::ok(lines))
}
