//! Operation handlers (§6 "Operations") — enqueues and inspects background
//! work run by the operation queue (§4.F).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use audiobook_core::{OperationId, OperationPriority, OperationType, OrganizeParams, ScanParams};

use crate::dto::{
    ApiResponse, OperationAccepted, OperationLogsResponse, OperationStatusResponse, OrganizeRequest, ScanRequest,
};
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn start_scan(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<OperationAccepted>>)> {
    let import_path_id = audiobook_core::ImportPathId(req.import_path_id);
    let import_paths = state.store.list_import_paths().await?;
    let root = import_paths
        .into_iter()
        .find(|p| p.id == import_path_id)
        .ok_or_else(|| ApiError::not_found(format!("no import path {}", req.import_path_id)))?
        .absolute_path;

    let params = ScanParams { import_path_id: req.import_path_id, root: root.into() };
    let params_bytes = serde_json::to_vec(&params)
        .map_err(|e| ApiError::bad_request(format!("failed to encode scan params: {e}")))?;

    let operation = state
        .queue
        .enqueue(OperationType::Scan, OperationPriority::NORMAL, Some(root.clone()), params_bytes)
        .await?;

    Ok((StatusCode::ACCEPTED, ApiResponse::ok(OperationAccepted { operation_id: operation.id.to_string() })))
}

/// Queues a library-wide organize pass as an `Organize` operation (§4.H)
/// rather than running it synchronously on the request thread, so a crash or
/// cancel mid-run leaves a resumable `Interrupted` operation (§8 S5).
pub async fn start_organize(
    State(state): State<AppState>,
    Json(req): Json<OrganizeRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<OperationAccepted>>)> {
    let params = OrganizeParams { dry_run: req.dry_run };
    let params_bytes = serde_json::to_vec(&params)
        .map_err(|e| ApiError::bad_request(format!("failed to encode organize params: {e}")))?;

    let operation = state
        .queue
        .enqueue(OperationType::Organize, OperationPriority::NORMAL, None, params_bytes)
        .await?;

    Ok((StatusCode::ACCEPTED, ApiResponse::ok(OperationAccepted { operation_id: operation.id.to_string() })))
}

fn parse_operation_id(raw: &str) -> ApiResult<OperationId> {
    uuid::Uuid::parse_str(raw)
        .map(OperationId)
        .map_err(|_| ApiError::bad_request(format!("not a valid operation id: {raw}")))
}

pub async fn operation_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<OperationStatusResponse>>> {
    let id = parse_operation_id(&id)?;
    let operation = state.store.get_operation(&id).await?;
    Ok(ApiResponse::ok(OperationStatusResponse { operation }))
}

pub async fn operation_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<OperationLogsResponse>>> {
    let id = parse_operation_id(&id)?;
    let logs = state.store.list_operation_logs(&id).await?;
    Ok(ApiResponse::ok(OperationLogsResponse { logs }))
}

/// Cooperative cancellation (§4.F Cancellation): cancels a still-running
/// operation rather than deleting its history.
pub async fn cancel_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_operation_id(&id)?;
    state.queue.cancel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
