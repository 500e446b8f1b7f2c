//! Import path handlers (§6 "Import paths").

use axum::extract::{Path, State};
use axum::Json;

use audiobook_core::ImportPath;

use crate::dto::{ApiResponse, CreateImportPathRequest, ImportPathsResponse};
use crate::errors::ApiResult;
use crate::state::AppState;

pub async fn list_import_paths(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<ImportPathsResponse>>> {
    let import_paths = state.store.list_import_paths().await?;
    Ok(ApiResponse::ok(ImportPathsResponse { import_paths }))
}

pub async fn create_import_path(
    State(state): State<AppState>,
    Json(req): Json<CreateImportPathRequest>,
) -> ApiResult<Json<ApiResponse<ImportPath>>> {
    let path = ImportPath {
        id: audiobook_core::ImportPathId(state.store.next_counter("import_path").await?),
        absolute_path: req.absolute_path,
        display_name: req.display_name,
        enabled: true,
        last_scan_at: None,
        book_count: 0,
    };
    let created = state.store.create_import_path(path).await?;
    Ok(ApiResponse::ok(created))
}

pub async fn delete_import_path(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<axum::http::StatusCode> {
    state.store.delete_import_path(&audiobook_core::ImportPathId(id)).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
