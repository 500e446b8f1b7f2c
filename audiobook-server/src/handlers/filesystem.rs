//! Filesystem browsing handlers (§6 "Config") used by the `--dir`/import
//! path picker in the UI.

use axum::extract::Query;
use axum::Json;

use crate::dto::{ApiResponse, BrowseQuery, DirEntryResponse};
use crate::errors::{ApiError, ApiResult};

pub async fn filesystem_home() -> ApiResult<Json<ApiResponse<String>>> {
    let home = dirs_home().ok_or_else(|| ApiError::bad_request("could not determine home directory"))?;
    Ok(ApiResponse::ok(home.to_string_lossy().into_owned()))
}

pub async fn filesystem_browse(
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<ApiResponse<Vec<DirEntryResponse>>>> {
    let path = std::path::Path::new(&query.path);
    let mut read_dir = tokio::fs::read_dir(path)
        .await
        .map_err(|e| ApiError::bad_request(format!("cannot browse {}: {e}", query.path)))?;

    let mut entries = Vec::new();
    while let Some(entry) =
        read_dir.next_entry().await.map_err(|e| ApiError::bad_request(format!("read error: {e}")))?
    {
        let file_type = entry.file_type().await.ok();
        entries.push(DirEntryResponse {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().to_string_lossy().into_owned(),
            is_dir: file_type.map(|t| t.is_dir()).unwrap_or(false),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ApiResponse::ok(entries))
}

fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}
