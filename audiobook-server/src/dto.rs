//! Request/response bodies for the HTTP surface (§6). Successful responses
//! are wrapped in [`ApiResponse`] so every body has the `{ data?, error? }`
//! shape the spec requires; failures go through [`crate::errors::ApiError`]
//! instead (its own `IntoResponse` writes the `error` half).

use serde::{Deserialize, Serialize};

use audiobook_core::{Book, ImportPath, MetadataFieldState, Operation, OperationLogEntry};

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> axum::Json<Self> {
        axum::Json(Self { data })
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Serialize)]
pub struct BookListResponse {
    pub books: Vec<Book>,
    pub total: u64,
}

/// Partial update for `PUT /audiobooks/{id}` (§6); absent fields are left
/// untouched on the stored Book.
#[derive(Deserialize, Default)]
pub struct BookUpdateRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub narrator: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub series_position: Option<f32>,
    #[serde(default)]
    pub isbn10: Option<String>,
    #[serde(default)]
    pub isbn13: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct LinkVersionRequest {
    pub other_book_id: String,
    #[serde(default)]
    pub version_label: Option<String>,
}

#[derive(Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<Book>,
}

#[derive(Deserialize)]
pub struct CreateImportPathRequest {
    pub absolute_path: String,
    pub display_name: String,
}

#[derive(Deserialize)]
pub struct ScanRequest {
    pub import_path_id: u64,
}

#[derive(Deserialize, Default)]
pub struct OrganizeRequest {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Serialize)]
pub struct OperationAccepted {
    pub operation_id: String,
}

#[derive(Serialize)]
pub struct OperationStatusResponse {
    #[serde(flatten)]
    pub operation: Operation,
}

#[derive(Serialize)]
pub struct OperationLogsResponse {
    pub logs: Vec<OperationLogEntry>,
}

#[derive(Serialize)]
pub struct ImportPathsResponse {
    pub import_paths: Vec<ImportPath>,
}

#[derive(Deserialize)]
pub struct MetadataSearchRequest {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
}

#[derive(Deserialize)]
pub struct MetadataApplyRequest {
    pub provider: String,
    /// Indices into the candidate list from the preceding search, applied in
    /// order (§4.E "a caller-selected candidate, field by field").
    pub fields: Vec<String>,
}

#[derive(Serialize)]
pub struct FieldStatesResponse {
    pub field_states: Vec<MetadataFieldState>,
}

#[derive(Serialize)]
pub struct SystemStatusResponse {
    pub uptime_seconds: i64,
    pub total_books: u64,
    pub soft_deleted_books: u64,
    pub total_authors: u64,
    pub total_series: u64,
    pub queue_worker_count: usize,
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub library_root: String,
    pub db_type: String,
    pub server_host: String,
    pub server_port: u16,
    pub worker_count: usize,
    pub organize_template: String,
    pub openlibrary_base_url: String,
    pub google_books_base_url: String,
    pub audnexus_base_url: String,
    pub userlibrary_bearer_token: Option<String>,
    pub provenance: std::collections::HashMap<String, String>,
}

#[derive(Deserialize)]
pub struct ConfigUpdateRequest {
    #[serde(default)]
    pub organize_template: Option<String>,
    #[serde(default)]
    pub worker_count: Option<usize>,
    #[serde(default)]
    pub openlibrary_base_url: Option<String>,
    #[serde(default)]
    pub google_books_base_url: Option<String>,
    #[serde(default)]
    pub audnexus_base_url: Option<String>,
    #[serde(default)]
    pub userlibrary_bearer_token: Option<String>,
}

#[derive(Deserialize)]
pub struct BrowseQuery {
    pub path: String,
}

#[derive(Serialize)]
pub struct DirEntryResponse {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}
