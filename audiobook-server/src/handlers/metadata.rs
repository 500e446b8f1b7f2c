//! Standalone metadata handlers (§6 "Metadata") — search/bulk-fetch that
//! aren't scoped to an existing Book.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;

use audiobook_core::{OperationPriority, OperationType};

use crate::dto::{ApiResponse, MetadataSearchRequest, OperationAccepted};
use crate::errors::ApiResult;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct SearchParams {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
}

pub async fn search_metadata(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<ApiResponse<Vec<audiobook_core::providers::Candidate>>>> {
    let outcome = state.chain.search_by_title(&params.title, params.author.as_deref(), params.isbn.as_deref()).await;
    Ok(ApiResponse::ok(outcome.candidates))
}

/// Queues a bulk re-fetch across the whole library as a `BulkFetch`
/// operation rather than blocking the request on every book's provider
/// round trip (§4.F "operations that would otherwise hold an HTTP request
/// open go through the queue instead").
pub async fn bulk_fetch_metadata(
    State(state): State<AppState>,
    Json(_req): Json<MetadataSearchRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<OperationAccepted>>)> {
    let operation = state
        .queue
        .enqueue(OperationType::BulkFetch, OperationPriority::LOW, None, Vec::new())
        .await?;
    Ok((StatusCode::ACCEPTED, ApiResponse::ok(OperationAccepted { operation_id: operation.id.to_string() })))
}
