//! Book handlers (§6 "Books").

use axum::extract::{Path, Query, State};
use axum::Json;

use audiobook_core::{MetadataFieldState, StaleWriteGuard};

use crate::dto::{
    ApiResponse, BookListResponse, BookUpdateRequest, FieldStatesResponse, LinkVersionRequest,
    ListQuery, MetadataApplyRequest, MetadataSearchRequest, VersionsResponse,
};
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;

pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ApiResponse<BookListResponse>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let books = state.store.list_books(limit, offset).await?;
    let total = state.store.count_books().await?;
    Ok(ApiResponse::ok(BookListResponse { books, total }))
}

pub async fn search_books(
    State(state): State<AppState>,
    Query(query): Query<crate::dto::SearchQuery>,
) -> ApiResult<Json<ApiResponse<BookListResponse>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let books = state.store.search_books(&query.q, limit, offset).await?;
    let total = books.len() as u64;
    Ok(ApiResponse::ok(BookListResponse { books, total }))
}

pub async fn count_books(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<u64>>> {
    let total = state.store.count_books().await?;
    Ok(ApiResponse::ok(total))
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<audiobook_core::Book>>> {
    let book = state.store.get_book(&audiobook_core::BookId(id)).await?;
    Ok(ApiResponse::ok(book))
}

pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<BookUpdateRequest>,
) -> ApiResult<Json<ApiResponse<audiobook_core::Book>>> {
    let id = audiobook_core::BookId(id);
    let mut book = state.store.get_book(&id).await?;
    let guard = StaleWriteGuard { expected_updated_at: book.updated_at };

    if let Some(v) = req.title {
        book.title = v;
    }
    if let Some(v) = req.narrator {
        book.narrator = Some(v);
    }
    if let Some(v) = req.language {
        book.language = Some(v);
    }
    if let Some(v) = req.publisher {
        book.publisher = Some(v);
    }
    if let Some(v) = req.year {
        book.year = Some(v);
    }
    if let Some(v) = req.series_position {
        book.series_position = Some(v);
    }
    if let Some(v) = req.isbn10 {
        book.isbn10 = Some(v);
    }
    if let Some(v) = req.isbn13 {
        book.isbn13 = Some(v);
    }
    if let Some(v) = req.description {
        book.description = Some(v);
    }
    book.updated_at = chrono::Utc::now();

    let updated = state.store.update_book(&id, book, Some(guard)).await?;
    state.hub.publish(audiobook_core::Event::LibraryChanged { book_id: updated.id.to_string() });
    Ok(ApiResponse::ok(updated))
}

pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<axum::http::StatusCode> {
    let id = audiobook_core::BookId(id);
    state.store.soft_delete_book(&id, chrono::Utc::now()).await?;
    state.hub.publish(audiobook_core::Event::LibraryChanged { book_id: id.to_string() });
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Versions sharing this book's `version_group_id` (§3 data model; falls
/// back to just this book when it has no group yet).
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<VersionsResponse>>> {
    let book = state.store.get_book(&audiobook_core::BookId(id)).await?;
    let Some(group_id) = book.version_group_id.clone() else {
        return Ok(ApiResponse::ok(VersionsResponse { versions: vec![book] }));
    };
    let all = state.store.list_books(10_000, 0).await?;
    let versions = all.into_iter().filter(|b| b.version_group_id.as_deref() == Some(group_id.as_str())).collect();
    Ok(ApiResponse::ok(VersionsResponse { versions }))
}

/// Links `other_book_id` into this book's version group, minting one if
/// neither book has one yet.
pub async fn link_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<LinkVersionRequest>,
) -> ApiResult<Json<ApiResponse<VersionsResponse>>> {
    let primary_id = audiobook_core::BookId(id);
    let mut primary = state.store.get_book(&primary_id).await?;
    let other_id = audiobook_core::BookId(req.other_book_id);
    let mut other = state.store.get_book(&other_id).await?;

    let group_id = primary.version_group_id.clone().unwrap_or_else(|| primary.id.to_string());
    primary.version_group_id = Some(group_id.clone());
    other.version_group_id = Some(group_id.clone());
    if let Some(label) = req.version_label {
        other.version_label = Some(label);
    }
    other.is_primary_version = false;

    let primary_guard = StaleWriteGuard { expected_updated_at: primary.updated_at };
    let other_guard = StaleWriteGuard { expected_updated_at: other.updated_at };
    let primary = state.store.update_book(&primary_id, primary, Some(primary_guard)).await?;
    let other = state.store.update_book(&other_id, other, Some(other_guard)).await?;

    Ok(ApiResponse::ok(VersionsResponse { versions: vec![primary, other] }))
}

pub async fn set_primary_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<VersionsResponse>>> {
    let id = audiobook_core::BookId(id);
    let mut target = state.store.get_book(&id).await?;
    let Some(group_id) = target.version_group_id.clone() else {
        return Err(ApiError::bad_request("book has no version group"));
    };

    let all = state.store.list_books(10_000, 0).await?;
    let siblings: Vec<_> = all.into_iter().filter(|b| b.version_group_id.as_deref() == Some(group_id.as_str())).collect();

    let mut updated = Vec::with_capacity(siblings.len());
    for mut sibling in siblings {
        if sibling.id == id {
            continue;
        }
        if sibling.is_primary_version {
            sibling.is_primary_version = false;
            let guard = StaleWriteGuard { expected_updated_at: sibling.updated_at };
            updated.push(state.store.update_book(&sibling.id.clone(), sibling, Some(guard)).await?);
        }
    }

    target.is_primary_version = true;
    let guard = StaleWriteGuard { expected_updated_at: target.updated_at };
    let target = state.store.update_book(&id, target, Some(guard)).await?;
    updated.push(target);
    Ok(ApiResponse::ok(VersionsResponse { versions: updated }))
}

/// Synchronous re-fetch-and-apply for a single book, outside the operation
/// queue (bulk fetches go through `POST /metadata/bulk-fetch` instead).
pub async fn fetch_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<audiobook_core::Book>>> {
    let id = audiobook_core::BookId(id);
    let book = state.store.get_book(&id).await?;
    let outcome = state.chain.search_by_title(&book.title, None, book.isbn13.as_deref()).await;
    apply_top_candidate(&state, book, &outcome.candidates).await
}

pub async fn get_field_states(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<FieldStatesResponse>>> {
    let id = audiobook_core::BookId(id);
    let field_states = state.store.get_metadata_field_states(&id).await?;
    Ok(ApiResponse::ok(FieldStatesResponse { field_states }))
}

pub async fn search_metadata_for_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MetadataSearchRequest>,
) -> ApiResult<Json<ApiResponse<Vec<audiobook_core::providers::Candidate>>>> {
    let _ = state.store.get_book(&audiobook_core::BookId(id)).await?;
    let outcome = state.chain.search_by_title(&req.title, req.author.as_deref(), req.isbn.as_deref()).await;
    for err in &outcome.errors {
        tracing::info!(provider_error = %err, "provider search failed, continuing with remaining candidates");
    }
    Ok(ApiResponse::ok(outcome.candidates))
}

pub async fn apply_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MetadataApplyRequest>,
) -> ApiResult<Json<ApiResponse<audiobook_core::Book>>> {
    let id = audiobook_core::BookId(id);
    let book = state.store.get_book(&id).await?;
    let outcome = state.chain.search_by_title(&book.title, None, book.isbn13.as_deref()).await;
    let candidate = outcome
        .candidates
        .iter()
        .find(|c| c.provider == req.provider)
        .ok_or_else(|| ApiError::bad_request(format!("no candidate from provider {}", req.provider)))?;

    apply_selected_fields(&state, book, candidate, &req.fields).await
}

async fn apply_top_candidate(
    state: &AppState,
    book: audiobook_core::Book,
    candidates: &[audiobook_core::providers::Candidate],
) -> ApiResult<Json<ApiResponse<audiobook_core::Book>>> {
    let Some(top) = candidates.first() else {
        return Ok(ApiResponse::ok(book));
    };
    let all_fields = vec![
        "title".into(), "authors".into(), "narrator".into(), "series".into(),
        "series_position".into(), "year".into(), "isbn".into(),
    ];
    apply_selected_fields(state, book, top, &all_fields).await
}

/// Writes the requested fields from `candidate` onto `book`, respecting
/// `MetadataFieldState.locked` (§4.E lock semantics — a locked field is
/// skipped here exactly as it would be mid-assembly).
async fn apply_selected_fields(
    state: &AppState,
    mut book: audiobook_core::Book,
    candidate: &audiobook_core::providers::Candidate,
    fields: &[String],
) -> ApiResult<Json<ApiResponse<audiobook_core::Book>>> {
    let existing_states = state.store.get_metadata_field_states(&book.id).await?;
    let locked: std::collections::HashSet<&str> =
        existing_states.iter().filter(|s| s.locked).map(|s| s.field.as_str()).collect();

    let guard = StaleWriteGuard { expected_updated_at: book.updated_at };
    let now = chrono::Utc::now();
    for field in fields {
        if locked.contains(field.as_str()) {
            continue;
        }
        match field.as_str() {
            "title" => {
                if let Some(v) = &candidate.title {
                    book.title = v.clone();
                }
            }
            "narrator" => book.narrator = candidate.narrator.clone().or(book.narrator.clone()),
            "series_position" => book.series_position = candidate.series_position.or(book.series_position),
            "year" => book.year = candidate.year.or(book.year),
            "isbn" => {
                book.isbn10 = candidate.isbn10.clone().or(book.isbn10.clone());
                book.isbn13 = candidate.isbn13.clone().or(book.isbn13.clone());
            }
            "authors" => {
                if let Some(name) = candidate.authors.first() {
                    let author = state.store.find_or_create_author(name).await?;
                    book.author_id = Some(author.id);
                }
            }
            "series" => {
                if let Some(name) = &candidate.series {
                    let series = state.store.find_or_create_series(name, book.author_id).await?;
                    book.series_id = Some(series.id);
                }
            }
            _ => continue,
        }

        state
            .store
            .upsert_metadata_field_state(MetadataFieldState {
                book_id: book.id.clone(),
                field: field.clone(),
                source: candidate.provider.clone(),
                fetched_value: assembler_field_value(candidate, field),
                override_value: None,
                locked: false,
                updated_at: now,
            })
            .await?;
    }

    book.updated_at = now;
    let updated = state.store.update_book(&book.id.clone(), book, Some(guard)).await?;
    state.hub.publish(audiobook_core::Event::LibraryChanged { book_id: updated.id.to_string() });
    Ok(ApiResponse::ok(updated))
}

fn assembler_field_value(candidate: &audiobook_core::providers::Candidate, field: &str) -> Option<String> {
    match field {
        "title" => candidate.title.clone(),
        "narrator" => candidate.narrator.clone(),
        "series" => candidate.series.clone(),
        "series_position" => candidate.series_position.map(|p| p.to_string()),
        "year" => candidate.year.map(|y| y.to_string()),
        "isbn" => candidate.isbn13.clone().or_else(|| candidate.isbn10.clone()),
        "authors" => candidate.authors.first().cloned(),
        _ => None,
    }
}
