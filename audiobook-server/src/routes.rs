//! Router assembly (§6 "HTTP surface", prefix `/api/v1`), grounded on the
//! teacher's `create_v1_router`/`create_*_routes` composition
//! (`ferrex-server/src/routes/v1.rs`).

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{books, config, events, filesystem, import_paths, metadata, operations, system};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", v1_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn v1_router() -> Router<AppState> {
    Router::new()
        .merge(books_routes())
        .merge(import_path_routes())
        .merge(operation_routes())
        .merge(system_routes())
        .merge(config_routes())
        .merge(metadata_routes())
        .merge(stream_routes())
}

fn books_routes() -> Router<AppState> {
    Router::new()
        .route("/audiobooks", get(books::list_books))
        .route("/audiobooks/search", get(books::search_books))
        .route("/audiobooks/count", get(books::count_books))
        .route("/audiobooks/:id", get(books::get_book).put(books::update_book).delete(books::delete_book))
        .route("/audiobooks/:id/versions", get(books::list_versions).post(books::link_version))
        .route("/audiobooks/:id/set-primary", put(books::set_primary_version))
        .route("/audiobooks/:id/fetch-metadata", post(books::fetch_metadata))
        .route("/audiobooks/:id/field-states", get(books::get_field_states))
        .route("/audiobooks/:id/metadata/search", post(books::search_metadata_for_book))
        .route("/audiobooks/:id/metadata/apply", post(books::apply_metadata))
}

fn import_path_routes() -> Router<AppState> {
    Router::new()
        .route("/import-paths", get(import_paths::list_import_paths).post(import_paths::create_import_path))
        .route("/import-paths/:id", delete(import_paths::delete_import_path))
}

fn operation_routes() -> Router<AppState> {
    Router::new()
        .route("/operations/scan", post(operations::start_scan))
        .route("/operations/organize", post(operations::start_organize))
        .route("/operations/:id/status", get(operations::operation_status))
        .route("/operations/:id/logs", get(operations::operation_logs))
        .route("/operations/:id", delete(operations::cancel_operation))
}

fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/system/status", get(system::system_status))
        .route("/system/logs", get(system::system_logs))
}

fn config_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(config::get_config).put(config::update_config))
        .route("/filesystem/home", get(filesystem::filesystem_home))
        .route("/filesystem/browse", get(filesystem::filesystem_browse))
}

fn metadata_routes() -> Router<AppState> {
    Router::new()
        .route("/metadata/search", get(metadata::search_metadata))
        .route("/metadata/bulk-fetch", post(metadata::bulk_fetch_metadata))
}

fn stream_routes() -> Router<AppState> {
    Router::new().route("/events", get(events::stream_events))
}
