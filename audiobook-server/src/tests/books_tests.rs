//! HTTP-level book handler tests, grounded on the teacher's
//! `media_reference_tests.rs` (`app.oneshot(Request::builder()...)` style).

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use audiobook_core::Store;

use super::test_utils::setup_test_state;
use crate::routes::build_router;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn get_book_returns_404_for_unknown_id() {
    let (state, _dir) = setup_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/audiobooks/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_books_reflects_store_contents() {
    let (state, _dir) = setup_test_state().await;
    let book = audiobook_core::Book::new("/library/a.mp3");
    let created = state.store.create_book(book).await.unwrap();
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/audiobooks").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["books"][0]["id"], created.id.0);
}

#[tokio::test]
async fn update_book_applies_partial_fields_and_bumps_updated_at() {
    let (state, _dir) = setup_test_state().await;
    let mut book = audiobook_core::Book::new("/library/b.mp3");
    book.title = "Original Title".into();
    let created = state.store.create_book(book).await.unwrap();
    let original_updated_at = created.updated_at;
    let id = created.id.0.clone();
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/v1/audiobooks/{id}"))
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json!({ "narrator": "Jane Reader" })).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["title"], "Original Title");
    assert_eq!(body["data"]["narrator"], "Jane Reader");
    let new_updated_at: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(body["data"]["updated_at"].clone()).unwrap();
    assert!(new_updated_at >= original_updated_at);
}

#[tokio::test]
async fn delete_book_soft_deletes_and_excludes_from_default_list() {
    let (state, _dir) = setup_test_state().await;
    let book = audiobook_core::Book::new("/library/c.mp3");
    let created = state.store.create_book(book).await.unwrap();
    let id = created.id.0.clone();
    let store = state.store.clone();
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().method("DELETE").uri(format!("/api/v1/audiobooks/{id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let reloaded = store.get_book(&created.id).await.unwrap();
    assert!(reloaded.is_deleted());
}
