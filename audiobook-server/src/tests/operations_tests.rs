//! Operation-queue handler tests: enqueueing a scan, inspecting status, and
//! cancellation, grounded the same way as `books_tests.rs`.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::test_utils::setup_test_state;
use crate::routes::build_router;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn start_scan_without_import_path_returns_404() {
    let (state, _dir) = setup_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/operations/scan")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json!({ "import_path_id": 1 })).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn start_scan_enqueues_operation_for_known_import_path() {
    let (state, dir) = setup_test_state().await;
    let root = dir.path().join("library");
    std::fs::create_dir_all(&root).unwrap();
    let import_path = audiobook_core::ImportPath {
        id: audiobook_core::ImportPathId(1),
        absolute_path: root.to_string_lossy().to_string(),
        display_name: "main".into(),
        enabled: true,
        last_scan_at: None,
        book_count: 0,
    };
    state.store.create_import_path(import_path).await.unwrap();
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/operations/scan")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json!({ "import_path_id": 1 })).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert!(body["data"]["operation_id"].as_str().is_some());
}

#[tokio::test]
async fn operation_status_returns_404_for_unknown_id() {
    let (state, _dir) = setup_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/operations/{}/status", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn operation_status_rejects_malformed_id() {
    let (state, _dir) = setup_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/operations/not-a-uuid/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_operation_returns_404_when_not_running() {
    let (state, _dir) = setup_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/operations/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
