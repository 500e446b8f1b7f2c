//! Standalone metadata endpoint tests (search against an empty provider
//! chain, bulk-fetch enqueueing), same pattern as `books_tests.rs`.

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
async fn search_metadata_with_no_providers_returns_empty_candidates() {
    let (state, _dir) = setup_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/api/v1/metadata/search?title=Dune").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn bulk_fetch_metadata_enqueues_operation() {
    let (state, _dir) = setup_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/metadata/bulk-fetch")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json!({ "title": "" })).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert!(body["data"]["operation_id"].as_str().is_some());
}
