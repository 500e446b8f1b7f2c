//! Config endpoint tests: reading defaults and round-tripping an update,
//! including that a stored bearer token never comes back in the clear.

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
async fn get_config_reflects_initial_settings() {
    let (state, _dir) = setup_test_state().await;
    let app = build_router(state);

    let response = app.oneshot(Request::builder().uri("/api/v1/config").body(Body::empty()).unwrap()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["organize_template"], "{author}/{title}.{format}");
    assert_eq!(body["data"]["userlibrary_bearer_token"], Value::Null);
}

#[tokio::test]
async fn update_config_masks_bearer_token_in_response() {
    let (state, _dir) = setup_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/config")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json!({ "userlibrary_bearer_token": "super-secret-token-value" })).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let masked = body["data"]["userlibrary_bearer_token"].as_str().unwrap();
    assert!(!masked.contains("super-secret"));
    assert!(masked.ends_with("alue"));
}
