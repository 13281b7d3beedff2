//! API surface tests: auth gating, token issuance, status reporting.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use netwarden::api::{self, state::AppState};
use netwarden::config::Config;

fn test_state(temp: &TempDir) -> Arc<AppState> {
    let mut config = Config::default();
    config.model.model_dir = temp.path().join("models");
    config.model.train_data_path = temp.path().join("train.csv");
    config.model.combined_data_path = temp.path().join("combined.csv");
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.auth.bootstrap_user = "admin".to_string();
    config.auth.bootstrap_password = "correct horse".to_string();
    Arc::new(AppState::new(config).unwrap())
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_open() {
    let temp = TempDir::new().unwrap();
    let app = api::router(test_state(&temp));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let temp = TempDir::new().unwrap();
    let app = api::router(test_state(&temp));

    let response = app
        .oneshot(
            Request::get("/api/train/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let temp = TempDir::new().unwrap();
    let app = api::router(test_state(&temp));

    let response = app
        .oneshot(
            Request::post("/auth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=admin&password=wrong"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn issued_token_unlocks_status_endpoint() {
    let temp = TempDir::new().unwrap();
    let state = test_state(&temp);

    let login = api::router(state.clone())
        .oneshot(
            Request::post("/auth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=admin&password=correct%20horse"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::OK);
    let token_body = body_json(login).await;
    assert_eq!(token_body["token_type"], "bearer");
    let token = token_body["access_token"].as_str().unwrap().to_string();

    let response = api::router(state)
        .oneshot(
            Request::get("/api/train/status")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status = body_json(response).await;
    assert_eq!(status["all_models_available"], serde_json::json!(false));
    assert!(status["models"]["generator.bin"]["exists"].is_boolean());
}

#[tokio::test]
async fn prediction_without_artifacts_is_service_unavailable() {
    let temp = TempDir::new().unwrap();
    let state = test_state(&temp);

    let token = state.auth.issue_token("admin").unwrap();
    let response = api::router(state)
        .oneshot(
            Request::post("/api/predict")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "text/csv")
                .body(Body::from("duration,protocol_type\n0,tcp\n"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
