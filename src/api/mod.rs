//! HTTP API
//!
//! Routing and middleware. Every `/api/*` route requires a bearer token;
//! `/auth/token` and `/health` are open.

pub mod auth;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/api/capture", post(handlers::capture::capture_csv))
        .route("/api/capture/analyze", post(handlers::capture::capture_analyze))
        .route("/api/predict", post(handlers::predict::predict_csv_upload))
        .route("/api/predict/pcap", post(handlers::predict::predict_pcap_upload))
        .route("/api/generate", post(handlers::generate::generate_csv))
        .route("/api/train", post(handlers::training::train))
        .route("/api/train/status", get(handlers::training::status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/token", post(handlers::token::issue_token))
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
