//! Request handlers

pub mod capture;
pub mod generate;
pub mod predict;
pub mod token;
pub mod training;

use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::error::PipelineError;

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// A CSV download response.
pub fn csv_attachment(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        body,
    )
        .into_response()
}

/// Map a join failure from a blocking task to an internal error.
pub(crate) fn join_error(err: tokio::task::JoinError) -> PipelineError {
    PipelineError::Internal(format!("worker task failed: {err}"))
}
