//! Pipeline error taxonomy
//!
//! Every failure mode the capture/extraction/inference pipeline can surface,
//! with enough context for the caller to self-diagnose (exact missing
//! columns, encodings tried, which interface failed).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required artifact file is missing. Non-retryable until a training
    /// run produces the artifact.
    #[error("required artifact missing: {0}")]
    Configuration(String),

    /// None of the candidate text encodings decoded the input.
    #[error("unable to decode input; encodings tried: {tried:?}")]
    Decoding { tried: Vec<&'static str> },

    /// Required columns are still missing after repair, or a categorical
    /// value was never seen at fit time.
    #[error("{0}")]
    Schema(#[from] SchemaError),

    /// The external capture tool is absent or no interface accepted the
    /// capture.
    #[error("capture failed: {0}")]
    Capture(String),

    /// Capture exceeded its hard time bound. Partial output has been
    /// removed by the time this is returned.
    #[error("capture timed out after {limit_secs}s")]
    CaptureTimeout { limit_secs: u64 },

    /// Zero connections were captured or extracted. Distinct from failure;
    /// the caller decides whether empty is acceptable.
    #[error("no connections in capture")]
    EmptyResult,

    #[error("authentication required")]
    Unauthorized,

    #[error("incorrect username or password")]
    InvalidCredentials,

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

/// Column-level schema violations, kept separate so callers can match on
/// the exact shape (missing set vs. unseen value).
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Sorted list of columns absent after repair.
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A categorical cell held a value outside the fitted vocabulary.
    #[error("unknown value {value:?} for column {column:?}")]
    UnknownCategory { column: String, value: String },

    /// Row width or cell type did not match the fitted metadata.
    #[error("malformed row {row}: {detail}")]
    MalformedRow { row: usize, detail: String },
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PipelineError::Configuration(_) => {
                tracing::error!("{}", self);
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            PipelineError::Decoding { .. } | PipelineError::Schema(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            PipelineError::Capture(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            PipelineError::CaptureTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, self.to_string())
            }
            PipelineError::EmptyResult => (StatusCode::BAD_REQUEST, self.to_string()),
            PipelineError::Unauthorized | PipelineError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            PipelineError::Csv(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            PipelineError::Io(_) | PipelineError::Internal(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_sorted() {
        let err = SchemaError::MissingColumns(vec!["flag".into(), "land".into()]);
        assert_eq!(err.to_string(), "missing required columns: flag, land");
    }

    #[test]
    fn test_decoding_error_names_attempts() {
        let err = PipelineError::Decoding {
            tried: vec!["utf-8", "latin-1"],
        };
        assert!(err.to_string().contains("utf-8"));
        assert!(err.to_string().contains("latin-1"));
    }
}
