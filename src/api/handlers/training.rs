//! Training endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use super::join_error;
use crate::api::state::AppState;
use crate::error::Result;
use crate::train::{run_training, TrainOptions};

/// POST /api/train — run the full pipeline (generation → combination →
/// training) and respond once the new artifacts are active.
pub async fn train(
    State(state): State<Arc<AppState>>,
    Json(options): Json<TrainOptions>,
) -> Result<Json<Value>> {
    info!(
        synthetic = options.num_synthetic_samples,
        use_synthetic = options.use_synthetic_data,
        "Training requested"
    );

    let config = state.config.clone();
    let (artifacts, summary) =
        tokio::task::spawn_blocking(move || run_training(&config, &options))
            .await
            .map_err(join_error)??;

    // Atomic swap: in-flight inferences keep the old set, new requests see
    // the new one.
    state.replace_artifacts(artifacts).await;

    Ok(Json(json!({
        "status": "success",
        "message": "models trained successfully",
        "details": summary,
    })))
}

/// GET /api/train/status — per-artifact presence report for polling.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.store.status();
    let models: serde_json::Map<String, Value> = status
        .iter()
        .map(|entry| {
            (
                entry.name.clone(),
                json!({
                    "exists": entry.exists,
                    "path": entry.path,
                    "size_bytes": entry.size_bytes,
                }),
            )
        })
        .collect();

    Json(json!({
        "models": models,
        "model_directory": state.store.dir(),
        "all_models_available": status.iter().all(|s| s.exists),
    }))
}
