//! Synthetic generation endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use super::{csv_attachment, join_error};
use crate::api::state::AppState;
use crate::error::{PipelineError, Result};
use crate::features::OPTIONAL_COLUMN;
use crate::generate::{generate_samples, GenerateOptions};
use crate::table::{Table, Value};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub num_samples: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fix for reproducible output; random when omitted.
    pub seed: Option<u64>,
}

fn default_batch_size() -> usize {
    50
}

/// POST /api/generate — produce synthetic rows as a CSV download.
pub async fn generate_csv(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response> {
    let synthesizer = state.store.load_synthesizer()?;
    let train_data_path = state.config.model.train_data_path.clone();
    let options = GenerateOptions {
        num_samples: request.num_samples,
        batch_size: request.batch_size,
        latent_dim: state.config.model.latent_dim,
        seed: request.seed.unwrap_or_else(rand::random),
    };

    let rows = tokio::task::spawn_blocking(move || -> Result<Table> {
        let bytes = std::fs::read(&train_data_path).map_err(|_| {
            PipelineError::Configuration(format!(
                "{} (training data missing)",
                train_data_path.display()
            ))
        })?;
        let mut reference = Table::from_csv_bytes(&bytes)?;
        if !reference.has_column(OPTIONAL_COLUMN) {
            reference.add_column(OPTIONAL_COLUMN, Value::Number(0.0));
        }
        generate_samples(&synthesizer, &reference, options)
    })
    .await
    .map_err(join_error)??;

    info!("Returning {} synthetic rows", rows.n_rows());
    Ok(csv_attachment("synthetic_data.csv", rows.to_csv_string()?))
}
