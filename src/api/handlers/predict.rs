//! Prediction endpoints

use std::io::Write;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use super::{capture::extract_rows, join_error};
use crate::api::state::AppState;
use crate::error::{PipelineError, Result};
use crate::features::rows_to_table;
use crate::predict::{predict_csv, predict_table, PredictionReport};

/// POST /api/predict — classify an uploaded CSV of feature rows.
pub async fn predict_csv_upload(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PredictionReport>> {
    let artifacts = state.artifacts().await?;
    let report = tokio::task::spawn_blocking(move || predict_csv(&artifacts, &body))
        .await
        .map_err(join_error)??;
    info!(
        "Classified {} uploaded rows ({} flagged)",
        report.total_rows, report.summary.attacks
    );
    Ok(Json(report))
}

/// POST /api/predict/pcap — extract connections from an uploaded capture
/// file and classify each one.
pub async fn predict_pcap_upload(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>> {
    // Spool the upload to disk for the pcap reader; the temp file is
    // removed on drop regardless of outcome.
    let temp = tokio::task::spawn_blocking(move || -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&body)?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(join_error)??;

    let rows = extract_rows(temp.path().to_path_buf(), state.config.aggregator.clone()).await?;
    drop(temp);

    if rows.is_empty() {
        return Err(PipelineError::EmptyResult);
    }

    let artifacts = state.artifacts().await?;
    let table = rows_to_table(&rows);
    let report = tokio::task::spawn_blocking(move || predict_table(&artifacts, table))
        .await
        .map_err(join_error)??;

    let details: Vec<Value> = report
        .predictions
        .iter()
        .zip(&rows)
        .map(|(prediction, row)| {
            json!({
                "connection_id": prediction.row_id,
                "src_ip": row.src_ip.to_string(),
                "dst_ip": row.dst_ip.to_string(),
                "service": row.service,
                "protocol": row.protocol_type,
                "prediction": prediction.prediction,
                "duration": row.duration,
                "src_bytes": row.src_bytes,
                "dst_bytes": row.dst_bytes,
            })
        })
        .collect();

    Ok(Json(json!({
        "total_connections": report.total_rows,
        "predictions": details,
        "summary": report.summary,
    })))
}
