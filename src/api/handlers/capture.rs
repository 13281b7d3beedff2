//! Capture endpoints
//!
//! Captures are serialized through the state's single-permit semaphore and
//! the blocking pcap decode runs off the request-handling threads.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{csv_attachment, join_error};
use crate::aggregate::Aggregator;
use crate::api::state::AppState;
use crate::capture::{reader, run_capture};
use crate::config::AggregatorConfig;
use crate::error::{PipelineError, Result};
use crate::features::{rows_to_table, FeatureExtractor, FeatureRow};
use crate::predict::predict_table;

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    /// Capture duration in seconds
    pub duration: u64,
}

/// Capture on the shared interface, then decode and extract feature rows.
async fn capture_and_extract(state: &AppState, duration: u64) -> Result<Vec<FeatureRow>> {
    let pcap_path = {
        let _permit = state
            .capture_lock
            .acquire()
            .await
            .map_err(|_| PipelineError::Internal("capture lock closed".to_string()))?;
        run_capture(&state.config.capture, duration).await?
    };

    extract_rows(pcap_path, state.config.aggregator.clone()).await
}

/// Blocking pcap decode + aggregation + extraction, off the async threads.
pub(super) async fn extract_rows(
    pcap_path: PathBuf,
    config: AggregatorConfig,
) -> Result<Vec<FeatureRow>> {
    tokio::task::spawn_blocking(move || -> Result<Vec<FeatureRow>> {
        let packets = reader::read_pcap(&pcap_path)?;
        let mut aggregator = Aggregator::new(&config);
        for packet in &packets {
            aggregator.push(packet);
        }
        let records = aggregator.finish();
        info!(
            "Decoded {} packets into {} connections",
            packets.len(),
            records.len()
        );

        let extractor =
            FeatureExtractor::new(config.recent_window_size, config.host_window_size);
        Ok(extractor.extract(&records))
    })
    .await
    .map_err(join_error)?
}

/// POST /api/capture — capture and return the extracted rows as CSV.
/// An empty capture yields an empty CSV, not an error.
pub async fn capture_csv(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CaptureRequest>,
) -> Result<Response> {
    let rows = capture_and_extract(&state, request.duration).await?;
    let csv = rows_to_table(&rows).to_csv_string()?;
    Ok(csv_attachment("captured_data.csv", csv))
}

/// POST /api/capture/analyze — capture, extract, and classify in one call.
/// This endpoint requires at least one connection.
pub async fn capture_analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CaptureRequest>,
) -> Result<Json<Value>> {
    let rows = capture_and_extract(&state, request.duration).await?;
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
            })
        })
        .collect();

    Ok(Json(json!({
        "status": "success",
        "total_connections": report.total_rows,
        "summary": report.summary,
        "details": details,
    })))
}
