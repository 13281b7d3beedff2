//! Schema-robust prediction
//!
//! Takes a tabular record set of unknown exact schema — an uploaded CSV or
//! packet-derived feature rows — and reconciles it against the trained
//! model's expected columns before classifying: decode, drop a label column
//! if present, default the one optional column, reject with the exact
//! missing set otherwise, reorder, transform, classify, map labels. Row
//! order is preserved end-to-end.

use serde::Serialize;
use serde_json::{json, Map};

use crate::error::{PipelineError, Result};
use crate::features::{EXPECTED_COLUMNS, LABEL_COLUMN, OPTIONAL_COLUMN};
use crate::model::Artifacts;
use crate::table::{Table, Value};

/// One labeled row, echoing its input features
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// 1-based input row number
    pub row_id: usize,
    pub prediction: String,
    pub features: Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionSummary {
    pub normal: usize,
    pub attacks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub total_rows: usize,
    pub predictions: Vec<Prediction>,
    pub summary: PredictionSummary,
}

/// Decode uploaded bytes and predict.
pub fn predict_csv(artifacts: &Artifacts, bytes: &[u8]) -> Result<PredictionReport> {
    let table = Table::from_csv_bytes(bytes)?;
    predict_table(artifacts, table)
}

/// Repair, reorder, transform, classify.
pub fn predict_table(artifacts: &Artifacts, mut table: Table) -> Result<PredictionReport> {
    if table.is_empty() {
        return Err(PipelineError::EmptyResult);
    }

    // A training-style label column is irrelevant at inference time.
    table.drop_column(LABEL_COLUMN);

    // The single recognized-missing column; anything else missing is the
    // caller's problem and is reported exactly.
    if !table.has_column(OPTIONAL_COLUMN) {
        table.add_column(OPTIONAL_COLUMN, Value::Number(0.0));
    }

    let ordered = table.select(&EXPECTED_COLUMNS)?;
    let encoded = artifacts.preprocessor.transform(&ordered)?;
    let classes = artifacts.classifier.predict(&encoded);

    let predictions: Vec<Prediction> = classes
        .iter()
        .enumerate()
        .map(|(i, &class)| Prediction {
            row_id: i + 1,
            prediction: artifacts.labels.name_of(class).to_string(),
            features: row_features(&ordered, i),
        })
        .collect();

    let normal = predictions
        .iter()
        .filter(|p| p.prediction.to_lowercase().contains("normal"))
        .count();

    Ok(PredictionReport {
        total_rows: predictions.len(),
        summary: PredictionSummary {
            normal,
            attacks: predictions.len() - normal,
        },
        predictions,
    })
}

fn row_features(table: &Table, row: usize) -> Map<String, serde_json::Value> {
    let mut map = Map::new();
    for column in table.columns() {
        let value = match table.get(row, column) {
            Some(Value::Number(n)) => json!(n),
            Some(Value::Text(s)) => json!(s),
            None => json!(null),
        };
        map.insert(column.clone(), value);
    }
    map
}
