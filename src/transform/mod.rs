//! Column-type-aware tabular encoding
//!
//! Fits per-column metadata on a reference table, then maps rows to a
//! fixed-width numeric representation and back. Categorical columns become
//! one-hot blocks over a lexicographically sorted vocabulary (the sort order
//! is load-bearing: it fixes one-hot column ordering for every artifact that
//! consumes the encoding). Continuous columns are normalized against a small
//! Gaussian mixture, encoded as a scalar plus a one-hot component selector.
//!
//! Unknown categorical values at transform time are rejected with a
//! [`SchemaError`] unless the column was fitted with an explicit unknown
//! bucket.

pub mod gmm;

use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result, SchemaError};
use crate::table::{Table, Value};
use gmm::GaussianMixture;

/// Sentinel category used when a column opts into the unknown bucket.
pub const UNKNOWN_CATEGORY: &str = "<unknown>";

/// Default Gaussian mixture budget per continuous column.
pub const DEFAULT_MAX_COMPONENTS: usize = 10;

/// Fitted category set for one discrete column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    /// Lexicographically sorted; the unknown bucket, when present, is last.
    categories: Vec<String>,
    unknown_index: Option<usize>,
}

impl Vocabulary {
    fn fit<I: IntoIterator<Item = String>>(values: I, unknown_bucket: bool) -> Self {
        let set: BTreeSet<String> = values.into_iter().collect();
        let mut categories: Vec<String> = set.into_iter().collect();
        let unknown_index = if unknown_bucket {
            categories.push(UNKNOWN_CATEGORY.to_string());
            Some(categories.len() - 1)
        } else {
            None
        };
        Self {
            categories,
            unknown_index,
        }
    }

    pub fn size(&self) -> usize {
        self.categories.len()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn value_at(&self, index: usize) -> &str {
        &self.categories[index]
    }

    /// Encoding index for a value; falls back to the unknown bucket when
    /// fitted with one, else rejects.
    pub fn index_of(&self, column: &str, value: &str) -> Result<usize> {
        match self.categories.iter().position(|c| c == value) {
            Some(idx) => Ok(idx),
            None => match self.unknown_index {
                Some(idx) => Ok(idx),
                None => Err(SchemaError::UnknownCategory {
                    column: column.to_string(),
                    value: value.to_string(),
                }
                .into()),
            },
        }
    }
}

/// Per-column encoding descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColumnMeta {
    Categorical {
        name: String,
        vocab: Vocabulary,
    },
    Continuous {
        name: String,
        mixture: GaussianMixture,
    },
}

impl ColumnMeta {
    pub fn name(&self) -> &str {
        match self {
            ColumnMeta::Categorical { name, .. } => name,
            ColumnMeta::Continuous { name, .. } => name,
        }
    }

    pub fn output_width(&self) -> usize {
        match self {
            ColumnMeta::Categorical { vocab, .. } => vocab.size(),
            ColumnMeta::Continuous { mixture, .. } => 1 + mixture.n_components(),
        }
    }
}

/// How one slice of the encoded vector should be activated/decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanKind {
    /// A single tanh-range scalar
    Scalar,
    /// A one-hot block
    OneHot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub width: usize,
    pub kind: SpanKind,
}

/// Fit/transform/inverse_transform pipeline over mixed tabular data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnTransformer {
    metas: Vec<ColumnMeta>,
    output_dimensions: usize,
}

impl ColumnTransformer {
    /// Fit with strict vocabularies and the default mixture budget.
    pub fn fit(table: &Table, discrete_columns: &[&str]) -> Result<Self> {
        Self::fit_with_options(table, discrete_columns, false, DEFAULT_MAX_COMPONENTS)
    }

    /// Fit, optionally giving every discrete column an unknown bucket.
    pub fn fit_with_options(
        table: &Table,
        discrete_columns: &[&str],
        unknown_bucket: bool,
        max_components: usize,
    ) -> Result<Self> {
        let mut metas = Vec::with_capacity(table.n_columns());

        for name in table.columns() {
            let cells = table
                .column_values(name)
                .expect("iterating the table's own columns");

            if discrete_columns.contains(&name.as_str()) {
                let vocab =
                    Vocabulary::fit(cells.iter().map(|v| v.as_text()), unknown_bucket);
                metas.push(ColumnMeta::Categorical {
                    name: name.clone(),
                    vocab,
                });
            } else {
                let mut values = Vec::with_capacity(cells.len());
                for (row, cell) in cells.iter().enumerate() {
                    let v = cell.as_f64().ok_or_else(|| SchemaError::MalformedRow {
                        row,
                        detail: format!("non-numeric value in continuous column {name:?}"),
                    })?;
                    values.push(v);
                }
                let mixture = GaussianMixture::fit(&values, max_components);
                metas.push(ColumnMeta::Continuous {
                    name: name.clone(),
                    mixture,
                });
            }
        }

        let output_dimensions = metas.iter().map(|m| m.output_width()).sum();
        Ok(Self {
            metas,
            output_dimensions,
        })
    }

    /// Total width of the encoded representation.
    pub fn output_dimensions(&self) -> usize {
        self.output_dimensions
    }

    pub fn metas(&self) -> &[ColumnMeta] {
        &self.metas
    }

    /// Fitted column names, in encoding order.
    pub fn column_names(&self) -> Vec<&str> {
        self.metas.iter().map(|m| m.name()).collect()
    }

    /// Activation spans of the encoded vector, in order: a scalar plus a
    /// one-hot per continuous column, one one-hot per categorical column.
    pub fn spans(&self) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut pos = 0;
        for meta in &self.metas {
            match meta {
                ColumnMeta::Categorical { vocab, .. } => {
                    spans.push(Span {
                        start: pos,
                        width: vocab.size(),
                        kind: SpanKind::OneHot,
                    });
                    pos += vocab.size();
                }
                ColumnMeta::Continuous { mixture, .. } => {
                    spans.push(Span {
                        start: pos,
                        width: 1,
                        kind: SpanKind::Scalar,
                    });
                    spans.push(Span {
                        start: pos + 1,
                        width: mixture.n_components(),
                        kind: SpanKind::OneHot,
                    });
                    pos += 1 + mixture.n_components();
                }
            }
        }
        spans
    }

    /// Location of each categorical column's one-hot block within the
    /// encoded vector, in fitted order. This is what conditioning and
    /// frequency counting key off.
    pub fn categorical_spans(&self) -> Vec<(&str, Span)> {
        let mut result = Vec::new();
        let mut pos = 0;
        for meta in &self.metas {
            match meta {
                ColumnMeta::Categorical { name, vocab } => {
                    result.push((
                        name.as_str(),
                        Span {
                            start: pos,
                            width: vocab.size(),
                            kind: SpanKind::OneHot,
                        },
                    ));
                    pos += vocab.size();
                }
                ColumnMeta::Continuous { mixture, .. } => {
                    pos += 1 + mixture.n_components();
                }
            }
        }
        result
    }

    /// Encode a table whose columns match the fitted set exactly (callers
    /// reorder via [`Table::select`] first).
    pub fn transform(&self, table: &Table) -> Result<Array2<f64>> {
        let expected = self.column_names();
        let actual: Vec<&str> = table.columns().iter().map(|s| s.as_str()).collect();
        if expected != actual {
            return Err(PipelineError::Internal(format!(
                "transform input columns {actual:?} do not match fitted columns {expected:?}"
            )));
        }

        let mut out = Array2::zeros((table.n_rows(), self.output_dimensions));
        for (i, row) in table.rows().iter().enumerate() {
            let encoded = self.transform_row(row, i)?;
            for (j, v) in encoded.into_iter().enumerate() {
                out[[i, j]] = v;
            }
        }
        Ok(out)
    }

    fn transform_row(&self, row: &[Value], row_idx: usize) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.output_dimensions);
        for (meta, cell) in self.metas.iter().zip(row) {
            match meta {
                ColumnMeta::Categorical { name, vocab } => {
                    let idx = vocab.index_of(name, &cell.as_text())?;
                    let mut block = vec![0.0; vocab.size()];
                    block[idx] = 1.0;
                    out.extend(block);
                }
                ColumnMeta::Continuous { name, mixture } => {
                    let v = cell.as_f64().ok_or_else(|| SchemaError::MalformedRow {
                        row: row_idx,
                        detail: format!("non-numeric value in continuous column {name:?}"),
                    })?;
                    let k = mixture.most_likely(v);
                    let scalar =
                        ((v - mixture.means[k]) / (4.0 * mixture.stds[k])).clamp(-1.0, 1.0);
                    out.push(scalar);
                    let mut block = vec![0.0; mixture.n_components()];
                    block[k] = 1.0;
                    out.extend(block);
                }
            }
        }
        Ok(out)
    }

    /// Decode generated vectors back to approximate original-scale rows.
    pub fn inverse_transform(&self, data: &Array2<f64>) -> Table {
        let mut table = Table::new(
            self.metas.iter().map(|m| m.name().to_string()).collect(),
        );

        for row in data.rows() {
            let mut cells = Vec::with_capacity(self.metas.len());
            let mut pos = 0;
            for meta in &self.metas {
                match meta {
                    ColumnMeta::Categorical { vocab, .. } => {
                        let idx = argmax(&row.as_slice().expect("row is contiguous")
                            [pos..pos + vocab.size()]);
                        cells.push(text_or_number(vocab.value_at(idx)));
                        pos += vocab.size();
                    }
                    ColumnMeta::Continuous { mixture, .. } => {
                        let slice = row.as_slice().expect("row is contiguous");
                        let scalar = slice[pos].clamp(-1.0, 1.0);
                        let k = argmax(&slice[pos + 1..pos + 1 + mixture.n_components()]);
                        let v = scalar * 4.0 * mixture.stds[k] + mixture.means[k];
                        cells.push(Value::Number(v));
                        pos += 1 + mixture.n_components();
                    }
                }
            }
            table
                .push_row(cells)
                .expect("decoded rows match fitted columns");
        }
        table
    }
}

fn argmax(slice: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in slice.iter().enumerate() {
        if *v > slice[best] {
            best = i;
        }
    }
    best
}

/// Categories that were numeric in the source table decode back as numbers.
fn text_or_number(value: &str) -> Value {
    match value.parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::Text(value.to_string()),
    }
}
