//! Conditional data sampling
//!
//! Builds the conditioning vectors that bias generation toward a chosen
//! (column, category) pair, and serves real training rows matching a
//! condition. Column choice is uniform; category choice follows the
//! column's empirical log-frequency distribution so rare categories are
//! seen but prevalence still mirrors the training data. The sampler owns a
//! seeded RNG, making full output sequences reproducible.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::transform::{ColumnTransformer, Span};

/// One sampled condition: a one-hot conditioning vector plus the
/// (column, category) pair it selects.
#[derive(Debug, Clone)]
pub struct ConditionVector {
    pub vector: Vec<f64>,
    /// Index into the sampler's conditionable columns
    pub column: usize,
    /// Category index within that column's vocabulary
    pub category: usize,
}

struct CondColumn {
    /// One-hot block of this column in the transformed data
    data_span: Span,
    /// Offset of this column's block within the conditioning vector
    cond_offset: usize,
    /// Normalized log-frequency distribution over categories
    category_probs: Vec<f64>,
    /// Row indices per category, for condition-matched data sampling
    rows_by_category: Vec<Vec<usize>>,
}

/// Samples conditioning vectors and condition-matched training rows
pub struct DataSampler {
    data: Array2<f64>,
    columns: Vec<CondColumn>,
    cond_dim: usize,
    rng: StdRng,
}

impl DataSampler {
    /// Build from transformed training data and the metadata it was encoded
    /// with. `seed` fixes the RNG for reproducible fixtures.
    pub fn new(data: Array2<f64>, transformer: &ColumnTransformer, seed: u64) -> Self {
        let mut columns = Vec::new();
        let mut cond_offset = 0;

        for (_, span) in transformer.categorical_spans() {
            let mut frequencies = vec![0.0_f64; span.width];
            let mut rows_by_category = vec![Vec::new(); span.width];

            for (row_idx, row) in data.axis_iter(Axis(0)).enumerate() {
                for j in 0..span.width {
                    if row[span.start + j] > 0.5 {
                        frequencies[j] += 1.0;
                        rows_by_category[j].push(row_idx);
                    }
                }
            }

            // Log-frequency: frequent categories dominate, rare ones stay
            // reachable.
            let mut probs: Vec<f64> = frequencies.iter().map(|f| (f + 1.0).ln()).collect();
            let total: f64 = probs.iter().sum();
            if total > 0.0 {
                probs.iter_mut().for_each(|p| *p /= total);
            } else {
                probs = vec![1.0 / span.width as f64; span.width];
            }

            columns.push(CondColumn {
                data_span: span,
                cond_offset,
                category_probs: probs,
                rows_by_category,
            });
            cond_offset += span.width;
        }

        Self {
            data,
            columns,
            cond_dim: cond_offset,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Total conditioning width: the sum of categorical vocabulary sizes.
    pub fn dim_cond_vec(&self) -> usize {
        self.cond_dim
    }

    pub fn n_conditionable_columns(&self) -> usize {
        self.columns.len()
    }

    /// Draw `batch_size` independent conditioning vectors. Each has exactly
    /// one set bit (none when there are no conditionable columns).
    pub fn sample_condition_vector(&mut self, batch_size: usize) -> Vec<ConditionVector> {
        (0..batch_size)
            .map(|_| {
                let mut vector = vec![0.0; self.cond_dim];
                if self.columns.is_empty() {
                    return ConditionVector {
                        vector,
                        column: 0,
                        category: 0,
                    };
                }

                let column = self.rng.gen_range(0..self.columns.len());
                let category = self.weighted_category(column);
                vector[self.columns[column].cond_offset + category] = 1.0;
                ConditionVector {
                    vector,
                    column,
                    category,
                }
            })
            .collect()
    }

    fn weighted_category(&mut self, column: usize) -> usize {
        let probs = &self.columns[column].category_probs;
        let roll: f64 = self.rng.gen();
        let mut acc = 0.0;
        for (idx, p) in probs.iter().enumerate() {
            acc += p;
            if roll < acc {
                return idx;
            }
        }
        probs.len() - 1
    }

    /// Return `n` real training rows honoring `conditions` (cycled when
    /// shorter than `n`); unconditioned when empty. A condition whose
    /// category never occurred falls back to a uniform row.
    pub fn sample_data(&mut self, n: usize, conditions: &[ConditionVector]) -> Array2<f64> {
        let width = self.data.ncols();
        let mut out = Array2::zeros((n, width));
        let n_rows = self.data.nrows();

        for i in 0..n {
            let row_idx = if conditions.is_empty() || self.columns.is_empty() || n_rows == 0 {
                self.rng.gen_range(0..n_rows.max(1)).min(n_rows.saturating_sub(1))
            } else {
                let cond = &conditions[i % conditions.len()];
                let bucket = &self.columns[cond.column].rows_by_category[cond.category];
                if bucket.is_empty() {
                    self.rng.gen_range(0..n_rows)
                } else {
                    bucket[self.rng.gen_range(0..bucket.len())]
                }
            };
            if n_rows > 0 {
                out.row_mut(i).assign(&self.data.row(row_idx));
            }
        }
        out
    }

    /// The data-vector span a condition's set bit corresponds to, used to
    /// check or enforce conditions on generated output.
    pub fn data_position(&self, condition: &ConditionVector) -> usize {
        let col = &self.columns[condition.column];
        col.data_span.start + condition.category
    }
}
