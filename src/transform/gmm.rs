//! Gaussian mixture fitting for continuous columns
//!
//! A small fixed-budget mixture fit via expectation-maximization, used to
//! capture multi-modal numeric distributions. Initialization is quantile
//! based, so fitting the same values always yields the same model.

use serde::{Deserialize, Serialize};

/// Components below this weight are pruned after fitting.
const MIN_COMPONENT_WEIGHT: f64 = 0.005;

/// Floor on component standard deviation, scaled by the data spread.
const MIN_STD_FRACTION: f64 = 1e-4;

const EM_ITERATIONS: usize = 100;
const EM_TOLERANCE: f64 = 1e-6;

/// A fitted one-dimensional Gaussian mixture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianMixture {
    pub weights: Vec<f64>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl GaussianMixture {
    /// Fit with at most `max_components` components.
    pub fn fit(values: &[f64], max_components: usize) -> Self {
        if values.is_empty() {
            return Self {
                weights: vec![1.0],
                means: vec![0.0],
                stds: vec![1.0],
            };
        }

        let n = values.len();
        let k = max_components.max(1).min(n);

        let mean: f64 = values.iter().sum::<f64>() / n as f64;
        let variance: f64 =
            values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
        let spread = variance.sqrt();
        let std_floor = (spread * MIN_STD_FRACTION).max(1e-9);

        // Constant column: one degenerate component.
        if spread < 1e-12 {
            return Self {
                weights: vec![1.0],
                means: vec![mean],
                stds: vec![1e-6_f64.max(mean.abs() * 1e-6)],
            };
        }

        // Quantile initialization keeps the fit deterministic.
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("no NaN in fitted column"));
        let mut means: Vec<f64> = (0..k)
            .map(|i| {
                let q = (i as f64 + 0.5) / k as f64;
                sorted[((q * n as f64) as usize).min(n - 1)]
            })
            .collect();
        let mut stds = vec![spread.max(std_floor); k];
        let mut weights = vec![1.0 / k as f64; k];

        let mut resp = vec![0.0_f64; k];
        let mut prev_log_likelihood = f64::NEG_INFINITY;

        for _ in 0..EM_ITERATIONS {
            // Accumulators for the M step
            let mut sum_resp = vec![0.0_f64; k];
            let mut sum_x = vec![0.0_f64; k];
            let mut sum_x2 = vec![0.0_f64; k];
            let mut log_likelihood = 0.0;

            for &x in values {
                let mut total = 0.0;
                for j in 0..k {
                    resp[j] = weights[j] * normal_pdf(x, means[j], stds[j]);
                    total += resp[j];
                }
                if total <= 0.0 {
                    // Numerically lost point: spread responsibility evenly.
                    resp.iter_mut().for_each(|r| *r = 1.0 / k as f64);
                    total = 1.0;
                }
                log_likelihood += total.ln();
                for j in 0..k {
                    let r = resp[j] / total;
                    sum_resp[j] += r;
                    sum_x[j] += r * x;
                    sum_x2[j] += r * x * x;
                }
            }

            for j in 0..k {
                if sum_resp[j] > 1e-12 {
                    weights[j] = sum_resp[j] / n as f64;
                    means[j] = sum_x[j] / sum_resp[j];
                    let var = (sum_x2[j] / sum_resp[j] - means[j] * means[j]).max(0.0);
                    stds[j] = var.sqrt().max(std_floor);
                }
            }

            if (log_likelihood - prev_log_likelihood).abs() < EM_TOLERANCE {
                break;
            }
            prev_log_likelihood = log_likelihood;
        }

        // Prune negligible components and renormalize.
        let mut kept = Self {
            weights: Vec::new(),
            means: Vec::new(),
            stds: Vec::new(),
        };
        for j in 0..k {
            if weights[j] >= MIN_COMPONENT_WEIGHT {
                kept.weights.push(weights[j]);
                kept.means.push(means[j]);
                kept.stds.push(stds[j]);
            }
        }
        if kept.weights.is_empty() {
            kept.weights.push(1.0);
            kept.means.push(mean);
            kept.stds.push(spread.max(std_floor));
        }
        let total: f64 = kept.weights.iter().sum();
        kept.weights.iter_mut().for_each(|w| *w /= total);
        kept
    }

    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Index of the component most likely to have produced `x`.
    pub fn most_likely(&self, x: f64) -> usize {
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for j in 0..self.n_components() {
            let score = self.weights[j] * normal_pdf(x, self.means[j], self.stds[j]);
            if score > best_score {
                best_score = score;
                best = j;
            }
        }
        best
    }
}

fn normal_pdf(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    (-0.5 * z * z).exp() / (std * (2.0 * std::f64::consts::PI).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bimodal_fit_finds_both_modes() {
        let mut values = Vec::new();
        for i in 0..200 {
            values.push(0.0 + (i % 10) as f64 * 0.01);
            values.push(100.0 + (i % 10) as f64 * 0.01);
        }
        let gmm = GaussianMixture::fit(&values, 10);
        assert!(gmm.n_components() >= 2);

        // Each half of the data should map to a distinct component.
        assert_ne!(gmm.most_likely(0.05), gmm.most_likely(100.05));
    }

    #[test]
    fn test_constant_column_single_component() {
        let values = vec![5.0; 50];
        let gmm = GaussianMixture::fit(&values, 10);
        assert_eq!(gmm.n_components(), 1);
        assert!((gmm.means[0] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let values: Vec<f64> = (0..300).map(|i| ((i * 37) % 100) as f64).collect();
        let a = GaussianMixture::fit(&values, 5);
        let b = GaussianMixture::fit(&values, 5);
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.means, b.means);
        assert_eq!(a.stds, b.stds);
    }

    #[test]
    fn test_weights_normalized() {
        let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let gmm = GaussianMixture::fit(&values, 4);
        let total: f64 = gmm.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
