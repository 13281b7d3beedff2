//! Dense network building blocks
//!
//! Minimal fully-connected layer math on ndarray: forward products, a plain
//! SGD backward step, and the activations the generator and classifier use.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// A fully-connected layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Dense {
    /// He-initialized layer; `seed` fixes the draw.
    pub fn new(input_dim: usize, output_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = (2.0 / input_dim.max(1) as f64).sqrt();
        let normal = Normal::new(0.0, scale).expect("valid std");
        let weights =
            Array2::from_shape_fn((input_dim, output_dim), |_| normal.sample(&mut rng));
        Self {
            weights,
            bias: Array1::zeros(output_dim),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weights.ncols()
    }

    /// Batch forward: (n, in) -> (n, out)
    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weights) + &self.bias
    }

    /// One SGD step against `delta` (the loss gradient at this layer's
    /// output). Returns the gradient at the layer's input, computed against
    /// the pre-update weights.
    pub fn backward(&mut self, input: &Array2<f64>, delta: &Array2<f64>, lr: f64) -> Array2<f64> {
        let delta_prev = delta.dot(&self.weights.t());
        let batch = input.nrows().max(1) as f64;
        let grad_w = input.t().dot(delta) / batch;
        let grad_b = delta.mean_axis(Axis(0)).expect("non-empty batch");
        self.weights = &self.weights - &(grad_w * lr);
        self.bias = &self.bias - &(grad_b * lr);
        delta_prev
    }
}

pub fn relu(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| v.max(0.0))
}

/// Gradient mask from already-activated relu output.
pub fn relu_grad(activated: &Array2<f64>) -> Array2<f64> {
    activated.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

pub fn tanh(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(f64::tanh)
}

/// Row-wise softmax, numerically stabilized.
pub fn softmax_rows(x: &Array2<f64>) -> Array2<f64> {
    let mut out = x.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f64 = row.iter().sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

/// Mean squared error over a batch.
pub fn mse(prediction: &Array2<f64>, target: &Array2<f64>) -> f64 {
    let diff = prediction - target;
    diff.mapv(|v| v * v).mean().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_forward_shape() {
        let layer = Dense::new(4, 3, 1);
        let x = Array2::zeros((5, 4));
        let y = layer.forward(&x);
        assert_eq!(y.dim(), (5, 3));
        // Zero input hits the zero bias exactly.
        assert!(y.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = array![[1.0, 2.0, 3.0], [0.0, 0.0, 1000.0]];
        let s = softmax_rows(&x);
        for row in s.axis_iter(Axis(0)) {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
        // The huge logit dominates without producing NaN.
        assert!((s[[1, 2]] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sgd_reduces_linear_regression_loss() {
        // y = 2x: a single layer should fit it quickly.
        let x = Array2::from_shape_fn((16, 1), |(i, _)| i as f64 / 16.0);
        let y = x.mapv(|v| 2.0 * v);
        let mut layer = Dense::new(1, 1, 3);

        let initial = mse(&layer.forward(&x), &y);
        for _ in 0..200 {
            let pred = layer.forward(&x);
            let delta = &pred - &y;
            layer.backward(&x, &delta, 0.5);
        }
        let trained = mse(&layer.forward(&x), &y);
        assert!(trained < initial * 0.01, "{trained} vs {initial}");
    }

    #[test]
    fn test_initialization_is_seeded() {
        let a = Dense::new(8, 8, 42);
        let b = Dense::new(8, 8, 42);
        assert_eq!(a.weights, b.weights);
    }
}
