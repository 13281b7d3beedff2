//! Conditional generator network
//!
//! Residual dense blocks over (noise ++ conditioning vector), projected to
//! the transformer's output width and activated span-by-span: tanh for
//! continuous scalars, softmax for one-hot blocks. The decoded one-hots are
//! hardened by the inverse transform's argmax, so softmax (rather than a
//! sampled gumbel) is sufficient at generation time.

use ndarray::{s, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::nn::{relu, softmax_rows, Dense};
use crate::transform::{Span, SpanKind};

/// Hidden widths of the residual stack.
pub const DEFAULT_HIDDEN: [usize; 2] = [256, 256];

/// One residual block: output = input ++ relu(fc(input))
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Residual {
    fc: Dense,
}

impl Residual {
    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let hidden = relu(&self.fc.forward(x));
        concat_columns(x, &hidden)
    }
}

/// The generator artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generator {
    blocks: Vec<Residual>,
    output: Dense,
    input_dim: usize,
    data_dim: usize,
}

impl Generator {
    /// `input_dim` is latent noise width plus conditioning width.
    pub fn new(input_dim: usize, hidden: &[usize], data_dim: usize, seed: u64) -> Self {
        let mut blocks = Vec::with_capacity(hidden.len());
        let mut dim = input_dim;
        for (i, &width) in hidden.iter().enumerate() {
            blocks.push(Residual {
                fc: Dense::new(dim, width, seed.wrapping_add(i as u64)),
            });
            dim += width;
        }
        let output = Dense::new(dim, data_dim, seed.wrapping_add(hidden.len() as u64));
        Self {
            blocks,
            output,
            input_dim,
            data_dim,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn data_dim(&self) -> usize {
        self.data_dim
    }

    /// Raw forward pass over (noise ++ condition) rows.
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let mut x = input.clone();
        for block in &self.blocks {
            x = block.forward(&x);
        }
        self.output.forward(&x)
    }

    /// Forward pass followed by span-wise activation.
    pub fn generate(&self, input: &Array2<f64>, spans: &[Span]) -> Array2<f64> {
        apply_activation(&self.forward(input), spans)
    }
}

/// Activate raw generator output span-by-span.
pub fn apply_activation(raw: &Array2<f64>, spans: &[Span]) -> Array2<f64> {
    let mut out = raw.clone();
    for span in spans {
        let slice = raw.slice(s![.., span.start..span.start + span.width]);
        let activated = match span.kind {
            SpanKind::Scalar => slice.mapv(f64::tanh),
            SpanKind::OneHot => softmax_rows(&slice.to_owned()),
        };
        out.slice_mut(s![.., span.start..span.start + span.width])
            .assign(&activated);
    }
    out
}

fn concat_columns(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    ndarray::concatenate(Axis(1), &[a.view(), b.view()]).expect("matching row counts")
}
