//! Autoencoder-ensemble classifier
//!
//! Three stacked autoencoders compress the transformed feature vector in
//! stages; a softmax head over the deepest code assigns the class. The
//! autoencoders are pretrained layer-wise on reconstruction, then the whole
//! stack is fine-tuned with the head under cross-entropy.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::nn::{mse, relu, relu_grad, softmax_rows, Dense};
use crate::config::TrainingConfig;

/// Encoder widths of the stacked autoencoders.
pub const DEFAULT_STACK: [usize; 3] = [128, 64, 32];

/// One autoencoder stage
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Autoencoder {
    encoder: Dense,
    decoder: Dense,
}

impl Autoencoder {
    fn new(input_dim: usize, code_dim: usize, seed: u64) -> Self {
        Self {
            encoder: Dense::new(input_dim, code_dim, seed),
            decoder: Dense::new(code_dim, input_dim, seed.wrapping_add(1)),
        }
    }

    fn encode(&self, x: &Array2<f64>) -> Array2<f64> {
        relu(&self.encoder.forward(x))
    }

    /// One reconstruction SGD step on a minibatch. Returns the batch loss.
    fn pretrain_step(&mut self, batch: &Array2<f64>, lr: f64) -> f64 {
        let code = self.encode(batch);
        let reconstruction = self.decoder.forward(&code);
        let loss = mse(&reconstruction, batch);

        let delta_out = &reconstruction - batch;
        let delta_code = self.decoder.backward(&code, &delta_out, lr) * relu_grad(&code);
        self.encoder.backward(batch, &delta_code, lr);
        loss
    }
}

/// Summary of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    /// Final reconstruction loss per autoencoder stage
    pub reconstruction_losses: Vec<f64>,
    /// Final cross-entropy of the classifier head
    pub classifier_loss: f64,
    /// Training-set accuracy after fine-tuning
    pub train_accuracy: f64,
}

/// The classifier artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleClassifier {
    stack: Vec<Autoencoder>,
    head: Dense,
    n_classes: usize,
}

impl EnsembleClassifier {
    pub fn new(input_dim: usize, stack_dims: &[usize], n_classes: usize, seed: u64) -> Self {
        let mut stack = Vec::with_capacity(stack_dims.len());
        let mut dim = input_dim;
        for (i, &code_dim) in stack_dims.iter().enumerate() {
            stack.push(Autoencoder::new(dim, code_dim, seed.wrapping_add(i as u64 * 2)));
            dim = code_dim;
        }
        let head = Dense::new(dim, n_classes, seed.wrapping_add(stack_dims.len() as u64 * 2));
        Self {
            stack,
            head,
            n_classes,
        }
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn input_dim(&self) -> usize {
        self.stack
            .first()
            .map(|ae| ae.encoder.input_dim())
            .unwrap_or(0)
    }

    /// Compress through every stage.
    fn encode(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut code = x.clone();
        for ae in &self.stack {
            code = ae.encode(&code);
        }
        code
    }

    /// Class probabilities, one row per input row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        softmax_rows(&self.head.forward(&self.encode(x)))
    }

    /// Argmax class index per row, preserving row order.
    pub fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        self.predict_proba(x)
            .axis_iter(Axis(0))
            .map(|row| {
                let mut best = 0;
                for (i, v) in row.iter().enumerate() {
                    if *v > row[best] {
                        best = i;
                    }
                }
                best
            })
            .collect()
    }

    /// Layer-wise pretraining followed by supervised fine-tuning.
    pub fn train(
        &mut self,
        x: &Array2<f64>,
        labels: &[usize],
        config: &TrainingConfig,
        seed: u64,
    ) -> TrainReport {
        assert_eq!(x.nrows(), labels.len(), "one label per row");
        let mut rng = StdRng::seed_from_u64(seed);
        let lr = config.learning_rate;

        // Stage 1: reconstruction pretraining, each stage on the previous
        // stage's codes.
        let mut reconstruction_losses = Vec::with_capacity(self.stack.len());
        let mut stage_input = x.clone();
        for (stage, ae) in self.stack.iter_mut().enumerate() {
            let mut last_loss = 0.0;
            for epoch in 0..config.pretrain_epochs {
                let mut epoch_loss = 0.0;
                let mut batches = 0;
                for batch in minibatches(&stage_input, config.batch_size, &mut rng) {
                    epoch_loss += ae.pretrain_step(&batch, lr);
                    batches += 1;
                }
                last_loss = epoch_loss / batches.max(1) as f64;
                if epoch + 1 == config.pretrain_epochs {
                    debug!(stage, epoch, loss = last_loss, "pretraining finished");
                }
            }
            reconstruction_losses.push(last_loss);
            stage_input = ae.encode(&stage_input);
        }

        // Stage 2: fine-tune encoders and head under cross-entropy.
        let targets = one_hot(labels, self.n_classes);
        let mut classifier_loss = 0.0;
        for _ in 0..config.classifier_epochs {
            let mut order: Vec<usize> = (0..x.nrows()).collect();
            order.shuffle(&mut rng);

            let mut epoch_loss = 0.0;
            let mut batches = 0;
            for chunk in order.chunks(config.batch_size.max(1)) {
                let xb = select_rows(x, chunk);
                let tb = select_rows(&targets, chunk);
                epoch_loss += self.finetune_step(&xb, &tb, lr);
                batches += 1;
            }
            classifier_loss = epoch_loss / batches.max(1) as f64;
        }

        let predictions = self.predict(x);
        let correct = predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| p == l)
            .count();
        TrainReport {
            reconstruction_losses,
            classifier_loss,
            train_accuracy: correct as f64 / labels.len().max(1) as f64,
        }
    }

    /// One cross-entropy SGD step through head and encoder stack. Returns
    /// the batch loss.
    fn finetune_step(&mut self, xb: &Array2<f64>, targets: &Array2<f64>, lr: f64) -> f64 {
        // Forward with cached activations per stage.
        let mut activations = vec![xb.clone()];
        for ae in &self.stack {
            let next = ae.encode(activations.last().expect("seeded with input"));
            activations.push(next);
        }
        let code = activations.last().expect("stack output").clone();
        let probs = softmax_rows(&self.head.forward(&code));
        let loss = cross_entropy(&probs, targets);

        // Softmax + cross-entropy gradient at the logits.
        let delta_logits = &probs - targets;
        let mut delta = self.head.backward(&code, &delta_logits, lr);

        for (i, ae) in self.stack.iter_mut().enumerate().rev() {
            let activated = &activations[i + 1];
            let masked = delta * relu_grad(activated);
            delta = ae.encoder.backward(&activations[i], &masked, lr);
        }
        loss
    }
}

fn one_hot(labels: &[usize], n_classes: usize) -> Array2<f64> {
    let mut out = Array2::zeros((labels.len(), n_classes));
    for (i, &label) in labels.iter().enumerate() {
        out[[i, label.min(n_classes.saturating_sub(1))]] = 1.0;
    }
    out
}

fn cross_entropy(probs: &Array2<f64>, targets: &Array2<f64>) -> f64 {
    let eps = 1e-12;
    let mut total = 0.0;
    for (p, t) in probs.iter().zip(targets.iter()) {
        if *t > 0.0 {
            total -= (p + eps).ln();
        }
    }
    total / probs.nrows().max(1) as f64
}

fn select_rows(x: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    let mut out = Array2::zeros((indices.len(), x.ncols()));
    for (i, &idx) in indices.iter().enumerate() {
        out.row_mut(i).assign(&x.row(idx));
    }
    out
}

/// Shuffled minibatch views materialized as owned arrays.
fn minibatches(x: &Array2<f64>, batch_size: usize, rng: &mut StdRng) -> Vec<Array2<f64>> {
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    order.shuffle(rng);
    order
        .chunks(batch_size.max(1))
        .map(|chunk| select_rows(x, chunk))
        .collect()
}
