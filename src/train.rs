//! Training orchestration
//!
//! The full pipeline behind the training endpoint: optionally generate
//! synthetic rows with the existing synthesizer artifacts, combine them with
//! the original training data (class balancing by oversampling, seeded
//! shuffle), fit the prediction preprocessor, train the classifier
//! ensemble, and persist the refreshed artifact set wholesale.

use std::collections::HashMap;
use std::fs;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::{PipelineError, Result, SchemaError};
use crate::features::{CATEGORICAL_COLUMNS, EXPECTED_COLUMNS, LABEL_COLUMN, OPTIONAL_COLUMN};
use crate::generate::{generate_samples, GenerateOptions};
use crate::model::classifier::{EnsembleClassifier, DEFAULT_STACK};
use crate::model::generator::{Generator, DEFAULT_HIDDEN};
use crate::model::{ArtifactStore, Artifacts, LabelMapping, Synthesizer};
use crate::table::{Table, Value};
use crate::transform::ColumnTransformer;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    pub num_synthetic_samples: usize,
    pub use_synthetic_data: bool,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            num_synthetic_samples: 1000,
            use_synthetic_data: true,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainSummary {
    pub synthetic_samples_used: usize,
    pub original_samples: usize,
    pub total_training_samples: usize,
    pub classes: usize,
    pub train_accuracy: f64,
    pub classifier_loss: f64,
}

/// Run the whole training pipeline and persist the new artifact set.
pub fn run_training(config: &Config, options: &TrainOptions) -> Result<(Artifacts, TrainSummary)> {
    let store = ArtifactStore::new(&config.model.model_dir);

    let bytes = fs::read(&config.model.train_data_path).map_err(|_| {
        PipelineError::Configuration(format!(
            "{} (training data missing)",
            config.model.train_data_path.display()
        ))
    })?;
    let mut original = Table::from_csv_bytes(&bytes)?;
    if !original.has_column(LABEL_COLUMN) {
        return Err(SchemaError::MissingColumns(vec![LABEL_COLUMN.to_string()]).into());
    }
    // Some published variants of the training set omit `other`; repair it
    // here the same way the prediction path does.
    if !original.has_column(OPTIONAL_COLUMN) {
        original.add_column(OPTIONAL_COLUMN, Value::Number(0.0));
    }
    let original_samples = original.n_rows();
    info!("Loaded {} training rows", original_samples);

    // Synthetic augmentation uses the previously trained synthesizer; a
    // missing one surfaces as a configuration error, exactly like any other
    // absent artifact.
    let synthetic = if options.use_synthetic_data && options.num_synthetic_samples > 0 {
        let synthesizer = store.load_synthesizer()?;
        let rows = generate_samples(
            &synthesizer,
            &original,
            GenerateOptions {
                num_samples: options.num_synthetic_samples,
                batch_size: 500,
                latent_dim: config.model.latent_dim,
                seed: options.seed,
            },
        )?;
        info!("Generated {} synthetic rows for augmentation", rows.n_rows());
        Some(rows)
    } else {
        None
    };
    let synthetic_samples_used = synthetic.as_ref().map(|t| t.n_rows()).unwrap_or(0);

    let combined = combine_tables(
        &original,
        synthetic.as_ref(),
        config.training.balance_classes,
        options.seed,
    )?;
    persist_combined(config, &combined);

    // Feature/label split in the wire schema.
    let labels_text: Vec<String> = combined
        .column_values(LABEL_COLUMN)
        .expect("checked above")
        .iter()
        .map(|v| v.as_text())
        .collect();

    let mut features = combined.clone();
    features.drop_column(LABEL_COLUMN);
    if !features.has_column(OPTIONAL_COLUMN) {
        features.add_column(OPTIONAL_COLUMN, Value::Number(0.0));
    }
    let features = features.select(&EXPECTED_COLUMNS)?;

    let preprocessor = ColumnTransformer::fit(&features, &CATEGORICAL_COLUMNS)?;
    let encoded = preprocessor.transform(&features)?;

    let labels = LabelMapping::from_labels(labels_text.iter().cloned());
    let label_indices: Vec<usize> = labels_text
        .iter()
        .map(|name| labels.index_of(name).expect("mapping built from these"))
        .collect();

    let mut classifier = EnsembleClassifier::new(
        encoded.ncols(),
        &DEFAULT_STACK,
        labels.n_classes(),
        options.seed,
    );
    let report = classifier.train(&encoded, &label_indices, &config.training, options.seed);
    info!(
        accuracy = report.train_accuracy,
        loss = report.classifier_loss,
        "Classifier training finished"
    );

    // Refresh the generation-side transformer against the new data; reuse
    // the existing generator when its dimensions still line up, otherwise
    // seed a fresh one for the offline GAN trainer to refine.
    let mut labeled = features.clone();
    labeled.add_column_with(
        LABEL_COLUMN,
        labels_text.iter().cloned().map(Value::Text).collect(),
    )?;
    let mut discrete: Vec<&str> = CATEGORICAL_COLUMNS.to_vec();
    discrete.push(LABEL_COLUMN);
    let data_transformer = ColumnTransformer::fit(&labeled, &discrete)?;

    let cond_width: usize = data_transformer
        .categorical_spans()
        .iter()
        .map(|(_, span)| span.width)
        .sum();
    let wanted_input = config.model.latent_dim + cond_width;
    let generator = match store.load_synthesizer() {
        Ok(existing)
            if existing.generator.input_dim() == wanted_input
                && existing.generator.data_dim() == data_transformer.output_dimensions() =>
        {
            existing.generator
        }
        _ => Generator::new(
            wanted_input,
            &DEFAULT_HIDDEN,
            data_transformer.output_dimensions(),
            options.seed,
        ),
    };

    let artifacts = Artifacts {
        synthesizer: Synthesizer {
            transformer: data_transformer,
            generator,
        },
        preprocessor,
        classifier,
        labels,
    };
    store.save(&artifacts)?;

    let summary = TrainSummary {
        synthetic_samples_used,
        original_samples,
        total_training_samples: combined.n_rows(),
        classes: artifacts.labels.n_classes(),
        train_accuracy: report.train_accuracy,
        classifier_loss: report.classifier_loss,
    };
    Ok((artifacts, summary))
}

/// Best-effort persistence of the combined dataset for inspection.
fn persist_combined(config: &Config, combined: &Table) {
    let path = &config.model.combined_data_path;
    let write = || -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, combined.to_csv_string()?)?;
        Ok(())
    };
    if let Err(e) = write() {
        tracing::warn!("Could not persist combined dataset to {}: {}", path.display(), e);
    }
}

/// Combine original and synthetic rows, optionally balancing class counts
/// by oversampling and shuffling with the given seed.
pub fn combine_tables(
    original: &Table,
    synthetic: Option<&Table>,
    balance_classes: bool,
    seed: u64,
) -> Result<Table> {
    let mut combined = original.clone();

    if let Some(synth) = synthetic {
        combined.extend(&align_columns(synth, original.columns()))?;
    }

    if balance_classes && combined.has_column(LABEL_COLUMN) {
        combined = oversample_minorities(&combined, seed)?;
    }

    Ok(shuffle_rows(&combined, seed))
}

/// Reindex `table` to exactly `columns`, filling absent columns with 0.
fn align_columns(table: &Table, columns: &[String]) -> Table {
    let mut out = Table::new(columns.to_vec());
    for i in 0..table.n_rows() {
        let row = columns
            .iter()
            .map(|name| {
                table
                    .get(i, name)
                    .cloned()
                    .unwrap_or(Value::Number(0.0))
            })
            .collect();
        out.push_row(row).expect("aligned rows match target columns");
    }
    out
}

fn oversample_minorities(table: &Table, seed: u64) -> Result<Table> {
    let labels = table
        .column_values(LABEL_COLUMN)
        .expect("caller checked the label column");

    let mut by_class: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.as_text()).or_default().push(i);
    }
    let max_count = by_class.values().map(|v| v.len()).max().unwrap_or(0);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = table.clone();

    // Deterministic order over classes, then draw with replacement.
    let mut classes: Vec<&String> = by_class.keys().collect();
    classes.sort();
    for class in classes {
        let members = &by_class[class];
        for _ in members.len()..max_count {
            let pick = members[rng.gen_range(0..members.len())];
            out.push_row(table.rows()[pick].clone())?;
        }
    }
    Ok(out)
}

fn shuffle_rows(table: &Table, seed: u64) -> Table {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut order: Vec<usize> = (0..table.n_rows()).collect();
    order.shuffle(&mut rng);

    let mut out = Table::new(table.columns().to_vec());
    for idx in order {
        out.push_row(table.rows()[idx].clone())
            .expect("same column set");
    }
    out
}
