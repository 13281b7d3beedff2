//! Trained model artifacts and their persistence
//!
//! Five artifacts make up a trained pipeline: the generation-side column
//! transformer (fitted with the label column), the conditional generator,
//! the prediction-side preprocessor (fitted without it), the classifier
//! ensemble, and the integer-to-name label mapping. Binary artifacts are
//! bincode on disk, the label mapping is JSON; all are replaced wholesale
//! by a training run and loaded read-only everywhere else.

pub mod classifier;
pub mod generator;
pub mod nn;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::transform::ColumnTransformer;
use classifier::EnsembleClassifier;
use generator::Generator;

pub const GENERATOR_FILE: &str = "generator.bin";
pub const DATA_TRANSFORMER_FILE: &str = "data_transformer.bin";
pub const PREPROCESSOR_FILE: &str = "preprocessor.bin";
pub const CLASSIFIER_FILE: &str = "classifier.bin";
pub const LABEL_MAPPING_FILE: &str = "label_mapping.json";

/// Integer class index to human-readable category name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelMapping {
    /// Index position is the class index.
    classes: Vec<String>,
}

impl LabelMapping {
    /// Build from raw label values: sorted unique names, so the mapping is
    /// stable across runs over the same data.
    pub fn from_labels<I: IntoIterator<Item = String>>(labels: I) -> Self {
        let mut classes: Vec<String> = labels.into_iter().collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn name_of(&self, index: usize) -> &str {
        self.classes
            .get(index)
            .map(|s| s.as_str())
            .unwrap_or("unknown")
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == name)
    }
}

/// The generation-side pair: transformer fitted over the labeled training
/// table plus the generator conditioned on its categorical spans.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    pub transformer: ColumnTransformer,
    pub generator: Generator,
}

/// A complete set of trained artifacts, loaded read-only for serving
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub synthesizer: Synthesizer,
    /// Prediction-side transformer over the 42 wire columns
    pub preprocessor: ColumnTransformer,
    pub classifier: EnsembleClassifier,
    pub labels: LabelMapping,
}

/// Presence/size report for one artifact file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStatus {
    pub name: String,
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
}

/// Fixed-path artifact store under the configured model directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Persist a full artifact set, replacing whatever was there.
    pub fn save(&self, artifacts: &Artifacts) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        write_bincode(
            &self.path(DATA_TRANSFORMER_FILE),
            &artifacts.synthesizer.transformer,
        )?;
        write_bincode(&self.path(GENERATOR_FILE), &artifacts.synthesizer.generator)?;
        write_bincode(&self.path(PREPROCESSOR_FILE), &artifacts.preprocessor)?;
        write_bincode(&self.path(CLASSIFIER_FILE), &artifacts.classifier)?;

        let mapping = serde_json::to_string_pretty(&artifacts.labels)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        fs::write(self.path(LABEL_MAPPING_FILE), mapping)?;

        info!("Saved trained artifacts to {}", self.dir.display());
        Ok(())
    }

    /// Load the full artifact set. A missing file is a
    /// [`PipelineError::Configuration`] naming the path.
    pub fn load(&self) -> Result<Artifacts> {
        let synthesizer = self.load_synthesizer()?;
        let preprocessor: ColumnTransformer = read_bincode(&self.path(PREPROCESSOR_FILE))?;
        let classifier: EnsembleClassifier = read_bincode(&self.path(CLASSIFIER_FILE))?;
        let labels = self.load_labels()?;

        Ok(Artifacts {
            synthesizer,
            preprocessor,
            classifier,
            labels,
        })
    }

    /// Load only the generation-side pair.
    pub fn load_synthesizer(&self) -> Result<Synthesizer> {
        let transformer: ColumnTransformer = read_bincode(&self.path(DATA_TRANSFORMER_FILE))?;
        let generator: Generator = read_bincode(&self.path(GENERATOR_FILE))?;
        Ok(Synthesizer {
            transformer,
            generator,
        })
    }

    fn load_labels(&self) -> Result<LabelMapping> {
        let mapping_path = self.path(LABEL_MAPPING_FILE);
        let mapping = fs::read_to_string(&mapping_path).map_err(|_| missing(&mapping_path))?;
        serde_json::from_str(&mapping)
            .map_err(|e| PipelineError::Internal(format!("corrupt label mapping: {e}")))
    }

    /// Existence and size per artifact file.
    pub fn status(&self) -> Vec<ArtifactStatus> {
        [
            GENERATOR_FILE,
            DATA_TRANSFORMER_FILE,
            PREPROCESSOR_FILE,
            CLASSIFIER_FILE,
            LABEL_MAPPING_FILE,
        ]
        .iter()
        .map(|file| {
            let path = self.path(file);
            let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            ArtifactStatus {
                name: file.to_string(),
                exists: path.exists(),
                path,
                size_bytes,
            }
        })
        .collect()
    }

    pub fn all_available(&self) -> bool {
        self.status().iter().all(|s| s.exists)
    }
}

fn missing(path: &Path) -> PipelineError {
    PipelineError::Configuration(format!("{} (train the models first)", path.display()))
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, value)
        .map_err(|e| PipelineError::Internal(format!("serialize {}: {e}", path.display())))
}

fn read_bincode<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|_| missing(path))?;
    let reader = BufReader::new(file);
    bincode::deserialize_from(reader)
        .map_err(|e| PipelineError::Internal(format!("corrupt artifact {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use super::generator::DEFAULT_HIDDEN;
    use tempfile::TempDir;

    fn tiny_artifacts() -> Artifacts {
        let labeled = Table::from_csv_str(
            "proto,bytes,class\ntcp,1,normal\nudp,2,dos\ntcp,3,normal\n",
        )
        .unwrap();
        let data_transformer = ColumnTransformer::fit(&labeled, &["proto", "class"]).unwrap();

        let mut features = labeled.clone();
        features.drop_column("class");
        let preprocessor = ColumnTransformer::fit(&features, &["proto"]).unwrap();

        let data_dim = data_transformer.output_dimensions();
        Artifacts {
            synthesizer: Synthesizer {
                generator: Generator::new(8, &DEFAULT_HIDDEN, data_dim, 1),
                transformer: data_transformer,
            },
            classifier: EnsembleClassifier::new(preprocessor.output_dimensions(), &[4, 2], 2, 1),
            preprocessor,
            labels: LabelMapping::from_labels(["normal".to_string(), "dos".to_string()]),
        }
    }

    #[test]
    fn test_label_mapping_sorted_and_stable() {
        let mapping = LabelMapping::from_labels([
            "normal".to_string(),
            "dos".to_string(),
            "normal".to_string(),
            "probe".to_string(),
        ]);
        assert_eq!(mapping.n_classes(), 3);
        assert_eq!(mapping.name_of(0), "dos");
        assert_eq!(mapping.index_of("probe"), Some(2));
        assert_eq!(mapping.name_of(99), "unknown");
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let artifacts = tiny_artifacts();

        assert!(!store.all_available());
        store.save(&artifacts).unwrap();
        assert!(store.all_available());

        let loaded = store.load().unwrap();
        assert_eq!(
            loaded.preprocessor.output_dimensions(),
            artifacts.preprocessor.output_dimensions()
        );
        assert_eq!(
            loaded.synthesizer.transformer.output_dimensions(),
            artifacts.synthesizer.transformer.output_dimensions()
        );
        assert_eq!(loaded.labels.n_classes(), 2);
        assert_eq!(loaded.classifier.n_classes(), 2);
    }

    #[test]
    fn test_missing_artifact_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("empty"));
        let err = store.load().unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(err.to_string().contains(DATA_TRANSFORMER_FILE));
    }

    #[test]
    fn test_status_reports_each_file() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        store.save(&tiny_artifacts()).unwrap();
        let status = store.status();
        assert_eq!(status.len(), 5);
        for entry in status {
            assert!(entry.exists, "{} should exist", entry.name);
            assert!(entry.size_bytes > 0);
        }
    }
}
