//! Daemon configuration
//!
//! Loaded from a TOML file with serde defaults for every section, so a
//! missing or partial file always yields a runnable configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub aggregator: AggregatorConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            capture: CaptureConfig::default(),
            aggregator: AggregatorConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Candidate paths for the capture binary, tried in order. A bare name
    /// is resolved against PATH.
    pub tshark_paths: Vec<String>,
    /// Interfaces to attempt, in order, until one accepts the capture.
    pub interfaces: Vec<String>,
    /// Where the raw capture artifact is written.
    pub pcap_path: PathBuf,
    /// Seconds added to the requested duration before the subprocess is
    /// killed.
    pub grace_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tshark_paths: vec![
                "/usr/bin/tshark".to_string(),
                "/usr/local/bin/tshark".to_string(),
                "tshark".to_string(),
            ],
            interfaces: vec!["eth0".to_string(), "wlan0".to_string(), "any".to_string()],
            pcap_path: PathBuf::from("/var/lib/netwarden/capture/session.pcap"),
            grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Emitted-record lookback for the count/srv_count feature family.
    /// Count-based, not time-based; see the features module docs.
    pub recent_window_size: usize,
    /// Emitted-record lookback for the dst_host_* feature family.
    pub host_window_size: usize,
    /// Seconds without packets before a UDP/ICMP connection is finalized.
    pub idle_timeout_secs: u64,
    /// Hard cap on connection duration before forced finalization.
    pub max_duration_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            recent_window_size: 10,
            host_window_size: 100,
            idle_timeout_secs: 120,
            max_duration_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding trained artifacts (generator, transformer,
    /// classifier, label mapping).
    pub model_dir: PathBuf,
    /// Reference training dataset used by fit and the combiner.
    pub train_data_path: PathBuf,
    /// Where combined (original + synthetic) training data is written.
    pub combined_data_path: PathBuf,
    /// Latent noise dimension fed to the generator.
    pub latent_dim: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("/var/lib/netwarden/models"),
            train_data_path: PathBuf::from("/var/lib/netwarden/data/train.csv"),
            combined_data_path: PathBuf::from("/var/lib/netwarden/data/combined.csv"),
            latent_dim: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Epochs for autoencoder pretraining.
    pub pretrain_epochs: usize,
    /// Epochs for the classifier head.
    pub classifier_epochs: usize,
    /// SGD learning rate.
    pub learning_rate: f64,
    /// Minibatch size.
    pub batch_size: usize,
    /// Balance class counts by oversampling before training.
    pub balance_classes: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            pretrain_epochs: 30,
            classifier_epochs: 50,
            learning_rate: 0.01,
            batch_size: 64,
            balance_classes: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for token signing. Overridden by NETWARDEN_JWT_SECRET;
    /// empty means "generate a random secret at startup" (tokens then do
    /// not survive restarts).
    pub jwt_secret: String,
    /// Token lifetime in minutes.
    pub token_expiry_mins: i64,
    /// Bootstrap user name.
    pub bootstrap_user: String,
    /// Bootstrap password, hashed with argon2 at startup. Overridden by
    /// NETWARDEN_BOOTSTRAP_PASSWORD.
    pub bootstrap_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiry_mins: 30,
            bootstrap_user: "admin".to_string(),
            bootstrap_password: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from the first existing default location, else defaults.
    pub fn load_or_default() -> Self {
        let candidates = ["/etc/netwarden/config.toml", "netwarden.toml"];
        for path in candidates {
            if Path::new(path).exists() {
                match Self::load(path) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable config {}: {}", path, e);
                    }
                }
            }
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("NETWARDEN_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(password) = std::env::var("NETWARDEN_BOOTSTRAP_PASSWORD") {
            self.auth.bootstrap_password = password;
        }
        if let Ok(listen) = std::env::var("NETWARDEN_LISTEN") {
            self.server.listen = listen;
        }
        if let Ok(dir) = std::env::var("NETWARDEN_MODEL_DIR") {
            self.model.model_dir = PathBuf::from(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.aggregator.host_window_size, 100);
        assert!(!config.capture.interfaces.is_empty());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [aggregator]
            host_window_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.aggregator.host_window_size, 50);
        assert_eq!(config.aggregator.recent_window_size, 10);
        assert_eq!(config.training.batch_size, 64);
    }
}
