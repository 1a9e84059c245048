//! Configuration loading and data root resolution
//!
//! Resolution priority for the data root: command-line argument, then
//! environment variable (`CHORUS_ROOT`), then the optional TOML settings
//! file, then the compiled default (`./data`).
//!
//! The data root is laid out by the upstream ingestion pipeline:
//! `audio/` (raw recordings), `features/` (one `.npy` stack per recording),
//! `spectrograms/<stem>/<ordinal>.png`, `labels.json` (vocabulary), and
//! `chorus.db` plus `model/head.npz` written by this service.

use crate::{Error, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Fixed segment stride in seconds: one segment every 5 seconds
pub const SEGMENT_SECONDS: f64 = 5.0;

/// Width of the windowed annotation view in seconds
pub const WINDOW_SECONDS: f64 = 60.0;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "chorus", about = "Active-learning annotation backend for bird-call audio")]
pub struct Cli {
    /// Data root folder (audio, features, spectrograms, database)
    #[arg(long, env = "CHORUS_ROOT")]
    pub root: Option<PathBuf>,

    /// Optional TOML settings file
    #[arg(long, env = "CHORUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind the HTTP server on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the HTTP server on
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Skip the retraining/scoring run normally kicked off at startup
    #[arg(long, default_value_t = false)]
    pub skip_startup_retrain: bool,
}

/// Classifier dimensions. The defaults mirror the production model
/// (EfficientNet-class feature width, 1024/512 hidden head); tests run a
/// small instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Adaptive pooling grid applied to each spectrogram channel
    pub pool_grid: usize,
    /// Width of the frozen extractor's output
    pub feature_dim: usize,
    /// First hidden layer width
    pub hidden1: usize,
    /// Second hidden layer width
    pub hidden2: usize,
    /// Dropout probability in the head (also the MC-dropout source)
    pub dropout: f32,
    /// Seed for the frozen extractor weights. Fixed so feature extraction is
    /// stable across restarts and the persisted head stays compatible.
    pub extractor_seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            pool_grid: 14,
            feature_dim: 1280,
            hidden1: 1024,
            hidden2: 512,
            dropout: 0.5,
            extractor_seed: 0x0b5e55ed,
        }
    }
}

/// Retraining hyperparameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Retraining triggers when the labeled-segment count is an exact
    /// multiple of this threshold
    pub label_threshold: i64,
    /// Fine-tune epochs per run (no early stopping, no validation split)
    pub epochs: usize,
    /// Initial learning rate, cosine-annealed to zero over the epochs
    pub learning_rate: f32,
    /// Decoupled weight decay
    pub weight_decay: f32,
    /// Training batch size
    pub batch_size: usize,
    /// Scoring batch size
    pub eval_batch_size: usize,
    /// Stochastic forward passes per segment during scoring
    pub mc_passes: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            label_threshold: 20,
            epochs: 3,
            learning_rate: 2e-4,
            weight_decay: 0.01,
            batch_size: 4,
            eval_batch_size: 16,
            mc_passes: 10,
        }
    }
}

/// Optional TOML settings file contents
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    root_folder: Option<PathBuf>,
    #[serde(default)]
    model: Option<ModelConfig>,
    #[serde(default)]
    training: Option<TrainingConfig>,
}

/// Resolved service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub root: PathBuf,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

impl Settings {
    /// Resolve settings from CLI arguments, environment, and the optional
    /// TOML file
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => read_settings_file(path)?,
            None => {
                let default_path = PathBuf::from("chorus.toml");
                if default_path.exists() {
                    read_settings_file(&default_path)?
                } else {
                    SettingsFile::default()
                }
            }
        };

        // CLI/env beat the settings file; the file beats the compiled default
        let root = cli
            .root
            .clone()
            .or(file.root_folder)
            .unwrap_or_else(|| PathBuf::from("data"));

        Ok(Self {
            host: cli.host.clone(),
            port: cli.port,
            root,
            model: file.model.unwrap_or_default(),
            training: file.training.unwrap_or_default(),
        })
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn features_dir(&self) -> PathBuf {
        self.root.join("features")
    }

    pub fn spectrogram_dir(&self) -> PathBuf {
        self.root.join("spectrograms")
    }

    pub fn vocab_path(&self) -> PathBuf {
        self.root.join("labels.json")
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("chorus.db")
    }

    pub fn weights_path(&self) -> PathBuf {
        self.root.join("model").join("head.npz")
    }
}

fn read_settings_file(path: &Path) -> Result<SettingsFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read settings file {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid settings file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chorus.toml");
        std::fs::write(
            &path,
            r#"
root_folder = "/srv/chorus"

[training]
label_threshold = 5
epochs = 1
"#,
        )
        .unwrap();

        let cli = Cli {
            root: None,
            config: Some(path),
            host: "127.0.0.1".to_string(),
            port: 8080,
            skip_startup_retrain: false,
        };
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.root, PathBuf::from("/srv/chorus"));
        assert_eq!(settings.training.label_threshold, 5);
        assert_eq!(settings.training.epochs, 1);
        // Unspecified fields keep their defaults
        assert_eq!(settings.training.batch_size, 4);
        assert_eq!(settings.model.pool_grid, 14);
    }

    #[test]
    fn cli_root_beats_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chorus.toml");
        std::fs::write(&path, "root_folder = \"/from/file\"\n").unwrap();

        let cli = Cli {
            root: Some(PathBuf::from("/from/cli")),
            config: Some(path),
            host: "127.0.0.1".to_string(),
            port: 8080,
            skip_startup_retrain: false,
        };
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.root, PathBuf::from("/from/cli"));
    }
}
