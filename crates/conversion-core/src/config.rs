//! TOML config loading for the story-conv CLI.
//!
//! Deserializes `configs/train.toml` (`[model]`, `[tokenizer]`, `[training]`,
//! `[data]` sections), then merges CLI overrides on top — a CLI flag always
//! wins over the file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use conversion_model::ModelVariant;
use serde::{Deserialize, Serialize};
use story_data::MarkerTokens;

/// Top-level structure matching `configs/train.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainToml {
    pub model: ModelSection,
    pub tokenizer: TokenizerSection,
    pub training: TrainingSection,
    pub data: DataSection,
}

/// Architecture hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    pub variant: ModelVariant,
    pub d_model: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub d_ff: usize,
    pub dropout: f64,
    pub d_step_hidden: usize,
    pub n_state_classes: usize,
    pub n_location_classes: usize,
    pub max_seq_len: usize,
    /// Pretrained encoder record; random init when absent.
    #[serde(default)]
    pub pretrained: Option<PathBuf>,
}

/// Tokenizer source and marker tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerSection {
    /// `tokenizer.json` path. When absent a deterministic hashing encoder
    /// stands in, which is only useful for smoke runs and tests.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Vocabulary size for the hashing encoder; ignored when `path` is set.
    pub vocab_size: usize,
    #[serde(default)]
    pub markers: MarkerTokens,
}

/// Optimization hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSection {
    pub epochs: usize,
    pub batch_size: usize,
    pub accumulation_steps: usize,
    pub lr: f64,
    pub weight_decay: f64,
    pub adam_epsilon: f64,
    pub max_grad_norm: f64,
    /// Fraction of total optimizer steps spent in linear warmup.
    pub warmup_fraction: f64,
    pub seed: u64,
}

/// Dataset file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSection {
    pub data_dir: PathBuf,
    pub dataset_name: String,
    pub train_file: String,
    pub dev_file: String,
    pub test_file: String,
    /// Truncate the record list (smoke runs).
    #[serde(default)]
    pub max_records: Option<usize>,
}

impl DataSection {
    pub fn train_path(&self) -> PathBuf {
        self.data_dir.join(&self.train_file)
    }

    pub fn dev_path(&self) -> PathBuf {
        self.data_dir.join(&self.dev_file)
    }

    pub fn test_path(&self) -> PathBuf {
        self.data_dir.join(&self.test_file)
    }
}

/// CLI overrides for `TrainToml` values; `None` keeps the file's value.
#[derive(Debug, Default)]
pub struct TrainOverrides {
    pub variant: Option<ModelVariant>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub accumulation_steps: Option<usize>,
    pub lr: Option<f64>,
    pub max_grad_norm: Option<f64>,
    pub seed: Option<u64>,
    pub max_records: Option<usize>,
}

impl TrainToml {
    /// Apply CLI overrides on top of the file values.
    pub fn apply(&mut self, overrides: &TrainOverrides) {
        if let Some(v) = overrides.variant {
            self.model.variant = v;
        }
        if let Some(n) = overrides.epochs {
            self.training.epochs = n;
        }
        if let Some(n) = overrides.batch_size {
            self.training.batch_size = n;
        }
        if let Some(n) = overrides.accumulation_steps {
            self.training.accumulation_steps = n;
        }
        if let Some(lr) = overrides.lr {
            self.training.lr = lr;
        }
        if let Some(g) = overrides.max_grad_norm {
            self.training.max_grad_norm = g;
        }
        if let Some(s) = overrides.seed {
            self.training.seed = s;
        }
        if let Some(n) = overrides.max_records {
            self.data.max_records = Some(n);
        }
    }

    /// Run directory encoding the hyperparameters that define the run.
    pub fn run_dir(&self, base: &Path) -> PathBuf {
        base.join(format!(
            "{}_{}_epochs_{}_lr_{:e}_seed_{}",
            self.data.dataset_name,
            self.model.variant,
            self.training.epochs,
            self.training.lr,
            self.training.seed,
        ))
    }
}

/// Load and deserialize a `TrainToml` from a TOML file.
pub fn load_train_toml(path: &Path) -> anyhow::Result<TrainToml> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: TrainToml = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded training config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
[model]
variant = "baseline-mixed"
d_model = 64
n_heads = 2
n_layers = 2
d_ff = 128
dropout = 0.1
d_step_hidden = 32
n_state_classes = 6
n_location_classes = 16
max_seq_len = 128

[tokenizer]
vocab_size = 4096

[training]
epochs = 3
batch_size = 2
accumulation_steps = 4
lr = 5e-6
weight_decay = 0.01
adam_epsilon = 1e-6
max_grad_norm = 1.0
warmup_fraction = 0.1
seed = 42

[data]
data_dir = "data"
dataset_name = "propara-conversion"
train_file = "train.json"
dev_file = "dev.json"
test_file = "test.json"
"#
    }

    #[test]
    fn test_deserialize_full_toml() {
        let config: TrainToml = toml::from_str(sample_toml()).unwrap();
        assert_eq!(config.model.variant, ModelVariant::BaselineMixed);
        assert_eq!(config.training.accumulation_steps, 4);
        assert_eq!(config.tokenizer.markers.end, "</s>");
        assert!(config.tokenizer.path.is_none());
        assert!(config.data.max_records.is_none());
        assert_eq!(config.data.dev_path(), PathBuf::from("data/dev.json"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config: TrainToml = toml::from_str(sample_toml()).unwrap();
        config.apply(&TrainOverrides {
            variant: Some(ModelVariant::TopDown),
            epochs: Some(7),
            lr: Some(1e-5),
            max_records: Some(5),
            ..Default::default()
        });
        assert_eq!(config.model.variant, ModelVariant::TopDown);
        assert_eq!(config.training.epochs, 7);
        assert_eq!(config.training.lr, 1e-5);
        assert_eq!(config.data.max_records, Some(5));
        // Untouched values keep the file's settings.
        assert_eq!(config.training.batch_size, 2);
    }

    #[test]
    fn test_run_dir_encodes_hyperparameters() {
        let config: TrainToml = toml::from_str(sample_toml()).unwrap();
        let dir = config.run_dir(Path::new("runs"));
        assert_eq!(
            dir,
            PathBuf::from("runs/propara-conversion_baseline-mixed_epochs_3_lr_5e-6_seed_42")
        );
    }
}
