//! Model and training configuration loaded from TOML.

use std::path::Path;

use serde::Deserialize;

use crate::model::dual_encoder::DualEncoderConfig;
use crate::training::knobs::StepKnobs;
use crate::training::sampler::NegativeSampling;

/// Model hyperparameters and resource locations.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Truncation/padding length for queries and replies.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Number of rows in the embedding table.
    #[serde(default = "default_vocab_size")]
    pub vocab_size: usize,

    /// Embedding dimension.
    #[serde(default = "default_embed_dim")]
    pub embed_dim: usize,

    /// LSTM hidden size, also the side of the bilinear matrix.
    #[serde(default = "default_lstm_dim")]
    pub lstm_dim: usize,

    /// Offset added to the forget-gate pre-activation.
    #[serde(default = "default_forget_bias")]
    pub forget_bias: f64,

    /// Base learning rate before exponential decay.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Negative sampling strategy.
    #[serde(default)]
    pub negative_sampling: NegativeSampling,

    /// Vocabulary file, one token per line.
    #[serde(default = "default_vocab_list")]
    pub vocab_list: String,

    /// Pretrained embedding file. Empty means random initialization.
    #[serde(default)]
    pub pretrained_embed_dir: String,
}

fn default_max_length() -> usize {
    160
}
fn default_vocab_size() -> usize {
    91_620
}
fn default_embed_dim() -> usize {
    100
}
fn default_lstm_dim() -> usize {
    256
}
fn default_forget_bias() -> f64 {
    2.0
}
fn default_learning_rate() -> f64 {
    1e-3
}
fn default_vocab_list() -> String {
    "data/vocab.txt".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            vocab_size: default_vocab_size(),
            embed_dim: default_embed_dim(),
            lstm_dim: default_lstm_dim(),
            forget_bias: default_forget_bias(),
            learning_rate: default_learning_rate(),
            negative_sampling: NegativeSampling::default(),
            vocab_list: default_vocab_list(),
            pretrained_embed_dir: String::new(),
        }
    }
}

impl ModelConfig {
    /// Module-init configuration for the network itself.
    pub fn dual_encoder_config(&self) -> DualEncoderConfig {
        DualEncoderConfig::new(self.vocab_size, self.embed_dim, self.lstm_dim)
            .with_forget_bias(self.forget_bias)
    }

    /// Pretrained embedding path, if one is configured.
    pub fn pretrained_embeddings(&self) -> Option<&Path> {
        if self.pretrained_embed_dir.trim().is_empty() {
            None
        } else {
            Some(Path::new(&self.pretrained_embed_dir))
        }
    }

    /// Log a warning for settings that are legal but probably unintended.
    pub fn validate(&self) {
        if self.forget_bias == 0.0 {
            tracing::warn!("forget_bias = 0; long-range memory will be slow to learn");
        }
        if self.max_length == 0 {
            tracing::warn!("max_length = 0; every sequence will be empty");
        }
    }
}

/// Training-loop settings: batch shape, per-step knobs and intervals.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Pairs per batch. Negatives come from the other replies in the batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Negatives per positive.
    #[serde(default = "default_num_negative_samples")]
    pub num_negative_samples: usize,

    #[serde(default = "default_embed_keep")]
    pub embed_dropout_keep_prob: f64,

    #[serde(default = "default_lstm_keep")]
    pub lstm_dropout_keep_prob: f64,

    #[serde(default = "default_dense_keep")]
    pub dense_dropout_keep_prob: f64,

    /// Passes over the training file.
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,

    /// Steps between metric logging.
    #[serde(default = "default_log_interval")]
    pub log_interval: u64,

    /// Steps between evaluation runs on held-out data.
    #[serde(default = "default_eval_interval")]
    pub eval_interval: u64,

    /// Steps between checkpoint saves.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Directory for checkpoints.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
}

fn default_batch_size() -> usize {
    64
}
fn default_num_negative_samples() -> usize {
    4
}
fn default_embed_keep() -> f64 {
    1.0
}
fn default_lstm_keep() -> f64 {
    0.9
}
fn default_dense_keep() -> f64 {
    0.9
}
fn default_num_epochs() -> usize {
    10
}
fn default_log_interval() -> u64 {
    100
}
fn default_eval_interval() -> u64 {
    2000
}
fn default_checkpoint_interval() -> u64 {
    5000
}
fn default_checkpoint_dir() -> String {
    "checkpoints/dual_encoder".to_string()
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            num_negative_samples: default_num_negative_samples(),
            embed_dropout_keep_prob: default_embed_keep(),
            lstm_dropout_keep_prob: default_lstm_keep(),
            dense_dropout_keep_prob: default_dense_keep(),
            num_epochs: default_num_epochs(),
            log_interval: default_log_interval(),
            eval_interval: default_eval_interval(),
            checkpoint_interval: default_checkpoint_interval(),
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}

impl TrainingConfig {
    /// Knobs handed to every training step.
    pub fn train_knobs(&self) -> StepKnobs {
        StepKnobs {
            embed_dropout_keep_prob: self.embed_dropout_keep_prob,
            lstm_dropout_keep_prob: self.lstm_dropout_keep_prob,
            dense_dropout_keep_prob: self.dense_dropout_keep_prob,
            num_negative_samples: self.num_negative_samples,
        }
    }

    /// Knobs for evaluation steps: dropout off, same negative count.
    pub fn eval_knobs(&self) -> StepKnobs {
        StepKnobs::evaluation(self.num_negative_samples)
    }

    /// Log a warning if the negative count cannot be met by the batch size.
    pub fn validate(&self) {
        if self.batch_size < 2 {
            tracing::warn!(
                batch_size = self.batch_size,
                "batch_size < 2 leaves no in-batch negatives"
            );
        } else if self.num_negative_samples >= self.batch_size - 1 {
            tracing::warn!(
                batch_size = self.batch_size,
                num_negative_samples = self.num_negative_samples,
                "num_negative_samples >= batch_size - 1; every off-diagonal pair will be a negative"
            );
        }
    }
}

/// Top-level structure of a config TOML file with `[model]` and `[training]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigToml {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Load and deserialize a [`ConfigToml`] from a TOML file.
pub fn load_config(path: &Path) -> anyhow::Result<ConfigToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: ConfigToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(config)
}
