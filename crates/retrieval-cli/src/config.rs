//! TOML config loading for the CLI, merged with command-line overrides.
//!
//! Priority chain: serde defaults < TOML values < CLI flags.

use std::path::{Path, PathBuf};

use dual_encoder::{load_config, ConfigToml, NegativeSampling};

/// Optional CLI overrides for `ConfigToml` fields.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub batch_size: Option<usize>,
    pub num_epochs: Option<usize>,
    pub learning_rate: Option<f64>,
    pub negative_sampling: Option<NegativeSampling>,
    pub num_negative_samples: Option<usize>,
    pub checkpoint_dir: Option<PathBuf>,
}

/// Load `path`, or fall back to all defaults when it does not exist.
pub fn load_or_default(path: &Path) -> anyhow::Result<ConfigToml> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::warn!(path = %path.display(), "Config not found, using defaults");
        Ok(ConfigToml::default())
    }
}

/// Apply CLI overrides on top of the TOML values.
pub fn apply_overrides(config: &mut ConfigToml, overrides: &Overrides) {
    if let Some(n) = overrides.batch_size {
        config.training.batch_size = n;
    }
    if let Some(n) = overrides.num_epochs {
        config.training.num_epochs = n;
    }
    if let Some(lr) = overrides.learning_rate {
        config.model.learning_rate = lr;
    }
    if let Some(strategy) = overrides.negative_sampling {
        config.model.negative_sampling = strategy;
    }
    if let Some(k) = overrides.num_negative_samples {
        config.training.num_negative_samples = k;
    }
    if let Some(dir) = &overrides.checkpoint_dir {
        config.training.checkpoint_dir = dir.to_string_lossy().into_owned();
    }
}
