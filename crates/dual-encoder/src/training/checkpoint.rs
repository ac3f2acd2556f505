//! Checkpoint layout: one directory per save holding the model record, the
//! optimizer record and a `meta.json`.
//!
//! ```text
//! {checkpoint_dir}/step_{n}/model.mpk
//! {checkpoint_dir}/step_{n}/optimizer.mpk
//! {checkpoint_dir}/step_{n}/meta.json
//! ```

use std::path::{Path, PathBuf};

use burn::optim::Optimizer;
use burn::prelude::*;
use burn::record::{DoublePrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::model::dual_encoder::{DualEncoder, DualEncoderConfig};
use crate::training::schedule::GlobalStep;

/// Metadata saved alongside each checkpoint for resuming training.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    pub global_step: u64,
    /// Epoch in progress when the checkpoint was written.
    pub epoch: usize,
    pub lstm_dim: usize,
}

impl CheckpointMeta {
    pub fn global_step(&self) -> GlobalStep {
        GlobalStep::new(self.global_step)
    }
}

fn recorder() -> NamedMpkFileRecorder<DoublePrecisionSettings> {
    NamedMpkFileRecorder::<DoublePrecisionSettings>::new()
}

/// Directory for the checkpoint taken at `step`.
pub fn step_dir(checkpoint_dir: &Path, step: u64) -> PathBuf {
    checkpoint_dir.join(format!("step_{step}"))
}

/// Write model, optimizer state and metadata into `dir`.
pub fn save_checkpoint<B, O>(
    dir: &Path,
    model: &DualEncoder<B>,
    optimizer: &O,
    meta: &CheckpointMeta,
) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<DualEncoder<B>, B>,
{
    std::fs::create_dir_all(dir)?;
    let recorder = recorder();

    model
        .clone()
        .save_file(dir.join("model"), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save model to {}: {e}", dir.display()))?;

    recorder
        .record(optimizer.to_record(), dir.join("optimizer"))
        .map_err(|e| anyhow::anyhow!("Failed to save optimizer to {}: {e}", dir.display()))?;

    let meta_path = dir.join("meta.json");
    serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, meta)?;

    tracing::info!(
        dir = %dir.display(),
        global_step = meta.global_step,
        "Checkpoint saved (model + optimizer + meta)"
    );
    Ok(())
}

/// Load model weights from `dir` on top of a freshly initialized model.
pub fn load_model<B: Backend>(
    dir: &Path,
    config: &DualEncoderConfig,
    device: &B::Device,
) -> anyhow::Result<DualEncoder<B>> {
    // Every parameter is replaced by the record.
    let model = config
        .init::<B>(device, &mut StdRng::seed_from_u64(0))
        .load_file(dir.join("model"), &recorder(), device)
        .map_err(|e| anyhow::anyhow!("Failed to load model from {}: {e}", dir.display()))?;
    Ok(model)
}

/// Restore optimizer moments saved in `dir`.
pub fn load_optimizer<B, O>(dir: &Path, optimizer: O, device: &B::Device) -> anyhow::Result<O>
where
    B: AutodiffBackend,
    O: Optimizer<DualEncoder<B>, B>,
{
    let record: O::Record = recorder()
        .load(dir.join("optimizer"), device)
        .map_err(|e| anyhow::anyhow!("Failed to load optimizer from {}: {e}", dir.display()))?;
    Ok(optimizer.load_record(record))
}

pub fn load_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta_path = dir.join("meta.json");
    let file = std::fs::File::open(&meta_path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?;
    let meta = serde_json::from_reader(file)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))?;
    Ok(meta)
}
