//! Per-batch train/eval step and the epoch loop that drives it.
//!
//! A TRAIN step is forward, host-side negative mask, objective, backward and
//! one Adam update at the decayed learning rate. An EVAL step stops after the
//! objective and leaves both the model and the global step untouched.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{ModelConfig, TrainingConfig};
use crate::data::batch::Batch;
use crate::data::dataset::PairDataset;
use crate::error::DualEncoderError;
use crate::mode::Mode;
use crate::model::bridge::{batch_to_tensors, tensor_to_vec};
use crate::model::dual_encoder::DualEncoder;
use crate::training::checkpoint::{save_checkpoint, step_dir, CheckpointMeta};
use crate::training::knobs::StepKnobs;
use crate::training::metrics::{RunningAvg, StepOutput};
use crate::training::objective::{compute_objective, Objective};
use crate::training::sampler::{negative_mask, NegativeSampling};
use crate::training::schedule::{learning_rate, GlobalStep};

/// Adam with the usual `beta1 = 0.9`, `beta2 = 0.999`, `epsilon = 1e-8`.
pub fn adam<B: AutodiffBackend>() -> impl Optimizer<DualEncoder<B>, B> {
    AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, DualEncoder<B>>()
}

/// Fixed settings of a [`Trainer`].
#[derive(Debug, Clone)]
pub struct TrainerSettings {
    /// Learning rate at global step 0.
    pub base_learning_rate: f64,
    pub negative_sampling: NegativeSampling,
    /// Row width every batch must have.
    pub max_length: usize,
    /// Exclusive upper bound on token ids.
    pub vocab_size: usize,
    /// Seed for negative sampling; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl TrainerSettings {
    pub fn from_model_config(config: &ModelConfig) -> Self {
        Self {
            base_learning_rate: config.learning_rate,
            negative_sampling: config.negative_sampling,
            max_length: config.max_length,
            vocab_size: config.vocab_size,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Owns the model and optimizer for one run in a fixed [`Mode`].
pub struct Trainer<B: AutodiffBackend, O: Optimizer<DualEncoder<B>, B>> {
    mode: Mode,
    model: DualEncoder<B>,
    optimizer: O,
    settings: TrainerSettings,
    rng: StdRng,
    device: B::Device,
}

impl<B: AutodiffBackend, O: Optimizer<DualEncoder<B>, B>> Trainer<B, O> {
    /// Build a trainer. `mode` accepts `"train"`/`"TRAIN"` and
    /// `"val"`/`"eval"`/`"EVAL"`.
    pub fn new(
        mode: &str,
        model: DualEncoder<B>,
        optimizer: O,
        settings: TrainerSettings,
        device: B::Device,
    ) -> Result<Self, DualEncoderError> {
        let mode: Mode = mode.parse()?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        tracing::info!(
            %mode,
            sampling = %settings.negative_sampling,
            base_lr = settings.base_learning_rate,
            "Trainer ready"
        );
        Ok(Self {
            mode,
            model,
            optimizer,
            settings,
            rng,
            device,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn model(&self) -> &DualEncoder<B> {
        &self.model
    }

    /// Run one step on `batch`.
    ///
    /// Knobs and batch are validated before any tensor work. In TRAIN mode
    /// the parameters are updated and `global_step` is incremented exactly
    /// once; on error neither happens.
    pub fn step(
        &mut self,
        batch: &Batch,
        knobs: &StepKnobs,
        global_step: &mut GlobalStep,
    ) -> Result<StepOutput, DualEncoderError> {
        knobs.validate()?;
        batch.validate(self.settings.max_length, self.settings.vocab_size)?;

        match self.mode {
            Mode::Train => Ok(self.train_step(batch, knobs, global_step)),
            Mode::Eval => Ok(self.measure(batch, knobs, global_step)),
        }
    }

    /// Averaged EVAL-style metrics over `batches`, regardless of mode.
    pub fn evaluate(
        &mut self,
        batches: &[Batch],
        knobs: &StepKnobs,
        global_step: &GlobalStep,
    ) -> Result<RunningAvg, DualEncoderError> {
        knobs.validate()?;
        let mut avg = RunningAvg::new();
        for batch in batches {
            batch.validate(self.settings.max_length, self.settings.vocab_size)?;
            avg.update(&self.measure(batch, knobs, global_step));
        }
        Ok(avg)
    }

    /// Save model, optimizer and metadata into `dir`.
    pub fn save_checkpoint(&self, dir: &Path, global_step: &GlobalStep, epoch: usize) -> anyhow::Result<()> {
        save_checkpoint(
            dir,
            &self.model,
            &self.optimizer,
            &CheckpointMeta {
                global_step: global_step.get(),
                epoch,
                lstm_dim: self.model.lstm_dim(),
            },
        )
    }

    fn train_step(&mut self, batch: &Batch, knobs: &StepKnobs, global_step: &mut GlobalStep) -> StepOutput {
        let tensors = batch_to_tensors::<B>(batch, &self.device);
        let output = self.model.forward(tensors, knobs);
        let objective = self.objective(output.similarity, batch.len(), knobs);

        let lr = learning_rate(self.settings.base_learning_rate, global_step);

        // Extract host values before backward
        let mut host = StepOutput::from_objective(&objective, Some(lr), global_step.get());

        let grads = GradientsParams::from_grads(objective.loss.backward(), &self.model);
        self.model = self.optimizer.step(lr, self.model.clone(), grads);
        global_step.increment();

        host.global_step = global_step.get();
        host
    }

    fn measure(&mut self, batch: &Batch, knobs: &StepKnobs, global_step: &GlobalStep) -> StepOutput {
        let model = self.model.valid();
        let tensors = batch_to_tensors::<B::InnerBackend>(batch, &self.device);
        let output = model.forward(tensors, knobs);
        let objective = self.objective(output.similarity, batch.len(), knobs);
        StepOutput::from_objective(&objective, None, global_step.get())
    }

    /// Sample negatives from the detached scores, then build the objective.
    fn objective<C: Backend>(&mut self, similarity: Tensor<C, 2>, batch: usize, knobs: &StepKnobs) -> Objective<C> {
        let scores = tensor_to_vec(similarity.clone());
        let mask = negative_mask(
            &scores,
            batch,
            knobs.num_negative_samples,
            self.settings.negative_sampling,
            &mut self.rng,
        );
        compute_objective(similarity, &mask)
    }
}

fn format_eta(remaining: f64) -> String {
    if remaining < 60.0 {
        format!("{:.0}s", remaining)
    } else if remaining < 3600.0 {
        format!("{:.0}m", remaining / 60.0)
    } else {
        format!("{:.1}h", remaining / 3600.0)
    }
}

/// Run the epoch loop for a TRAIN-mode trainer.
///
/// Batches are reshuffled every epoch with `rng`. Metrics are averaged and
/// logged every `log_interval` steps, `valid_data` is evaluated every
/// `eval_interval` steps, and a checkpoint lands in
/// `{checkpoint_dir}/step_{n}` every `checkpoint_interval` steps. A final
/// checkpoint is written to `{checkpoint_dir}/final`.
///
/// Resuming passes the restored `global_step` and the epoch saved in the
/// checkpoint; the interrupted epoch is rerun from its start.
pub fn train<B, O>(
    trainer: &mut Trainer<B, O>,
    config: &TrainingConfig,
    train_data: &PairDataset,
    valid_data: Option<&PairDataset>,
    global_step: &mut GlobalStep,
    start_epoch: usize,
    rng: &mut StdRng,
) -> anyhow::Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<DualEncoder<B>, B>,
{
    if !trainer.mode().is_training() {
        anyhow::bail!("train() needs a TRAIN trainer, got {}", trainer.mode());
    }
    if train_data.is_empty() {
        anyhow::bail!("training dataset is empty");
    }
    if config.batch_size == 0 {
        anyhow::bail!("batch_size must be > 0");
    }
    for data in std::iter::once(train_data).chain(valid_data) {
        if data.max_length() != trainer.settings.max_length {
            anyhow::bail!(
                "dataset padded to {} tokens but the trainer expects max_length {}",
                data.max_length(),
                trainer.settings.max_length
            );
        }
    }
    config.validate();

    let checkpoint_dir = PathBuf::from(&config.checkpoint_dir);
    std::fs::create_dir_all(&checkpoint_dir)?;

    let knobs = config.train_knobs();
    let eval_knobs = config.eval_knobs();
    let valid_batches = valid_data
        .map(|d| d.batches(config.batch_size, None::<&mut StdRng>))
        .unwrap_or_default();

    let steps_per_epoch = train_data.len().div_ceil(config.batch_size);
    let total_steps = (steps_per_epoch * config.num_epochs.saturating_sub(start_epoch)) as f64;
    tracing::info!(
        pairs = train_data.len(),
        valid_batches = valid_batches.len(),
        steps_per_epoch,
        start_epoch,
        num_epochs = config.num_epochs,
        global_step = global_step.get(),
        "Starting training"
    );

    let mut running_avg = RunningAvg::new();
    let train_start = Instant::now();
    let mut steps_done: u64 = 0;

    for epoch in start_epoch..config.num_epochs {
        for batch in train_data.batches(config.batch_size, Some(&mut *rng)) {
            let out = trainer.step(&batch, &knobs, global_step)?;
            running_avg.update(&out);
            steps_done += 1;
            let step = global_step.get();

            if config.log_interval > 0 && step % config.log_interval == 0 {
                let warnings = out.health_check();
                if !warnings.is_empty() {
                    tracing::warn!(step, "Health check warnings: {:?}", warnings);
                }
                let elapsed = train_start.elapsed().as_secs_f64();
                let remaining = elapsed * (total_steps - steps_done as f64).max(0.0) / steps_done as f64;
                let eta = format_eta(remaining);
                let lr_str = format!("{:.2e}", out.learning_rate.unwrap_or_default());
                tracing::info!(
                    step,
                    epoch,
                    lr = %lr_str,
                    eta,
                    "avg({}) {}",
                    running_avg.count,
                    running_avg.display()
                );
                running_avg.reset();
            }

            if config.eval_interval > 0 && step % config.eval_interval == 0 && !valid_batches.is_empty() {
                let val = trainer.evaluate(&valid_batches, &eval_knobs, global_step)?;
                tracing::info!(step, "val({}) {}", val.count, val.display());
            }

            if config.checkpoint_interval > 0 && step % config.checkpoint_interval == 0 {
                trainer.save_checkpoint(&step_dir(&checkpoint_dir, step), global_step, epoch)?;
            }
        }
        tracing::info!(epoch, global_step = global_step.get(), "Epoch finished");
    }

    if !valid_batches.is_empty() {
        let val = trainer.evaluate(&valid_batches, &eval_knobs, global_step)?;
        tracing::info!(step = global_step.get(), "final val({}) {}", val.count, val.display());
    }

    tracing::info!(
        steps_done,
        global_step = global_step.get(),
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training loop finished"
    );

    trainer.save_checkpoint(&checkpoint_dir.join("final"), global_step, config.num_epochs)?;
    Ok(())
}
