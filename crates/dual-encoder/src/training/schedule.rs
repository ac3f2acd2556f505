//! Global step counter and the exponentially decaying learning rate.

/// Steps between successive decays.
pub const DECAY_STEPS: u64 = 20_000;
/// Multiplicative decay per `DECAY_STEPS`.
pub const DECAY_RATE: f64 = 0.96;

/// Completed training steps over the whole run.
///
/// Owned by the training-loop driver and restored from checkpoints; the
/// trainer only reads it and bumps it after a successful update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GlobalStep(u64);

impl GlobalStep {
    pub fn new(step: u64) -> Self {
        Self(step)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn increment(&mut self) {
        self.0 += 1;
    }
}

/// `base_lr * 0.96^(step / 20000)` with a continuous exponent.
pub fn learning_rate(base_lr: f64, step: &GlobalStep) -> f64 {
    base_lr * DECAY_RATE.powf(step.get() as f64 / DECAY_STEPS as f64)
}
