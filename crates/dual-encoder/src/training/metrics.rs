use burn::prelude::*;

use crate::model::bridge::{int_tensor_to_vec, tensor_to_f64, tensor_to_vec};
use crate::training::objective::Objective;

/// Host-side values produced by one step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub loss: f64,
    pub accuracy: f64,
    /// `sigmoid(logits)`, positives first.
    pub probs: Vec<f64>,
    /// `probs > 0.5` as 0/1, aligned with `probs`.
    pub predictions: Vec<i64>,
    /// `sigmoid` of the diagonal, one per pair.
    pub positive_probs: Vec<f64>,
    pub logits: Vec<f64>,
    pub labels: Vec<f64>,
    /// Rate used for the update; `None` when no update was made.
    pub learning_rate: Option<f64>,
    /// Global step after this call.
    pub global_step: u64,
}

impl StepOutput {
    /// Read the objective back to the host.
    pub fn from_objective<B: Backend>(
        objective: &Objective<B>,
        learning_rate: Option<f64>,
        global_step: u64,
    ) -> Self {
        Self {
            loss: tensor_to_f64(objective.loss.clone()),
            accuracy: tensor_to_f64(objective.accuracy.clone()),
            probs: tensor_to_vec(objective.probs.clone()),
            predictions: int_tensor_to_vec(objective.predictions.clone()),
            positive_probs: tensor_to_vec(objective.positive_probs.clone()),
            logits: tensor_to_vec(objective.logits.clone()),
            labels: tensor_to_vec(objective.labels.clone()),
            learning_rate,
            global_step,
        }
    }

    pub fn num_positives(&self) -> usize {
        self.positive_probs.len()
    }

    pub fn num_negatives(&self) -> usize {
        self.labels.len() - self.positive_probs.len()
    }

    pub fn positive_prob_mean(&self) -> f64 {
        if self.positive_probs.is_empty() {
            return 0.0;
        }
        self.positive_probs.iter().sum::<f64>() / self.positive_probs.len() as f64
    }

    /// Warnings for symptoms of a broken run.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.loss.is_finite() {
            warnings.push(format!(
                "non-finite loss {} (zero-length sequences or diverged weights)",
                self.loss
            ));
        }
        let total = self.labels.len();
        if total > 0 && self.num_negatives() > 0 {
            if self.predictions.iter().all(|&p| p == 0) {
                warnings.push("model predicts every pair negative".to_string());
            } else if self.predictions.iter().all(|&p| p == 1) {
                warnings.push("model predicts every pair positive".to_string());
            }
        }
        warnings
    }
}

/// Running averages over a logging interval.
#[derive(Debug, Clone, Default)]
pub struct RunningAvg {
    loss: f64,
    accuracy: f64,
    positive_prob: f64,
    pub count: usize,
}

impl RunningAvg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, out: &StepOutput) {
        self.loss += out.loss;
        self.accuracy += out.accuracy;
        self.positive_prob += out.positive_prob_mean();
        self.count += 1;
    }

    pub fn loss(&self) -> Option<f64> {
        (self.count > 0).then(|| self.loss / self.count as f64)
    }

    pub fn accuracy(&self) -> Option<f64> {
        (self.count > 0).then(|| self.accuracy / self.count as f64)
    }

    pub fn positive_prob(&self) -> Option<f64> {
        (self.count > 0).then(|| self.positive_prob / self.count as f64)
    }

    pub fn display(&self) -> String {
        if self.count == 0 {
            return "no data".to_string();
        }
        let n = self.count as f64;
        format!(
            "loss={:.4} acc={:.3} pos_prob={:.3}",
            self.loss / n,
            self.accuracy / n,
            self.positive_prob / n,
        )
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
