//! Logits, labels, sigmoid cross-entropy and accuracy from a similarity matrix.
//!
//! Logits and labels share the similarity matrix's float element, so the loss
//! is differentiable back into every parameter that produced the matrix.

use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::TensorData;

use crate::training::sampler::mask_indices;

/// Per-batch objective tensors.
///
/// `logits` is positives (diagonal order) followed by negatives (row-major
/// order); `labels` is the matching `1, ..., 1, 0, ..., 0`.
#[derive(Debug, Clone)]
pub struct Objective<B: Backend> {
    pub positive_logits: Tensor<B, 1>,
    /// `None` when the mask selected no negatives.
    pub negative_logits: Option<Tensor<B, 1>>,
    pub logits: Tensor<B, 1>,
    pub labels: Tensor<B, 1>,
    /// Mean sigmoid cross-entropy, shape `(1,)`.
    pub loss: Tensor<B, 1>,
    pub probs: Tensor<B, 1>,
    pub positive_probs: Tensor<B, 1>,
    /// `probs > 0.5` as 0/1.
    pub predictions: Tensor<B, 1, Int>,
    /// Fraction of `predictions == labels`, shape `(1,)`.
    pub accuracy: Tensor<B, 1>,
}

/// Element-wise sigmoid cross-entropy with logits.
///
/// Uses `max(x, 0) - x * z + log(1 + exp(-|x|))`, which never overflows.
pub fn sigmoid_cross_entropy<B: Backend>(logits: Tensor<B, 1>, labels: Tensor<B, 1>) -> Tensor<B, 1> {
    logits.clone().clamp_min(0.0) - logits.clone() * labels + logits.abs().neg().exp().log1p()
}

fn gather<B: Backend>(flat: Tensor<B, 1>, indices: &[usize]) -> Tensor<B, 1> {
    let device = flat.device();
    let indices: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
    let n = indices.len();
    flat.select(0, Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [n]), &device))
}

/// Build the objective for a square similarity matrix and a negative mask.
///
/// The positive entries are always exactly the diagonal. No class
/// reweighting: the loss is the plain mean over positives and negatives
/// together.
///
/// # Panics
/// Panics if `similarity` is not square or `negative_mask` has the wrong size.
pub fn compute_objective<B: Backend>(similarity: Tensor<B, 2>, negative_mask: &[bool]) -> Objective<B> {
    let [rows, cols] = similarity.dims();
    assert_eq!(rows, cols, "similarity must be square, got {rows}x{cols}");
    assert_eq!(negative_mask.len(), rows * cols, "negative mask size mismatch");

    let flat = similarity.reshape([rows * cols]);
    let diagonal: Vec<usize> = (0..rows).map(|i| i * rows + i).collect();
    let negatives = mask_indices(negative_mask);

    let positive_logits = gather(flat.clone(), &diagonal);
    let negative_logits = (!negatives.is_empty()).then(|| gather(flat, &negatives));

    // Same element type as the logits.
    let positive_labels = positive_logits.ones_like();
    let (logits, labels) = match &negative_logits {
        Some(neg) => (
            Tensor::cat(vec![positive_logits.clone(), neg.clone()], 0),
            Tensor::cat(vec![positive_labels, neg.zeros_like()], 0),
        ),
        None => (positive_logits.clone(), positive_labels),
    };

    let loss = sigmoid_cross_entropy(logits.clone(), labels.clone()).mean();
    let probs = sigmoid(logits.clone());
    let positive_probs = sigmoid(positive_logits.clone());
    let predictions = probs.clone().greater_elem(0.5).int();
    let accuracy = predictions.clone().equal(labels.clone().int()).float().mean();

    Objective {
        positive_logits,
        negative_logits,
        logits,
        labels,
        loss,
        probs,
        positive_probs,
        predictions,
        accuracy,
    }
}
