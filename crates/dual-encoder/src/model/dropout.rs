//! Keep-probability dropout driven by per-call knobs.
//!
//! `burn::nn::Dropout` fixes its probability at construction, but every step
//! here supplies fresh keep probabilities (and evaluation passes `1.0`), so
//! the masks are drawn directly. Inverted scaling: kept entries are divided by
//! `keep_prob` so the expected value is unchanged.

use burn::prelude::*;
use burn::tensor::Distribution;

/// Element-wise dropout. `keep_prob >= 1.0` returns the input untouched.
pub fn dropout<B: Backend, const D: usize>(x: Tensor<B, D>, keep_prob: f64) -> Tensor<B, D> {
    if keep_prob >= 1.0 {
        return x;
    }
    let mask = Tensor::<B, D>::random(x.shape(), Distribution::Bernoulli(keep_prob), &x.device());
    x * mask / keep_prob
}

/// Row dropout: each row is kept or zeroed as a whole (noise shape `[rows, 1]`).
///
/// Applied to the embedding table so that a dropped token vanishes from every
/// position it appears at in the batch.
pub fn row_dropout<B: Backend>(x: Tensor<B, 2>, keep_prob: f64) -> Tensor<B, 2> {
    if keep_prob >= 1.0 {
        return x;
    }
    let [rows, cols] = x.dims();
    let mask = Tensor::<B, 2>::random([rows, 1], Distribution::Bernoulli(keep_prob), &x.device())
        .repeat_dim(1, cols);
    x * mask / keep_prob
}
