//! Training pipeline: negative sampling, objective, metrics with health
//! checks, learning-rate schedule, checkpoints and the Adam training loop.

pub mod checkpoint;
pub mod knobs;
pub mod metrics;
pub mod objective;
pub mod sampler;
pub mod schedule;
pub mod trainer;
