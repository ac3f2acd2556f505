//! Dual-encoder LSTM for response retrieval.
//!
//! Queries and replies are encoded by one shared peephole LSTM and scored
//! with a learned bilinear form `q M r^T`. Training treats each batch's
//! diagonal as positives and samples in-batch negatives (random or hard),
//! minimizing sigmoid cross-entropy with Adam under exponential decay.

pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod mode;
pub mod model;
pub mod training;

pub use config::{load_config, ConfigToml, ModelConfig, TrainingConfig};
pub use data::batch::Batch;
pub use data::dataset::PairDataset;
pub use data::vocab::Vocabulary;
pub use error::DualEncoderError;
pub use inference::{RankedReply, ReplyRanker};
pub use mode::Mode;
pub use model::dual_encoder::{DualEncoder, DualEncoderConfig, DualEncoderOutput};
pub use training::knobs::StepKnobs;
pub use training::metrics::StepOutput;
pub use training::sampler::NegativeSampling;
pub use training::schedule::GlobalStep;
pub use training::trainer::{adam, train, Trainer, TrainerSettings};
