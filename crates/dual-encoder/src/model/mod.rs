//! Network components: embedding table, peephole LSTM, bilinear similarity,
//! the dual encoder that ties them together, and the host/tensor bridge.

pub mod bridge;
pub mod dropout;
pub mod dual_encoder;
pub mod embedding;
pub mod lstm;
pub mod similarity;
