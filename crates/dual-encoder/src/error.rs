/// Errors raised by the dual-encoder core before any tensor work starts.
#[derive(Debug, thiserror::Error)]
pub enum DualEncoderError {
    /// Construction mode was neither a TRAIN nor an EVAL spelling.
    #[error("Unsupported mode: {0:?} (expected \"train\", \"TRAIN\", \"val\", \"eval\" or \"EVAL\")")]
    UnsupportedMode(String),

    /// Negative sampling strategy name not recognized.
    #[error("Unknown negative sampling strategy: {0:?} (expected \"random\" or \"hard\")")]
    UnknownSamplingStrategy(String),

    /// Batch shapes are inconsistent with each other or with the model config.
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// A per-step knob is outside its valid range.
    #[error("Invalid step knob: {0}")]
    InvalidKnob(String),
}
