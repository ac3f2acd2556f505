use crate::error::DualEncoderError;

/// Per-step knobs supplied fresh on every call.
///
/// Keep probabilities lie in `(0, 1]`; `1.0` disables that dropout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepKnobs {
    /// Whole-row dropout on the embedding table.
    pub embed_dropout_keep_prob: f64,
    /// Per-step dropout on LSTM inputs.
    pub lstm_dropout_keep_prob: f64,
    /// Dropout on the entries of the bilinear matrix `M`.
    pub dense_dropout_keep_prob: f64,
    /// Negatives selected per row of the similarity matrix.
    pub num_negative_samples: usize,
}

impl StepKnobs {
    /// No dropout anywhere, `k` negatives per row.
    pub fn evaluation(num_negative_samples: usize) -> Self {
        Self {
            embed_dropout_keep_prob: 1.0,
            lstm_dropout_keep_prob: 1.0,
            dense_dropout_keep_prob: 1.0,
            num_negative_samples,
        }
    }

    /// Reject keep probabilities outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), DualEncoderError> {
        for (name, p) in [
            ("embed_dropout_keep_prob", self.embed_dropout_keep_prob),
            ("lstm_dropout_keep_prob", self.lstm_dropout_keep_prob),
            ("dense_dropout_keep_prob", self.dense_dropout_keep_prob),
        ] {
            if !(p > 0.0 && p <= 1.0) {
                return Err(DualEncoderError::InvalidKnob(format!(
                    "{name} = {p}, must be in (0, 1]"
                )));
            }
        }
        Ok(())
    }
}
