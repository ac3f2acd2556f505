use crate::error::DualEncoderError;

/// One batch of aligned (query, reply) pairs, padded to `max_length`.
///
/// Reply `i` is the true reply for query `i`; every other reply in the batch
/// is a candidate negative for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// `(batch, max_length)` query token ids.
    pub input_queries: Vec<Vec<u32>>,
    /// `(batch, max_length)` reply token ids.
    pub input_replies: Vec<Vec<u32>>,
    /// True (unpadded) query lengths.
    pub query_lengths: Vec<usize>,
    /// True (unpadded) reply lengths.
    pub reply_lengths: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.input_queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_queries.is_empty()
    }

    /// Check shapes before any compute.
    ///
    /// Zero lengths are allowed through; the encoder returns its initial state
    /// for them.
    pub fn validate(&self, max_length: usize, vocab_size: usize) -> Result<(), DualEncoderError> {
        let n = self.input_queries.len();
        if n == 0 {
            return Err(DualEncoderError::InvalidBatch("batch is empty".into()));
        }
        if self.input_replies.len() != n {
            return Err(DualEncoderError::InvalidBatch(format!(
                "{n} queries but {} replies",
                self.input_replies.len()
            )));
        }
        check_side("query", &self.input_queries, &self.query_lengths, max_length, vocab_size)?;
        check_side("reply", &self.input_replies, &self.reply_lengths, max_length, vocab_size)?;
        Ok(())
    }
}

fn check_side(
    side: &str,
    ids: &[Vec<u32>],
    lengths: &[usize],
    max_length: usize,
    vocab_size: usize,
) -> Result<(), DualEncoderError> {
    if lengths.len() != ids.len() {
        return Err(DualEncoderError::InvalidBatch(format!(
            "{} {side} lengths for {} {side} rows",
            lengths.len(),
            ids.len()
        )));
    }
    for (row, (seq, &len)) in ids.iter().zip(lengths).enumerate() {
        if seq.len() != max_length {
            return Err(DualEncoderError::InvalidBatch(format!(
                "{side} row {row} has width {}, expected max_length {max_length}",
                seq.len()
            )));
        }
        if len > max_length {
            return Err(DualEncoderError::InvalidBatch(format!(
                "{side} row {row} has length {len} > max_length {max_length}"
            )));
        }
        if let Some(&bad) = seq.iter().find(|&&id| id as usize >= vocab_size) {
            return Err(DualEncoderError::InvalidBatch(format!(
                "{side} row {row} has token id {bad} >= vocab_size {vocab_size}"
            )));
        }
    }
    Ok(())
}
