//! JSONL (query, reply) pair dataset and batch iteration.
//!
//! Each line is `{"query": "...", "reply": "..."}`. Text is split on
//! whitespace and looked up in the vocabulary; no other tokenization happens
//! here.

use std::io::BufRead;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::batch::Batch;
use crate::data::vocab::{Vocabulary, UNKNOWN_ID};

#[derive(serde::Deserialize)]
struct PairJson {
    query: String,
    reply: String,
}

/// A single (query, reply) pair after id lookup, padded to `max_length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPair {
    pub query_ids: Vec<u32>,
    pub query_length: usize,
    pub reply_ids: Vec<u32>,
    pub reply_length: usize,
}

/// Map whitespace tokens to ids, truncate to `max_length`, pad with id 0.
///
/// Returns the padded ids and the true length `min(token_count, max_length)`.
pub fn encode_text(text: &str, vocab: &Vocabulary, max_length: usize) -> (Vec<u32>, usize) {
    let mut ids: Vec<u32> = text
        .split_whitespace()
        .take(max_length)
        .map(|token| vocab.id(token))
        .collect();
    let length = ids.len();
    ids.resize(max_length, UNKNOWN_ID);
    (ids, length)
}

/// In-memory dataset of encoded pairs.
#[derive(Debug, Clone)]
pub struct PairDataset {
    pairs: Vec<EncodedPair>,
    max_length: usize,
}

impl PairDataset {
    /// Encode raw `(query, reply)` strings.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
        vocab: &Vocabulary,
        max_length: usize,
    ) -> Self {
        let pairs = pairs
            .into_iter()
            .map(|(query, reply)| {
                let (query_ids, query_length) = encode_text(query, vocab, max_length);
                let (reply_ids, reply_length) = encode_text(reply, vocab, max_length);
                EncodedPair {
                    query_ids,
                    query_length,
                    reply_ids,
                    reply_length,
                }
            })
            .collect();
        Self { pairs, max_length }
    }

    /// Load a JSONL pair file. Blank lines are skipped.
    pub fn from_jsonl(path: &Path, vocab: &Vocabulary, max_length: usize) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open dataset {}: {e}", path.display()))?;

        let mut raw = Vec::new();
        for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let pair: PairJson = serde_json::from_str(&line)
                .map_err(|e| anyhow::anyhow!("{}:{}: {e}", path.display(), line_no + 1))?;
            raw.push((pair.query, pair.reply));
        }

        let dataset = Self::from_pairs(
            raw.iter().map(|(q, r)| (q.as_str(), r.as_str())),
            vocab,
            max_length,
        );
        let empty = dataset
            .pairs
            .iter()
            .filter(|p| p.query_length == 0 || p.reply_length == 0)
            .count();
        if empty > 0 {
            tracing::warn!(
                path = %path.display(),
                empty,
                "Pairs with an empty query or reply; their encodings will be the initial state"
            );
        }
        tracing::info!(path = %path.display(), pairs = dataset.len(), "Loaded pair dataset");
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn pairs(&self) -> &[EncodedPair] {
        &self.pairs
    }

    /// Split into batches of `batch_size`, optionally shuffling first.
    ///
    /// The final partial batch is kept.
    pub fn batches(&self, batch_size: usize, rng: Option<&mut impl Rng>) -> Vec<Batch> {
        assert!(batch_size > 0, "batch_size must be > 0");
        let mut order: Vec<usize> = (0..self.pairs.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        order
            .chunks(batch_size)
            .map(|chunk| {
                let pairs = chunk.iter().map(|&i| &self.pairs[i]);
                collate(pairs)
            })
            .collect()
    }
}

/// Stack encoded pairs into a [`Batch`].
pub fn collate<'a>(pairs: impl Iterator<Item = &'a EncodedPair>) -> Batch {
    let mut batch = Batch {
        input_queries: Vec::new(),
        input_replies: Vec::new(),
        query_lengths: Vec::new(),
        reply_lengths: Vec::new(),
    };
    for pair in pairs {
        batch.input_queries.push(pair.query_ids.clone());
        batch.input_replies.push(pair.reply_ids.clone());
        batch.query_lengths.push(pair.query_length);
        batch.reply_lengths.push(pair.reply_length);
    }
    batch
}
