//! Reply ranking at inference time.
//!
//! The candidate pool is encoded once when it is set; each query is then
//! encoded and scored against every pooled reply with the learned bilinear
//! form. Scores are `sigmoid(q M r^T)`, so higher means a better match.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use crate::config::ModelConfig;
use crate::data::dataset::encode_text;
use crate::data::vocab::Vocabulary;
use crate::model::bridge::{ids_to_tensor, tensor_to_vec};
use crate::model::dual_encoder::DualEncoder;
use crate::training::checkpoint::load_model;

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedReply {
    /// Position in the pool.
    pub index: usize,
    pub reply: String,
    /// Match probability in `(0, 1)`.
    pub score: f64,
}

/// Scores queries against a fixed pool of candidate replies.
pub struct ReplyRanker<B: Backend> {
    model: DualEncoder<B>,
    vocab: Vocabulary,
    max_length: usize,
    replies: Vec<String>,
    /// `(pool, lstm_dim)` reply encodings, `None` while the pool is empty.
    encoded: Option<Tensor<B, 2>>,
    device: B::Device,
}

impl<B: Backend> ReplyRanker<B> {
    pub fn new(model: DualEncoder<B>, vocab: Vocabulary, max_length: usize, device: B::Device) -> Self {
        Self {
            model,
            vocab,
            max_length,
            replies: Vec::new(),
            encoded: None,
            device,
        }
    }

    /// Load a ranker from a checkpoint directory written by the trainer.
    pub fn load(
        checkpoint_dir: &Path,
        config: &ModelConfig,
        vocab: Vocabulary,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        let model = load_model::<B>(checkpoint_dir, &config.dual_encoder_config(), &device)?;
        tracing::info!(dir = %checkpoint_dir.display(), "Loaded ranker model");
        Ok(Self::new(model, vocab, config.max_length, device))
    }

    /// Encode texts with dropout disabled. Output: `(texts, lstm_dim)`.
    pub fn encode_texts(&self, texts: &[&str]) -> Tensor<B, 2> {
        let mut rows = Vec::with_capacity(texts.len());
        let mut lengths = Vec::with_capacity(texts.len());
        for text in texts {
            let (ids, length) = encode_text(text, &self.vocab, self.max_length);
            rows.push(ids);
            lengths.push(length);
        }
        let ids = ids_to_tensor::<B>(&rows, &self.device);
        self.model
            .encode(self.model.embedding.table(1.0), ids, &lengths, 1.0)
    }

    /// Replace the candidate pool and encode it.
    pub fn set_pool(&mut self, replies: Vec<String>) {
        self.encoded = if replies.is_empty() {
            None
        } else {
            let texts: Vec<&str> = replies.iter().map(String::as_str).collect();
            Some(self.encode_texts(&texts))
        };
        tracing::debug!(pool = replies.len(), "Encoded reply pool");
        self.replies = replies;
    }

    pub fn pool_size(&self) -> usize {
        self.replies.len()
    }

    /// Match probability of `query` against every pooled reply, in pool order.
    pub fn score(&self, query: &str) -> Vec<f64> {
        let Some(pool) = &self.encoded else {
            return Vec::new();
        };
        let query = self.encode_texts(&[query]);
        let logits = self.model.similarity.forward(query, pool.clone(), 1.0);
        tensor_to_vec(sigmoid(logits))
    }

    /// The `top_k` best replies for `query`, best first. Ties keep pool order.
    pub fn rank(&self, query: &str, top_k: usize) -> Vec<RankedReply> {
        let scores = self.score(query);
        rank_order(&scores)
            .into_iter()
            .take(top_k)
            .map(|index| RankedReply {
                index,
                reply: self.replies[index].clone(),
                score: scores[index],
            })
            .collect()
    }
}

/// Indices of `scores`, highest first; equal scores keep index order.
fn rank_order(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order
}
