use burn::prelude::*;
use rand::Rng;

use crate::data::embeddings::EmbeddingMatrix;
use crate::model::bridge::BatchTensors;
use crate::model::embedding::{lookup, EmbeddingTable, EmbeddingTableConfig};
use crate::model::lstm::{PeepholeLstm, PeepholeLstmConfig};
use crate::model::similarity::{BilinearSimilarity, BilinearSimilarityConfig};
use crate::training::knobs::StepKnobs;

/// Configuration for the full dual encoder.
///
/// ```text
/// ids (batch, max_length)
///   -> embedding table (row dropout) -> (batch, max_length, embed_dim)
///   -> peephole LSTM, shared by queries and replies -> h: (batch, lstm_dim)
///   -> (q @ dropout(M)) @ r^T -> similarity: (batch, batch)
/// ```
///
/// Every tensor stays in the backend's float element so gradients reach all
/// three parameter sets. Double precision comes from running on an `f64`
/// backend, as the CLI does.
#[derive(Config, Debug)]
pub struct DualEncoderConfig {
    pub vocab_size: usize,
    pub embed_dim: usize,
    pub lstm_dim: usize,
    /// Forget-gate bias offset.
    #[config(default = 2.0)]
    pub forget_bias: f64,
    /// Standard deviation of the truncated-normal init for `M`.
    #[config(default = 1.0)]
    pub similarity_init_std: f64,
}

/// Dual encoder: the complete trainable parameter set.
///
/// Holds exactly one encoder. Queries and replies both go through
/// `self.encoder`, so the same token sequence encodes identically on either
/// side.
#[derive(Module, Debug)]
pub struct DualEncoder<B: Backend> {
    pub(crate) embedding: EmbeddingTable<B>,
    pub(crate) encoder: PeepholeLstm<B>,
    pub(crate) similarity: BilinearSimilarity<B>,
}

/// Forward-pass products for one batch.
#[derive(Debug, Clone)]
pub struct DualEncoderOutput<B: Backend> {
    /// `(batch, lstm_dim)` final hidden states of the queries.
    pub queries_encoded: Tensor<B, 2>,
    /// `(batch, lstm_dim)` final hidden states of the replies.
    pub replies_encoded: Tensor<B, 2>,
    /// `(batch, batch)`; entry `(i, j)` scores query `i` against reply `j`.
    pub similarity: Tensor<B, 2>,
}

impl DualEncoderConfig {
    /// Randomly initialized model. Every weight is drawn from `rng`.
    pub fn init<B: Backend>(&self, device: &B::Device, rng: &mut impl Rng) -> DualEncoder<B> {
        let embedding = EmbeddingTableConfig::new(self.vocab_size, self.embed_dim).init(device, rng);
        self.assemble(embedding, device, rng)
    }

    /// Model whose embedding table starts from `matrix`.
    pub fn init_with_embeddings<B: Backend>(
        &self,
        matrix: &EmbeddingMatrix,
        device: &B::Device,
        rng: &mut impl Rng,
    ) -> DualEncoder<B> {
        let embedding = EmbeddingTableConfig::new(self.vocab_size, self.embed_dim)
            .init_from_matrix(matrix, device);
        self.assemble(embedding, device, rng)
    }

    fn assemble<B: Backend>(
        &self,
        embedding: EmbeddingTable<B>,
        device: &B::Device,
        rng: &mut impl Rng,
    ) -> DualEncoder<B> {
        DualEncoder {
            embedding,
            encoder: PeepholeLstmConfig::new(self.embed_dim, self.lstm_dim)
                .with_forget_bias(self.forget_bias)
                .init(device, rng),
            similarity: BilinearSimilarityConfig::new(self.lstm_dim)
                .with_init_std(self.similarity_init_std)
                .init(device, rng),
        }
    }
}

impl<B: Backend> DualEncoder<B> {
    /// Encode one side of a batch against an already-dropped embedding table.
    ///
    /// Output shape: `(batch, lstm_dim)`.
    pub fn encode(
        &self,
        table: Tensor<B, 2>,
        ids: Tensor<B, 2, Int>,
        lengths: &[usize],
        lstm_keep_prob: f64,
    ) -> Tensor<B, 2> {
        let embedded = lookup(table, ids);
        self.encoder
            .forward(embedded, lengths, lstm_keep_prob)
            .hidden
    }

    /// Full forward pass: encode both sides and score every query against
    /// every reply in the batch.
    pub fn forward(&self, batch: BatchTensors<B>, knobs: &StepKnobs) -> DualEncoderOutput<B> {
        let table = self.embedding.table(knobs.embed_dropout_keep_prob);

        let queries_encoded = self.encode(
            table.clone(),
            batch.queries,
            &batch.query_lengths,
            knobs.lstm_dropout_keep_prob,
        );
        let replies_encoded = self.encode(
            table,
            batch.replies,
            &batch.reply_lengths,
            knobs.lstm_dropout_keep_prob,
        );

        let similarity = self.similarity.forward(
            queries_encoded.clone(),
            replies_encoded.clone(),
            knobs.dense_dropout_keep_prob,
        );

        DualEncoderOutput {
            queries_encoded,
            replies_encoded,
            similarity,
        }
    }

    /// Dimension of the encoded vectors.
    pub fn lstm_dim(&self) -> usize {
        self.encoder.d_hidden()
    }
}
