//! Initial embedding matrix: pretrained vectors where available, random fill
//! elsewhere.
//!
//! The pretrained file is plain text, one `token v_1 ... v_embed_dim` per line
//! (GloVe layout). Tokens not in the vocabulary are skipped.

use std::io::BufRead;
use std::path::Path;

use rand::Rng;

use crate::data::vocab::{Vocabulary, UNKNOWN_ID};

/// Half-width of the uniform range for rows without a pretrained vector.
pub const RANDOM_INIT_RANGE: f32 = 0.25;

/// Row-major `(vocab_size, embed_dim)` matrix on the host.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    pub vocab_size: usize,
    pub embed_dim: usize,
    pub values: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Row `id` as a slice.
    pub fn row(&self, id: usize) -> &[f32] {
        &self.values[id * self.embed_dim..(id + 1) * self.embed_dim]
    }

    fn row_mut(&mut self, id: usize) -> &mut [f32] {
        &mut self.values[id * self.embed_dim..(id + 1) * self.embed_dim]
    }
}

/// Build the initial embedding matrix.
///
/// Every row starts as `Uniform(-0.25, 0.25)`. When `pretrained` is given,
/// rows for vocabulary tokens found in the file are overwritten and row 0
/// (unknown/padding) is zeroed unless the file covers it.
///
/// # Errors
/// Fails if the file cannot be read or a vector has the wrong dimension.
pub fn load_embeddings(
    vocab: &Vocabulary,
    pretrained: Option<&Path>,
    vocab_size: usize,
    embed_dim: usize,
    rng: &mut impl Rng,
) -> anyhow::Result<EmbeddingMatrix> {
    if vocab.len() > vocab_size {
        tracing::warn!(
            vocab_len = vocab.len(),
            vocab_size,
            "Vocabulary is larger than the embedding table; extra tokens will be unreachable"
        );
    }

    let values = (0..vocab_size * embed_dim)
        .map(|_| rng.gen_range(-RANDOM_INIT_RANGE..RANDOM_INIT_RANGE))
        .collect();
    let mut matrix = EmbeddingMatrix {
        vocab_size,
        embed_dim,
        values,
    };

    let Some(path) = pretrained else {
        tracing::info!(vocab_size, embed_dim, "Randomly initialized embeddings");
        return Ok(matrix);
    };

    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open pretrained embeddings {}: {e}", path.display()))?;

    let mut covered = vec![false; vocab_size];
    for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(token) = fields.next() else {
            continue;
        };
        let id = vocab.id(token) as usize;
        let is_known = id != UNKNOWN_ID as usize || vocab.token(UNKNOWN_ID) == Some(token);
        if !is_known || id >= vocab_size {
            continue;
        }

        let vector = fields
            .map(str::parse::<f32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("{}:{}: bad value: {e}", path.display(), line_no + 1))?;
        if vector.len() != embed_dim {
            anyhow::bail!(
                "{}:{}: vector for {token:?} has {} values, expected {embed_dim}",
                path.display(),
                line_no + 1,
                vector.len()
            );
        }
        matrix.row_mut(id).copy_from_slice(&vector);
        covered[id] = true;
    }

    if !covered[UNKNOWN_ID as usize] {
        matrix.row_mut(UNKNOWN_ID as usize).fill(0.0);
    }

    let hits = covered.iter().filter(|c| **c).count();
    tracing::info!(
        path = %path.display(),
        hits,
        vocab_size,
        coverage = format!("{:.1}%", hits as f64 / vocab_size.max(1) as f64 * 100.0),
        "Loaded pretrained embeddings"
    );
    Ok(matrix)
}
