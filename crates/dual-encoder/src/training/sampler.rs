//! In-batch negative sampling over the similarity matrix.
//!
//! Masks are flat, row-major over the `(batch, batch)` matrix: entry
//! `i * batch + j` is query `i` against reply `j`. The positive mask is the
//! diagonal; negative masks never touch it.

use std::fmt;
use std::str::FromStr;

use rand::seq::index;
use rand::Rng;
use serde::Deserialize;

use crate::error::DualEncoderError;

/// How negatives are chosen from each row's off-diagonal entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum NegativeSampling {
    /// Uniform without replacement, independently per row.
    #[default]
    Random,
    /// Highest-scoring off-diagonal columns under the current model.
    /// Ties go to the lower column index.
    Hard,
}

impl FromStr for NegativeSampling {
    type Err = DualEncoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(NegativeSampling::Random),
            "hard" => Ok(NegativeSampling::Hard),
            other => Err(DualEncoderError::UnknownSamplingStrategy(other.to_string())),
        }
    }
}

impl TryFrom<String> for NegativeSampling {
    type Error = DualEncoderError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for NegativeSampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegativeSampling::Random => write!(f, "random"),
            NegativeSampling::Hard => write!(f, "hard"),
        }
    }
}

/// Diagonal mask for a `(batch, batch)` matrix.
pub fn positive_mask(batch: usize) -> Vec<bool> {
    let mut mask = vec![false; batch * batch];
    for i in 0..batch {
        mask[i * batch + i] = true;
    }
    mask
}

/// Select `k` negatives per row of a flat `(batch, batch)` similarity matrix.
///
/// When `k >= batch - 1` every off-diagonal entry is selected. The returned
/// mask is disjoint from [`positive_mask`].
///
/// # Panics
/// Panics if `similarity.len() != batch * batch`.
pub fn negative_mask(
    similarity: &[f64],
    batch: usize,
    k: usize,
    strategy: NegativeSampling,
    rng: &mut impl Rng,
) -> Vec<bool> {
    assert_eq!(
        similarity.len(),
        batch * batch,
        "similarity has {} entries, expected {batch}x{batch}",
        similarity.len()
    );
    let mut mask = vec![false; batch * batch];
    if batch < 2 || k == 0 {
        return mask;
    }

    let available = batch - 1;
    for row in 0..batch {
        let columns: Vec<usize> = (0..batch).filter(|&j| j != row).collect();
        let chosen: Vec<usize> = if k >= available {
            columns
        } else {
            match strategy {
                NegativeSampling::Random => index::sample(rng, available, k)
                    .into_iter()
                    .map(|i| columns[i])
                    .collect(),
                NegativeSampling::Hard => {
                    let scores = &similarity[row * batch..(row + 1) * batch];
                    let mut ranked = columns;
                    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
                    ranked.truncate(k);
                    ranked
                }
            }
        };
        for col in chosen {
            mask[row * batch + col] = true;
        }
    }
    mask
}

/// Flat indices of the `true` entries of a mask, in row-major order.
pub fn mask_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}
