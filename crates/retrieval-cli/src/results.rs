//! Result types written by the `eval` and `rank` subcommands.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Aggregate metrics from evaluating a checkpoint on a pair file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalReport {
    pub checkpoint: String,
    pub data: String,
    /// Global step stored with the checkpoint.
    pub global_step: u64,
    pub pairs: usize,
    pub batches: usize,
    pub num_negative_samples: usize,
    pub loss: f64,
    pub accuracy: f64,
    /// Mean `sigmoid` of the true-pair logits.
    pub positive_prob: f64,
}

/// Ranked replies for one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankReport {
    pub query: String,
    pub replies: Vec<RankedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedEntry {
    pub index: usize,
    pub reply: String,
    pub score: f64,
}

/// Write any serializable report as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", path.display()))?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}
