use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// Id returned for tokens missing from the vocabulary. Also the padding id.
pub const UNKNOWN_ID: u32 = 0;

/// Ordered token list with a reverse index. Token `i` maps to id `i`.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocabulary {
    /// Build from an ordered token list. On duplicates the first occurrence wins.
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            index.entry(token.clone()).or_insert(i as u32);
        }
        Self { tokens, index }
    }

    /// Load a vocabulary file with one token per line.
    ///
    /// Trailing whitespace is stripped; empty lines still occupy an id so that
    /// line numbers and ids stay aligned.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open vocabulary {}: {e}", path.display()))?;
        let tokens = std::io::BufReader::new(file)
            .lines()
            .map(|line| line.map(|l| l.trim_end().to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        if tokens.is_empty() {
            anyhow::bail!("Vocabulary {} is empty", path.display());
        }
        tracing::info!(path = %path.display(), size = tokens.len(), "Loaded vocabulary");
        Ok(Self::from_tokens(tokens))
    }

    /// Id of `token`, or [`UNKNOWN_ID`] when absent.
    pub fn id(&self, token: &str) -> u32 {
        self.index.get(token).copied().unwrap_or(UNKNOWN_ID)
    }

    /// Token at `id`, if in range.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
