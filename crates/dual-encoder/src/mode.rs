//! Operating mode of a model, fixed at construction.

use std::fmt;
use std::str::FromStr;

use crate::error::DualEncoderError;

/// TRAIN runs the optimizer after every forward pass; EVAL only measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

impl Mode {
    /// Whether this mode performs parameter updates.
    pub fn is_training(self) -> bool {
        self == Mode::Train
    }
}

impl FromStr for Mode {
    type Err = DualEncoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" | "TRAIN" => Ok(Mode::Train),
            "val" | "eval" | "EVAL" => Ok(Mode::Eval),
            other => Err(DualEncoderError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "TRAIN"),
            Mode::Eval => write!(f, "EVAL"),
        }
    }
}
