//! Typed per-sentence errors.
//!
//! These are data conditions, not caller bugs: batch helpers count them and keep
//! going. Broken tree invariants still panic.

use thiserror::Error;

use crate::labels::Label;

/// A chunk list that cannot be turned into a tree over its sentence.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChunkError {
  #[error("empty sentence")]
  EmptySentence,

  /// Chunks must sweep the sentence without gaps or overlaps.
  #[error("chunk {index} starts at {found}, expected {expected}")]
  NotContiguous {
    index: usize,
    expected: usize,
    found: usize,
  },

  #[error("chunk {index} is empty or reversed ({start}..{end})")]
  EmptyChunk {
    index: usize,
    start: usize,
    end: usize,
  },

  #[error("chunks end at {end}, sentence has {len} symbols")]
  LengthMismatch { end: usize, len: usize },

  #[error("unknown chunk label '{label}'")]
  UnknownLabel { label: String },
}

/// Failures of a gold-constrained chart pass.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
  #[error("gold label {label} is not in the label vocabulary")]
  UnknownLabel { label: Label },

  #[error("gold tree spans {gold} symbols, sentence has {len}")]
  GoldLengthMismatch { gold: usize, len: usize },

  #[error("gold tree has no split inside {left}..{right}")]
  NoGoldSplit { left: usize, right: usize },
}

/// Gold and predicted chunkings that cannot be compared position by position.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
  #[error("BIO length mismatch: gold has {gold} tags, predicted has {predicted}")]
  LengthMismatch { gold: usize, predicted: usize },

  #[error("word mismatch at {position}: gold '{gold}', predicted '{predicted}'")]
  WordMismatch {
    position: usize,
    gold: String,
    predicted: String,
  },
}
