//! Chunk-level precision, recall and F1.

use std::fmt;
use std::io::{self, Write};

use tracing::{info, warn};

use crate::chunks::{Chunk, chunks_to_seq, text_of};
use crate::error::EvalError;
use crate::syntree::TreebankNode;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FScore {
  pub recall: f64,
  pub precision: f64,
  pub fscore: f64,
}

impl fmt::Display for FScore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "(Recall={:.2}%, Precision={:.2}%, FScore={:.2}%)",
      self.recall * 100.0,
      self.precision * 100.0,
      self.fscore * 100.0
    )
  }
}

/// Number of (gold, predicted) pairs of identical chunks.
pub fn count_common_chunks(gold: &[Chunk], predicted: &[Chunk]) -> usize {
  gold
    .iter()
    .map(|g| predicted.iter().filter(|p| *p == g).count())
    .sum()
}

fn ratio(num: usize, den: usize) -> f64 {
  if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Scores from raw counts. Zero denominators give 0.
pub fn performance(matched: usize, gold: usize, predicted: usize) -> FScore {
  let precision = ratio(matched, predicted);
  let recall = ratio(matched, gold);
  let fscore = if precision + recall == 0.0 {
    0.0
  } else {
    2.0 * precision * recall / (precision + recall)
  };
  FScore {
    recall,
    precision,
    fscore,
  }
}

/// Accumulates chunk counts and CoNLL rows over a corpus.
///
/// A sentence whose predicted chunks cover a different text than the gold
/// ones is reported and counted as invalid, but its chunks still count.
#[derive(Debug, Default)]
pub struct ChunkEvaluator {
  matched: usize,
  gold: usize,
  predicted: usize,
  sentences: usize,
  invalid: usize,
  conll: String,
}

impl ChunkEvaluator {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn add(&mut self, gold: &[Chunk], predicted: &[Chunk]) -> Result<(), EvalError> {
    let words = text_of(gold);
    let gold_seq = chunks_to_seq(gold);
    let predicted_seq = chunks_to_seq(predicted);

    for ((word, g), p) in words.iter().zip(&gold_seq).zip(&predicted_seq) {
      self.conll.push_str(&format!("{}\t{}\t{}\n", word, g, p));
    }
    self.conll.push('\n');

    self.matched += count_common_chunks(gold, predicted);
    self.gold += gold.len();
    self.predicted += predicted.len();
    self.sentences += 1;

    let checked = check_alignment(&words, &text_of(predicted), gold_seq.len(), predicted_seq.len());
    if checked.is_err() {
      self.invalid += 1;
    }
    checked
  }

  pub fn sentences(&self) -> usize {
    self.sentences
  }

  /// Sentences whose chunkings could not be aligned.
  pub fn invalid(&self) -> usize {
    self.invalid
  }

  pub fn score(&self) -> FScore {
    performance(self.matched, self.gold, self.predicted)
  }

  /// Writes `symbol gold predicted` rows, one blank line after each sentence.
  pub fn write_conll<W: Write>(&self, w: &mut W) -> io::Result<()> {
    w.write_all(self.conll.as_bytes())
  }
}

fn check_alignment(gold: &[&str], predicted: &[&str], gold_len: usize, predicted_len: usize) -> Result<(), EvalError> {
  if gold_len != predicted_len {
    return Err(EvalError::LengthMismatch {
      gold: gold_len,
      predicted: predicted_len,
    });
  }
  match gold.iter().zip(predicted).position(|(g, p)| g != p) {
    Some(position) => Err(EvalError::WordMismatch {
      position,
      gold: gold[position].to_string(),
      predicted: predicted[position].to_string(),
    }),
    None => Ok(()),
  }
}

/// Evaluates the chunks of predicted trees against those of gold trees.
pub fn eval_trees(gold: &[TreebankNode], predicted: &[TreebankNode]) -> ChunkEvaluator {
  eval_chunks(
    gold.iter().map(TreebankNode::to_chunks),
    predicted.iter().map(TreebankNode::to_chunks),
  )
}

pub fn eval_chunks<G, P>(gold: G, predicted: P) -> ChunkEvaluator
where
  G: IntoIterator<Item = Vec<Chunk>>,
  P: IntoIterator<Item = Vec<Chunk>>,
{
  let mut evaluator = ChunkEvaluator::new();
  for (i, (g, p)) in gold.into_iter().zip(predicted).enumerate() {
    if let Err(e) = evaluator.add(&g, &p) {
      warn!(sentence = i, error = %e, "invalid prediction");
    }
  }
  info!(
    sentences = evaluator.sentences(),
    invalid = evaluator.invalid(),
    score = %evaluator.score(),
    "chunk evaluation"
  );
  evaluator
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chunk(label: &str, start: usize, text: &str) -> Chunk {
    let text = text.chars().map(|c| c.to_string()).collect::<Vec<_>>();
    Chunk::new(label, start, start + text.len(), text)
  }

  #[test]
  fn test_performance() {
    let f = performance(1, 2, 4);
    assert_eq!(f.precision, 0.25);
    assert_eq!(f.recall, 0.5);
    assert!((f.fscore - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(performance(0, 0, 0).fscore, 0.0);
    assert_eq!(performance(0, 3, 0).precision, 0.0);
    assert_eq!(
      performance(1, 1, 1).to_string(),
      "(Recall=100.00%, Precision=100.00%, FScore=100.00%)"
    );
  }

  #[test]
  fn test_evaluator() {
    let gold = vec![chunk("loc", 0, "北京"), chunk("o", 2, "欢迎你")];
    let predicted = vec![chunk("loc", 0, "北京"), chunk("o", 2, "欢"), chunk("o", 3, "迎你")];

    let mut eval = ChunkEvaluator::new();
    eval.add(&gold, &predicted).unwrap();
    assert_eq!(eval.score(), performance(1, 2, 3));

    let mut out = Vec::new();
    eval.write_conll(&mut out).unwrap();
    assert_eq!(
      String::from_utf8(out).unwrap(),
      "北\tB-loc\tB-loc\n京\tI-loc\tI-loc\n欢\tB-o\tB-o\n迎\tI-o\tB-o\n你\tI-o\tI-o\n\n"
    );
  }

  #[test]
  fn test_invalid_sentences() {
    let gold = vec![chunk("o", 0, "abc")];
    let mut eval = ChunkEvaluator::new();
    assert_eq!(
      eval.add(&gold, &[chunk("o", 0, "ab")]),
      Err(EvalError::LengthMismatch { gold: 3, predicted: 2 })
    );
    assert_eq!(
      eval.add(&gold, &[chunk("o", 0, "abd")]),
      Err(EvalError::WordMismatch {
        position: 2,
        gold: "c".into(),
        predicted: "d".into()
      })
    );
    assert!(eval.add(&gold, &gold).is_ok());
    assert_eq!(eval.invalid(), 2);
    assert_eq!(eval.sentences(), 3);
  }
}
