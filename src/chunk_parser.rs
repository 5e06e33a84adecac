//! Chart parser whose leaves are whole chunks.
//!
//! Chunk cells are seeded first, from the gold chunks in the gold pass or
//! from every span up to `max_chunk_length` in the argmax pass, and the merge
//! pass only combines spans that are already in the chart.

use std::fmt;

use rand::RngCore;
use tracing::debug;

use crate::chart::{Chart, ScoreCache, SpanScorer, argmax_in, argmax_label, augment, trace_chart};
use crate::error::ParseError;
use crate::labels::{Label, Labeling, NonTerminalMode};
use crate::latent::LatentScope;
use crate::oracle::OracleContext;
use crate::parse_tree::ParseNode;
use crate::parser::{Gold, GoldOracle, Parse, TrainOutcome, check_gold, label_index, leaves, single_root};
use crate::vocab::LabelVocab;

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkParserConfig {
  pub margin: f64,
  pub zero_cost: bool,
  /// Longest span seeded as a chunk in the argmax pass.
  pub max_chunk_length: usize,
  /// Label indices `1..=label_count` may label a chunk. Defaults to the
  /// number of base labels in the vocabulary.
  pub label_count: Option<usize>,
  pub mode: NonTerminalMode,
}

impl Default for ChunkParserConfig {
  fn default() -> Self {
    Self {
      margin: 1.0,
      zero_cost: false,
      max_chunk_length: 36,
      label_count: None,
      mode: NonTerminalMode::Ordered,
    }
  }
}

#[derive(Debug, Clone)]
struct ChunkCell {
  label: Label,
  label_score: f64,
  total: f64,
  /// `None` for a chunk cell.
  split: Option<usize>,
}

impl ChunkCell {
  fn chunk(label: Label, label_score: f64) -> Self {
    Self {
      label,
      label_score,
      total: label_score,
      split: None,
    }
  }
}

impl fmt::Display for ChunkCell {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.split {
      None => write!(f, "chunk {} {:.4}", self.label, self.total),
      Some(p) => write!(f, "{} {:.4} (total {:.4}) split {}", self.label, self.label_score, self.total, p),
    }
  }
}

pub struct ChunkChartParser<'v> {
  vocab: &'v LabelVocab,
  config: ChunkParserConfig,
}

impl<'v> ChunkChartParser<'v> {
  /// Panics unless `config.margin` is positive.
  pub fn new(vocab: &'v LabelVocab, config: ChunkParserConfig) -> Self {
    assert!(config.margin > 0.0, "margin must be positive, got {}", config.margin);
    Self { vocab, config }
  }

  pub fn config(&self) -> &ChunkParserConfig {
    &self.config
  }

  fn label_count(&self) -> usize {
    let count = self
      .config
      .label_count
      .unwrap_or_else(|| self.vocab.base_label_count());
    assert!(
      count >= 1 && count < self.vocab.size(),
      "chunk label count {} does not fit a vocabulary of {}",
      count,
      self.vocab.size()
    );
    count
  }

  pub fn parse<S>(&self, sentence: &[String], scorer: &mut S) -> Parse
  where
    S: SpanScorer + ?Sized,
  {
    assert!(!sentence.is_empty(), "cannot parse an empty sentence");
    let mut scores = ScoreCache::new(scorer, self.vocab.size());
    let chart = self
      .fill_argmax(sentence.len(), &mut scores, None)
      .unwrap_or_else(|e| unreachable!("inference consults no gold labels: {}", e));
    finish(sentence, &chart)
  }

  pub fn train<S>(
    &self,
    sentence: &[String],
    scorer: &mut S,
    gold: &Gold,
    rng: &mut dyn RngCore,
  ) -> Result<TrainOutcome, ParseError>
  where
    S: SpanScorer + ?Sized,
  {
    assert!(!sentence.is_empty(), "cannot parse an empty sentence");
    check_gold(gold.tree, sentence.len())?;

    let mut scores = ScoreCache::new(scorer, self.vocab.size());
    let mut oracle = GoldOracle {
      tree: gold.tree,
      ctx: OracleContext::new(Labeling::new(self.vocab, self.config.mode), rng),
    };

    let chart = self.fill_argmax(sentence.len(), &mut scores, Some(&mut oracle))?;
    let Parse { tree, score } = finish(sentence, &chart);
    trace_chart("chunk argmax", &chart);

    let chart = self.fill_gold(sentence.len(), &mut scores, &mut oracle, gold)?;
    let Parse {
      tree: gold_tree,
      score: gold_score,
    } = finish(sentence, &chart);
    trace_chart("chunk gold", &chart);

    let correct = self.config.zero_cost && tree.convert().to_chunks() == gold.chunks;
    let loss = if correct { 0.0 } else { score - gold_score };
    debug!(score, gold_score, loss, correct, "chunk parser loss");

    Ok(TrainOutcome {
      tree,
      score,
      gold_tree,
      gold_score,
      loss,
    })
  }

  fn value(&self, idx: usize) -> Label {
    self.vocab.value(idx).cloned().unwrap_or_default()
  }

  fn fill_argmax<S>(
    &self,
    n: usize,
    scores: &mut ScoreCache<S>,
    mut oracle: Option<&mut GoldOracle>,
  ) -> Result<Chart<ChunkCell>, ParseError>
  where
    S: SpanScorer + ?Sized,
  {
    let label_count = self.label_count();
    let mut chart = Chart::new(n);

    for length in 1..=self.config.max_chunk_length.min(n) {
      for left in 0..=n - length {
        let right = left + length;
        let raw = scores.get(left, right);
        let idx = argmax_in(&raw, 1..label_count + 1);
        chart.set(left, right, ChunkCell::chunk(self.value(idx), raw[idx]));
      }
    }

    for length in 1..=n {
      for left in 0..=n - length {
        let right = left + length;
        let raw = scores.get(left, right);

        let (idx, label_score) = match oracle.as_mut() {
          Some(oracle) => {
            let oracle_idx = label_index(self.vocab, &oracle.label(left, right))?;
            let augmented = augment(&raw, oracle_idx, self.config.margin);
            let idx = argmax_label(&augmented, length == n);
            (idx, augmented[idx])
          }
          None => {
            let idx = argmax_label(&raw, length == n);
            (idx, raw[idx])
          }
        };

        let mut best: Option<(usize, f64)> = None;
        for p in left + 1..right {
          if let Some(value) = pair_total(&chart, left, p, right) {
            if best.is_none_or(|(_, best_value)| value > best_value) {
              best = Some((p, value));
            }
          }
        }
        let Some((p, value)) = best else {
          continue;
        };

        let total = label_score + value;
        if chart.get(left, right).is_none_or(|existing| existing.total < total) {
          chart.set(
            left,
            right,
            ChunkCell {
              label: self.value(idx),
              label_score,
              total,
              split: Some(p),
            },
          );
        }
      }
    }
    Ok(chart)
  }

  fn fill_gold<S>(
    &self,
    n: usize,
    scores: &mut ScoreCache<S>,
    oracle: &mut GoldOracle,
    gold: &Gold,
  ) -> Result<Chart<ChunkCell>, ParseError>
  where
    S: SpanScorer + ?Sized,
  {
    let mut chart = Chart::new(n);
    for chunk in gold.chunks {
      let label = Label::single(chunk.label.as_str());
      let idx = label_index(self.vocab, &label)?;
      let raw = scores.get(chunk.start, chunk.end);
      chart.set(chunk.start, chunk.end, ChunkCell::chunk(label, raw[idx]));
    }

    for length in 1..=n {
      for left in 0..=n - length {
        let right = left + length;
        if chart.has(left, right) {
          continue;
        }
        let raw = scores.get(left, right);
        let label = oracle.label(left, right);
        let label_score = raw[label_index(self.vocab, &label)?];

        let splits = oracle.splits2(left, right);
        let Some(p) = gold_split(&chart, &splits, left, right, gold.scope) else {
          continue;
        };
        let Some(value) = pair_total(&chart, left, p, right) else {
          continue;
        };

        chart.set(
          left,
          right,
          ChunkCell {
            label,
            label_score,
            total: label_score + value,
            split: Some(p),
          },
        );
      }
    }
    Ok(chart)
  }
}

/// Sum of both halves' totals, if both halves are in the chart.
fn pair_total(chart: &Chart<ChunkCell>, left: usize, p: usize, right: usize) -> Option<f64> {
  let lhs = chart.get(left, p)?;
  let rhs = chart.get(p, right)?;
  Some(lhs.total + rhs.total)
}

/// Inside the latent scope the best-scoring gold split wins; elsewhere the
/// earliest one does.
fn gold_split(chart: &Chart<ChunkCell>, splits: &[usize], left: usize, right: usize, scope: LatentScope) -> Option<usize> {
  if !scope.contains(left, right) {
    return splits.iter().copied().min();
  }

  let mut best: Option<(usize, f64)> = None;
  for &p in splits {
    let value = pair_total(chart, left, p, right).unwrap_or(f64::NEG_INFINITY);
    if best.is_none_or(|(_, best_value)| value > best_value) {
      best = Some((p, value));
    }
  }
  best.map(|(p, _)| p)
}

fn build(chart: &Chart<ChunkCell>, sentence: &[String], left: usize, right: usize) -> Vec<ParseNode> {
  let cell = chart.cell(left, right);
  let Some(p) = cell.split else {
    return vec![ParseNode::chunk_internal(cell.label.clone(), leaves(sentence, left, right))];
  };

  let mut children = build(chart, sentence, left, p);
  children.extend(build(chart, sentence, p, right));
  if cell.label.is_empty() {
    children
  } else {
    vec![ParseNode::internal(cell.label.clone(), children)]
  }
}

fn finish(sentence: &[String], chart: &Chart<ChunkCell>) -> Parse {
  let n = sentence.len();
  let tree = single_root(build(chart, sentence, 0, n));
  Parse {
    tree,
    score: chart.cell(0, n).total,
  }
}

#[cfg(test)]
mod tests {
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  use super::*;
  use crate::chunks::Chunk;
  use crate::latent::{BuilderConfig, LatentTreeBuilder};

  fn chars(s: &str) -> Vec<String> {
    s.chars().map(|c| c.to_string()).collect()
  }

  // [(), a, b, a', b']
  fn vocab() -> LabelVocab {
    LabelVocab::from_labels(&["a", "b"], NonTerminalMode::Ordered)
  }

  fn weak_pair(left: usize, right: usize) -> Vec<f64> {
    match (left, right) {
      (0, 1) => vec![0.0, -3.0, -5.0, -5.0, -5.0],
      (1, 2) => vec![0.0, -5.0, -3.0, -5.0, -5.0],
      _ => vec![0.0, 4.0, 0.0, 0.0, 0.0],
    }
  }

  #[test]
  fn test_merges_chunks() {
    let vocab = vocab();
    let parser = ChunkChartParser::new(&vocab, ChunkParserConfig::default());
    let mut scorer = |left: usize, right: usize| match (left, right) {
      (0, 1) => vec![0.0, 3.0, 0.0, 0.0, 0.0],
      (1, 2) => vec![0.0, 0.0, 3.0, 0.0, 0.0],
      _ => vec![0.0, 1.0, 0.0, 0.0, 2.0],
    };
    let parse = parser.parse(&chars("xy"), &mut scorer);
    assert_eq!(parse.tree.linearize(), "(b' (a (XX x)) (b (XX y)))");
    assert!(matches!(parse.tree.children()[0], ParseNode::ChunkInternal(_)));
    assert_eq!(parse.score, 8.0);
    assert_eq!(
      parse.chunks(),
      vec![Chunk::new("a", 0, 1, chars("x")), Chunk::new("b", 1, 2, chars("y"))]
    );
  }

  #[test]
  fn test_keeps_better_chunk() {
    let vocab = vocab();
    let parser = ChunkChartParser::new(&vocab, ChunkParserConfig::default());
    let parse = parser.parse(&chars("xy"), &mut weak_pair);
    assert_eq!(parse.tree.linearize(), "(a (XX x) (XX y))");
    assert_eq!(parse.score, 4.0);
  }

  #[test]
  fn test_max_chunk_length() {
    let vocab = vocab();
    let config = ChunkParserConfig {
      max_chunk_length: 1,
      ..Default::default()
    };
    let parser = ChunkChartParser::new(&vocab, config);
    let parse = parser.parse(&chars("xy"), &mut weak_pair);
    assert_eq!(parse.tree.linearize(), "(a (a (XX x)) (b (XX y)))");
    assert_eq!(parse.score, -2.0);
  }

  #[test]
  fn test_gold_pass_in_latent_region() {
    let vocab = vocab();
    let words = chars("xyz");
    let chunks = vec![
      Chunk::new("a", 0, 1, chars("x")),
      Chunk::new("b", 1, 2, chars("y")),
      Chunk::new("b", 2, 3, chars("z")),
    ];
    let mut rng = StdRng::seed_from_u64(0);
    let latent = LatentTreeBuilder::new(&vocab, &BuilderConfig::default())
      .unwrap()
      .build_dynamic_rbt_tree(&words, &chunks, &mut rng)
      .unwrap();
    let indexed = latent.indexed();
    let gold = Gold {
      tree: &indexed,
      chunks: &latent.chunks,
      scope: latent.scope,
    };

    let mut scorer = |left: usize, right: usize| match (left, right) {
      (1, 3) => vec![0.0, 0.0, 0.0, 2.0, 0.0],
      _ => vec![0.0; 5],
    };
    let parser = ChunkChartParser::new(&vocab, ChunkParserConfig::default());
    let outcome = parser.train(&words, &mut scorer, &gold, &mut rng).unwrap();
    assert_eq!(
      outcome.gold_tree.linearize(),
      "(a' (a (XX x)) (a' (b (XX y)) (b (XX z))))"
    );
    assert_eq!(outcome.gold_score, 2.0);
    assert!(outcome.loss >= 0.0);
  }

  #[test]
  fn test_zero_cost() {
    let vocab = vocab();
    let words = chars("xy");
    let chunks = vec![
      Chunk::new("a", 0, 1, chars("x")),
      Chunk::new("b", 1, 2, chars("y")),
    ];
    let mut rng = StdRng::seed_from_u64(0);
    let latent = LatentTreeBuilder::new(&vocab, &BuilderConfig::default())
      .unwrap()
      .build_dynamic_rbt_tree(&words, &chunks, &mut rng)
      .unwrap();
    let indexed = latent.indexed();
    let gold = Gold {
      tree: &indexed,
      chunks: &latent.chunks,
      scope: latent.scope,
    };
    let scorer = |left: usize, right: usize| match (left, right) {
      (0, 1) => vec![0.0, 5.0, 0.0, 0.0, 0.0],
      (1, 2) => vec![0.0, 0.0, 5.0, 0.0, 0.0],
      _ => vec![0.0, 0.0, 0.0, 0.0, 1.0],
    };

    let parser = ChunkChartParser::new(&vocab, ChunkParserConfig::default());
    let outcome = parser.train(&words, &mut scorer.clone(), &gold, &mut rng).unwrap();
    assert_eq!(outcome.score, 12.0);
    assert_eq!(outcome.gold_score, 10.0);
    assert_eq!(outcome.loss, 2.0);

    let config = ChunkParserConfig {
      zero_cost: true,
      ..Default::default()
    };
    let parser = ChunkChartParser::new(&vocab, config);
    let outcome = parser.train(&words, &mut scorer.clone(), &gold, &mut rng).unwrap();
    assert_eq!(outcome.loss, 0.0);
  }

  #[test]
  #[should_panic(expected = "margin must be positive")]
  fn test_rejects_negative_margin() {
    let vocab = vocab();
    ChunkChartParser::new(
      &vocab,
      ChunkParserConfig {
        margin: -1.0,
        ..Default::default()
      },
    );
  }
}
