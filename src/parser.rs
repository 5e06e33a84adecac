//! The chart parser: a CYK pass for the best tree, and a gold-constrained
//! pass that scores the oracle tree for the margin loss.
//!
//! Every span keeps one cell. Besides its own total, a cell doubles as a
//! "flat" entry: the span's leaves under its label alone, worth only the label
//! score. A split combines a flat side with an accumulated side, so right
//! branching reads `flat(left, p) + total(p, right)` and left branching
//! `total(left, p) + flat(p, right)`.

use std::fmt;

use rand::RngCore;
use tracing::debug;

use crate::chart::{Chart, ScoreCache, SpanScorer, argmax_label, augment, trace_chart};
use crate::chunks::Chunk;
use crate::error::ParseError;
use crate::labels::{Label, Labeling, NonTerminalMode, XX, is_non_terminal};
use crate::latent::LatentScope;
use crate::oracle::OracleContext;
use crate::parse_tree::ParseNode;
use crate::vocab::LabelVocab;

#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
  /// Added to every non-oracle label score in the training argmax pass.
  pub margin: f64,
  /// Zero loss whenever the predicted chunks match the gold chunks.
  pub zero_cost: bool,
  pub mode: NonTerminalMode,
}

impl Default for ParserConfig {
  fn default() -> Self {
    Self {
      margin: 1.0,
      zero_cost: false,
      mode: NonTerminalMode::Ordered,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branching {
  /// Flat left side, accumulated right side.
  Right,
  /// Accumulated left side, flat right side.
  Left,
}

#[derive(Debug, Clone)]
struct Cell {
  label: Label,
  label_score: f64,
  total: f64,
  split: Option<(usize, Branching)>,
}

impl fmt::Display for Cell {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {:.4} (total {:.4})", self.label, self.label_score, self.total)?;
    if let Some((p, branching)) = self.split {
      write!(f, " split {} {:?}", p, branching)?;
    }
    Ok(())
  }
}

/// Gold structure for one training sentence.
#[derive(Debug, Clone, Copy)]
pub struct Gold<'g> {
  pub tree: &'g ParseNode,
  pub chunks: &'g [Chunk],
  pub scope: LatentScope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parse {
  pub tree: ParseNode,
  pub score: f64,
}

impl Parse {
  pub fn chunks(&self) -> Vec<Chunk> {
    self.tree.convert().to_chunks()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
  /// Best tree under margin-augmented scores.
  pub tree: ParseNode,
  pub score: f64,
  pub gold_tree: ParseNode,
  pub gold_score: f64,
  pub loss: f64,
}

/// A gold tree together with the context its oracle queries need.
pub(crate) struct GoldOracle<'g, 'c> {
  pub tree: &'g ParseNode,
  pub ctx: OracleContext<'c>,
}

impl GoldOracle<'_, '_> {
  pub fn label(&mut self, left: usize, right: usize) -> Label {
    self.tree.oracle_label(left, right, &mut self.ctx)
  }

  pub fn splits(&mut self, left: usize, right: usize) -> Vec<usize> {
    self.tree.oracle_splits(left, right, &mut self.ctx)
  }

  pub fn splits2(&mut self, left: usize, right: usize) -> Vec<usize> {
    self.tree.oracle_splits2(left, right, &mut self.ctx)
  }
}

pub(crate) fn label_index(vocab: &LabelVocab, label: &Label) -> Result<usize, ParseError> {
  vocab
    .index(label)
    .ok_or_else(|| ParseError::UnknownLabel {
      label: label.clone(),
    })
}

pub(crate) fn check_gold(tree: &ParseNode, len: usize) -> Result<(), ParseError> {
  if tree.span() != (0, len) {
    return Err(ParseError::GoldLengthMismatch {
      gold: tree.right() - tree.left(),
      len,
    });
  }
  Ok(())
}

pub(crate) fn leaves(sentence: &[String], left: usize, right: usize) -> Vec<ParseNode> {
  (left..right)
    .map(|i| ParseNode::leaf(i, XX, sentence[i].as_str()))
    .collect()
}

/// Unwraps the single node a finished chart yields for the whole sentence.
pub(crate) fn single_root(mut nodes: Vec<ParseNode>) -> ParseNode {
  match nodes.pop() {
    Some(root) if nodes.is_empty() => root,
    _ => panic!("sentence span did not resolve to a single labeled node"),
  }
}

pub struct ChartParser<'v> {
  vocab: &'v LabelVocab,
  config: ParserConfig,
}

impl<'v> ChartParser<'v> {
  /// Panics unless `config.margin` is positive.
  pub fn new(vocab: &'v LabelVocab, config: ParserConfig) -> Self {
    assert!(config.margin > 0.0, "margin must be positive, got {}", config.margin);
    Self { vocab, config }
  }

  pub fn config(&self) -> &ParserConfig {
    &self.config
  }

  /// Best tree for `sentence`.
  pub fn parse<S>(&self, sentence: &[String], scorer: &mut S) -> Parse
  where
    S: SpanScorer + ?Sized,
  {
    assert!(!sentence.is_empty(), "cannot parse an empty sentence");
    let mut scores = ScoreCache::new(scorer, self.vocab.size());
    let chart = self
      .fill_argmax(sentence.len(), &mut scores, None)
      .unwrap_or_else(|e| unreachable!("inference consults no gold labels: {}", e));
    self.finish(sentence, &chart)
  }

  /// Runs the augmented argmax pass and the gold pass over one sentence and
  /// returns the structured hinge loss between them.
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
    let Parse { tree, score } = self.finish(sentence, &chart);
    trace_chart("argmax", &chart);

    let chart = self.fill_gold(sentence.len(), &mut scores, &mut oracle, gold.scope)?;
    let Parse {
      tree: gold_tree,
      score: gold_score,
    } = self.finish(sentence, &chart);
    trace_chart("gold", &chart);

    let correct = self.config.zero_cost && tree.convert().to_chunks() == gold.chunks;
    let loss = if correct { 0.0 } else { score - gold_score };
    debug!(score, gold_score, loss, correct, "chart parser loss");

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
  ) -> Result<Chart<Cell>, ParseError>
  where
    S: SpanScorer + ?Sized,
  {
    let mut chart = Chart::new(n);
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
        let label = self.value(idx);

        if length == 1 {
          chart.set(left, right, leaf_cell(label, label_score));
          continue;
        }

        let candidates = (left + 1..right)
          .map(|p| (p, Branching::Right))
          .chain((left + 1..right).map(|p| (p, Branching::Left)));
        chart.set(left, right, combine(&chart, left, right, label, label_score, candidates));
      }
    }
    Ok(chart)
  }

  fn fill_gold<S>(
    &self,
    n: usize,
    scores: &mut ScoreCache<S>,
    oracle: &mut GoldOracle,
    scope: LatentScope,
  ) -> Result<Chart<Cell>, ParseError>
  where
    S: SpanScorer + ?Sized,
  {
    let mut chart = Chart::new(n);
    for length in 1..=n {
      for left in 0..=n - length {
        let right = left + length;
        let raw = scores.get(left, right);

        let oracle_label = oracle.label(left, right);
        let oracle_idx = label_index(self.vocab, &oracle_label)?;
        let (label, label_score) = if self.config.mode == NonTerminalMode::OrderedArgmaxGold {
          let idx = argmax_label(&raw, length == n);
          (self.value(idx), raw[idx])
        } else {
          (oracle_label, raw[oracle_idx])
        };

        if length == 1 {
          chart.set(left, right, leaf_cell(label, label_score));
          continue;
        }

        let splits = oracle.splits(left, right);
        let (Some(&first), Some(&last)) = (splits.first(), splits.last()) else {
          return Err(ParseError::NoGoldSplit { left, right });
        };
        // inside the latent region the gold tree only fixes the chunks, so
        // let the scores choose between the two extreme branchings
        let candidates = if label.is_synthetic() && scope.contains(left, right) {
          vec![(first, Branching::Right), (last, Branching::Left)]
        } else {
          vec![(first, Branching::Right)]
        };
        chart.set(left, right, combine(&chart, left, right, label, label_score, candidates));
      }
    }
    Ok(chart)
  }

  fn finish(&self, sentence: &[String], chart: &Chart<Cell>) -> Parse {
    let n = sentence.len();
    let tree = single_root(build(chart, sentence, 0, n));
    Parse {
      tree,
      score: chart.cell(0, n).total,
    }
  }
}

fn leaf_cell(label: Label, label_score: f64) -> Cell {
  Cell {
    label,
    label_score,
    total: label_score,
    split: None,
  }
}

fn split_value(chart: &Chart<Cell>, left: usize, right: usize, p: usize, branching: Branching) -> f64 {
  match branching {
    Branching::Right => chart.cell(left, p).label_score + chart.cell(p, right).total,
    Branching::Left => chart.cell(left, p).total + chart.cell(p, right).label_score,
  }
}

/// Cell for `[left, right)` using the first best of `candidates`.
fn combine<I>(chart: &Chart<Cell>, left: usize, right: usize, label: Label, label_score: f64, candidates: I) -> Cell
where
  I: IntoIterator<Item = (usize, Branching)>,
{
  let mut best: Option<(usize, Branching, f64)> = None;
  for (p, branching) in candidates {
    let value = split_value(chart, left, right, p, branching);
    if best.is_none_or(|(_, _, best_value)| value > best_value) {
      best = Some((p, branching, value));
    }
  }
  let Some((p, branching, value)) = best else {
    panic!("no split candidates for {}..{}", left, right);
  };
  Cell {
    label,
    label_score,
    total: label_score + value,
    split: Some((p, branching)),
  }
}

/// The span's leaves under its own label. Primed labels stay off multi-symbol
/// flat entries.
fn flat(chart: &Chart<Cell>, sentence: &[String], left: usize, right: usize) -> Vec<ParseNode> {
  let cell = chart.cell(left, right);
  let leaves = leaves(sentence, left, right);
  let wrap = match cell.label.first() {
    None => false,
    Some(tag) => right - left == 1 || !is_non_terminal(tag),
  };
  if wrap {
    vec![ParseNode::internal(cell.label.clone(), leaves)]
  } else {
    leaves
  }
}

fn build(chart: &Chart<Cell>, sentence: &[String], left: usize, right: usize) -> Vec<ParseNode> {
  let cell = chart.cell(left, right);
  let children = match cell.split {
    None => leaves(sentence, left, right),
    Some((p, Branching::Right)) => {
      let mut children = flat(chart, sentence, left, p);
      children.extend(build(chart, sentence, p, right));
      children
    }
    Some((p, Branching::Left)) => {
      let mut children = build(chart, sentence, left, p);
      children.extend(flat(chart, sentence, p, right));
      children
    }
  };

  if cell.label.is_empty() {
    children
  } else {
    vec![ParseNode::internal(cell.label.clone(), children)]
  }
}

#[cfg(test)]
mod tests {
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  use super::*;
  use crate::labels::RbtBoundary;
  use crate::latent::{BuilderConfig, LatentTreeBuilder};

  fn chars(s: &str) -> Vec<String> {
    s.chars().map(|c| c.to_string()).collect()
  }

  // [(), a, b, a', b']
  fn vocab() -> LabelVocab {
    LabelVocab::from_labels(&["a", "b"], NonTerminalMode::Ordered)
  }

  fn pair_scorer(top: [f64; 5]) -> impl FnMut(usize, usize) -> Vec<f64> {
    move |left, right| match (left, right) {
      (0, 1) => vec![0.0, 0.0, 2.0, 0.0, 0.0],
      (1, 2) => vec![0.0, 1.0, 0.0, 0.0, 0.0],
      _ => top.to_vec(),
    }
  }

  fn pair_gold() -> (ParseNode, Vec<Chunk>) {
    let tree = ParseNode::internal(
      Label::single("a'"),
      vec![
        ParseNode::internal(Label::single("b"), vec![ParseNode::leaf(0, XX, "x")]),
        ParseNode::internal(Label::single("a"), vec![ParseNode::leaf(1, XX, "y")]),
      ],
    );
    let chunks = vec![
      Chunk::new("b", 0, 1, chars("x")),
      Chunk::new("a", 1, 2, chars("y")),
    ];
    (tree, chunks)
  }

  #[test]
  fn test_flat_scores_give_flat_tree() {
    let vocab = vocab();
    let parser = ChartParser::new(&vocab, ParserConfig::default());
    let mut scorer = |_: usize, _: usize| vec![0.0; 5];
    let parse = parser.parse(&chars("xyz"), &mut scorer);
    assert_eq!(parse.tree.linearize(), "(a (XX x) (XX y) (XX z))");
    assert_eq!(parse.score, 0.0);
  }

  #[test]
  fn test_parse_picks_labels() {
    let vocab = vocab();
    let parser = ChartParser::new(&vocab, ParserConfig::default());
    let parse = parser.parse(&chars("xy"), &mut pair_scorer([0.0, 0.0, 0.0, 0.5, 0.0]));
    assert_eq!(parse.tree.linearize(), "(a' (b (XX x)) (a (XX y)))");
    assert_eq!(parse.score, 3.5);
    assert_eq!(
      parse.chunks(),
      vec![Chunk::new("b", 0, 1, chars("x")), Chunk::new("a", 1, 2, chars("y"))]
    );
  }

  #[test]
  fn test_margin_loss() {
    let vocab = vocab();
    let parser = ChartParser::new(&vocab, ParserConfig::default());
    let (tree, chunks) = pair_gold();
    let gold = Gold {
      tree: &tree,
      chunks: &chunks,
      scope: LatentScope::default(),
    };

    let mut rng = StdRng::seed_from_u64(0);
    let outcome = parser
      .train(&chars("xy"), &mut pair_scorer([0.0, 0.0, 0.0, 0.5, 0.0]), &gold, &mut rng)
      .unwrap();
    assert_eq!(outcome.gold_tree, tree);
    assert_eq!(outcome.gold_score, 3.5);
    // the margin pulls (1, 2) to the empty label and the top to `a`
    assert_eq!(outcome.tree.linearize(), "(a (b (XX x)) (XX y))");
    assert_eq!(outcome.score, 4.0);
    assert_eq!(outcome.loss, 0.5);
  }

  #[test]
  fn test_zero_cost() {
    let vocab = vocab();
    let (tree, chunks) = pair_gold();
    let gold = Gold {
      tree: &tree,
      chunks: &chunks,
      scope: LatentScope::default(),
    };
    let scorer = |left: usize, right: usize| match (left, right) {
      (0, 1) => vec![0.0, 0.0, 5.0, 0.0, 0.0],
      (1, 2) => vec![0.0, 5.0, 0.0, 0.0, 0.0],
      _ => vec![0.0, 0.0, 0.0, 0.0, 3.0],
    };
    let mut rng = StdRng::seed_from_u64(0);

    let parser = ChartParser::new(&vocab, ParserConfig::default());
    let outcome = parser.train(&chars("xy"), &mut scorer.clone(), &gold, &mut rng).unwrap();
    assert_eq!(outcome.tree.linearize(), "(b' (b (XX x)) (a (XX y)))");
    assert_eq!(outcome.loss, 4.0);

    let config = ParserConfig {
      zero_cost: true,
      ..Default::default()
    };
    let parser = ChartParser::new(&vocab, config);
    let outcome = parser.train(&chars("xy"), &mut scorer.clone(), &gold, &mut rng).unwrap();
    assert_eq!(outcome.loss, 0.0);
  }

  #[test]
  fn test_latent_region_picks_branching() {
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
    assert_eq!(latent.scope, LatentScope::new(0, 3));
    let indexed = latent.indexed();
    let gold = Gold {
      tree: &indexed,
      chunks: &latent.chunks,
      scope: latent.scope,
    };

    let mut scorer = |left: usize, right: usize| match (left, right) {
      (0, 1) => vec![0.0, 1.0, 0.0, 0.0, 0.0],
      (1, 2) | (2, 3) => vec![0.0, 0.0, 1.0, 0.0, 0.0],
      (0, 2) => vec![0.0, 0.0, 0.0, 5.0, 0.0],
      _ => vec![0.0; 5],
    };
    let parser = ChartParser::new(&vocab, ParserConfig::default());
    let outcome = parser.train(&words, &mut scorer, &gold, &mut rng).unwrap();
    assert_eq!(
      outcome.gold_tree.linearize(),
      "(a' (a' (a (XX x)) (b (XX y))) (b (XX z)))"
    );
    assert_eq!(outcome.gold_score, 8.0);
    assert!(outcome.loss >= 0.0);

    // without a latent scope the gold tree is followed as built
    let config = BuilderConfig {
      boundary: RbtBoundary::None,
      mode: NonTerminalMode::Ordered,
    };
    let latent = LatentTreeBuilder::new(&vocab, &config)
      .unwrap()
      .build_dynamic_rbt_tree(&words, &chunks, &mut rng)
      .unwrap();
    let indexed = latent.indexed();
    let gold = Gold {
      tree: &indexed,
      chunks: &latent.chunks,
      scope: latent.scope,
    };
    let outcome = parser.train(&words, &mut scorer, &gold, &mut rng).unwrap();
    assert_eq!(outcome.gold_tree, indexed);
  }

  #[test]
  fn test_empty_region_picks_branching() {
    // [(), a, b, <ept>]
    let vocab = LabelVocab::from_labels(&["a", "b"], NonTerminalMode::Empty);
    let words = chars("xyz");
    let chunks = vec![
      Chunk::new("a", 0, 1, chars("x")),
      Chunk::new("b", 1, 2, chars("y")),
      Chunk::new("b", 2, 3, chars("z")),
    ];
    let config = BuilderConfig {
      boundary: RbtBoundary::Start,
      mode: NonTerminalMode::Empty,
    };
    let mut rng = StdRng::seed_from_u64(0);
    let latent = LatentTreeBuilder::new(&vocab, &config)
      .unwrap()
      .build_dynamic_rbt_tree(&words, &chunks, &mut rng)
      .unwrap();
    assert_eq!(latent.scope, LatentScope::new(0, 3));
    let indexed = latent.indexed();
    let gold = Gold {
      tree: &indexed,
      chunks: &latent.chunks,
      scope: latent.scope,
    };

    let mut scorer = |left: usize, right: usize| match (left, right) {
      (0, 1) => vec![0.0, 1.0, 0.0, 0.0],
      (1, 2) | (2, 3) => vec![0.0, 0.0, 1.0, 0.0],
      (0, 2) => vec![0.0, 0.0, 0.0, 5.0],
      _ => vec![0.0; 4],
    };
    let parser = ChartParser::new(
      &vocab,
      ParserConfig {
        mode: NonTerminalMode::Empty,
        ..Default::default()
      },
    );
    let outcome = parser.train(&words, &mut scorer, &gold, &mut rng).unwrap();
    assert_eq!(
      outcome.gold_tree.linearize(),
      "(<ept> (<ept> (a (XX x)) (b (XX y))) (b (XX z)))"
    );
    assert_eq!(outcome.gold_score, 8.0);
    assert_eq!(outcome.gold_tree.convert().to_chunks(), chunks);
    assert!(outcome.loss >= 0.0);
  }

  #[test]
  #[should_panic(expected = "margin must be positive")]
  fn test_rejects_zero_margin() {
    let vocab = vocab();
    ChartParser::new(
      &vocab,
      ParserConfig {
        margin: 0.0,
        ..Default::default()
      },
    );
  }

  #[test]
  fn test_gold_errors() {
    let vocab = vocab();
    let parser = ChartParser::new(&vocab, ParserConfig::default());
    let (tree, chunks) = pair_gold();
    let gold = Gold {
      tree: &tree,
      chunks: &chunks,
      scope: LatentScope::default(),
    };
    let mut scorer = |_: usize, _: usize| vec![0.0; 5];
    let mut rng = StdRng::seed_from_u64(0);
    assert_eq!(
      parser.train(&chars("xyz"), &mut scorer, &gold, &mut rng),
      Err(ParseError::GoldLengthMismatch { gold: 2, len: 3 })
    );

    let unknown = ParseNode::internal(Label::single("zz"), vec![ParseNode::leaf(0, XX, "x")]);
    let gold = Gold {
      tree: &unknown,
      chunks: &[],
      scope: LatentScope::default(),
    };
    assert_eq!(
      parser.train(&chars("x"), &mut scorer, &gold, &mut rng),
      Err(ParseError::UnknownLabel {
        label: Label::single("zz")
      })
    );
  }
}
