//! Pieces shared by both chart parsers: the scorer seam, the per-sentence
//! score memo, the span-indexed chart and the label argmax.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

/// Per-label scores for a span. Index 0 stands for the empty label; the rest
/// follow the label vocabulary.
pub trait SpanScorer {
  fn score(&mut self, left: usize, right: usize) -> Vec<f64>;
}

impl<F> SpanScorer for F
where
  F: FnMut(usize, usize) -> Vec<f64>,
{
  fn score(&mut self, left: usize, right: usize) -> Vec<f64> {
    self(left, right)
  }
}

/// Memoizes a scorer for one sentence. Never reuse it for another sentence.
pub struct ScoreCache<'s, S: ?Sized> {
  scorer: &'s mut S,
  width: usize,
  scores: HashMap<(usize, usize), Rc<[f64]>>,
}

impl<'s, S> ScoreCache<'s, S>
where
  S: SpanScorer + ?Sized,
{
  /// `width` is the label vocabulary size every score vector must match.
  pub fn new(scorer: &'s mut S, width: usize) -> Self {
    Self {
      scorer,
      width,
      scores: HashMap::new(),
    }
  }

  pub fn get(&mut self, left: usize, right: usize) -> Rc<[f64]> {
    let width = self.width;
    self
      .scores
      .entry((left, right))
      .or_insert_with(|| {
        let scores = self.scorer.score(left, right);
        assert_eq!(
          scores.len(),
          width,
          "scorer returned {} scores for {}..{}, expected one per label",
          scores.len(),
          left,
          right
        );
        scores.into()
      })
      .clone()
  }

  /// Number of distinct spans scored so far.
  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }
}

/// Cells keyed by span `[left, right)` over a sentence of `n` symbols.
#[derive(Debug, Clone)]
pub struct Chart<T> {
  n: usize,
  cells: Vec<Option<T>>,
}

impl<T> Chart<T> {
  pub fn new(n: usize) -> Self {
    let mut cells = Vec::new();
    cells.resize_with((n + 1) * (n + 1), || None);
    Self { n, cells }
  }

  /// Sentence length.
  pub fn len(&self) -> usize {
    self.n
  }

  pub fn is_empty(&self) -> bool {
    self.n == 0
  }

  fn slot(&self, left: usize, right: usize) -> usize {
    assert!(
      left < right && right <= self.n,
      "span {}..{} out of chart of length {}",
      left,
      right,
      self.n
    );
    left * (self.n + 1) + right
  }

  pub fn get(&self, left: usize, right: usize) -> Option<&T> {
    self.cells[self.slot(left, right)].as_ref()
  }

  pub fn has(&self, left: usize, right: usize) -> bool {
    self.get(left, right).is_some()
  }

  pub fn set(&mut self, left: usize, right: usize, cell: T) {
    let slot = self.slot(left, right);
    self.cells[slot] = Some(cell);
  }

  /// Panics on a missing cell; the passes only look up spans they filled.
  pub fn cell(&self, left: usize, right: usize) -> &T {
    self
      .get(left, right)
      .unwrap_or_else(|| panic!("chart has no entry for {}..{}", left, right))
  }

  /// Filled spans, shortest first.
  pub fn spans(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
    (1..=self.n).flat_map(move |length| {
      (0..=self.n - length)
        .map(move |left| (left, left + length))
        .filter(move |&(left, right)| self.has(left, right))
    })
  }
}

impl<T: fmt::Display> fmt::Display for Chart<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (left, right) in self.spans() {
      writeln!(f, "{}..{}: {}", left, right, self.cell(left, right))?;
    }
    Ok(())
  }
}

/// Index of the first maximum within `range` of `scores`.
pub fn argmax_in(scores: &[f64], range: std::ops::Range<usize>) -> usize {
  assert!(range.start < range.end && range.end <= scores.len(), "empty argmax range");
  let mut best = range.start;
  for idx in range {
    if scores[idx] > scores[best] {
      best = idx;
    }
  }
  best
}

/// Best label index for a span. The span covering the whole sentence may not
/// take the empty label.
pub fn argmax_label(scores: &[f64], is_top: bool) -> usize {
  let start = if is_top { 1 } else { 0 };
  argmax_in(scores, start..scores.len())
}

/// Adds `margin` to every score but the oracle's.
pub fn augment(scores: &[f64], oracle: usize, margin: f64) -> Vec<f64> {
  scores
    .iter()
    .enumerate()
    .map(|(idx, &s)| if idx == oracle { s } else { s + margin })
    .collect()
}

/// Logs a finished chart at trace level.
pub(crate) fn trace_chart<T: fmt::Display>(pass: &str, chart: &Chart<T>) {
  trace!(pass, chart = %chart, "chart filled");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_argmax_prefers_first() {
    assert_eq!(argmax_in(&[1.0, 3.0, 3.0, 2.0], 0..4), 1);
    assert_eq!(argmax_label(&[5.0, 3.0, 3.0], false), 0);
    assert_eq!(argmax_label(&[5.0, 3.0, 3.0], true), 1);
    assert_eq!(argmax_in(&[9.0, 1.0, 2.0, 9.0], 1..3), 2);
  }

  #[test]
  fn test_augment() {
    assert_eq!(augment(&[0.0, 1.0, 2.0], 1, 1.0), vec![1.0, 1.0, 3.0]);
  }

  #[test]
  fn test_score_cache_memoizes() {
    let mut calls = 0;
    let mut scorer = |left: usize, right: usize| {
      calls += 1;
      vec![0.0, (right - left) as f64]
    };
    let mut cache = ScoreCache::new(&mut scorer, 2);
    assert_eq!(&cache.get(0, 2)[..], &[0.0, 2.0]);
    assert_eq!(&cache.get(0, 2)[..], &[0.0, 2.0]);
    assert_eq!(&cache.get(1, 2)[..], &[0.0, 1.0]);
    assert_eq!(cache.len(), 2);
    drop(cache);
    assert_eq!(calls, 2);
  }

  #[test]
  #[should_panic(expected = "expected one per label")]
  fn test_score_cache_checks_width() {
    let mut scorer = |_: usize, _: usize| vec![0.0];
    ScoreCache::new(&mut scorer, 3).get(0, 1);
  }

  #[test]
  fn test_chart_cells() {
    let mut chart = Chart::new(3);
    chart.set(0, 1, "a");
    chart.set(1, 3, "b");
    chart.set(0, 3, "c");
    assert!(chart.has(1, 3));
    assert!(!chart.has(0, 2));
    assert_eq!(chart.spans().collect::<Vec<_>>(), vec![(0, 1), (1, 3), (0, 3)]);
    assert_eq!(chart.to_string(), "0..1: a\n1..3: b\n0..3: c\n");
  }

  #[test]
  #[should_panic(expected = "no entry")]
  fn test_chart_missing_cell() {
    Chart::<u8>::new(2).cell(0, 2);
  }
}
