//! Labels and the order used to pick parent labels.
//!
//! A [`Label`] is a chain of unary tags collapsed into one node, outermost tag
//! first. A tag ending in `'` marks a synthetic node built over a genuine chunk
//! label.

use std::fmt;

use rand::Rng;

use crate::error::ChunkError;
use crate::vocab::LabelVocab;

/// Label of synthetic nodes when non-terminals carry no information.
pub const EMPTY: &str = "<ept>";
/// Tag given to every leaf.
pub const XX: &str = "XX";
/// Chunk label that acts as the pivot of the randomized builder.
pub const PIVOT: &str = "poi";
/// Chunks whose label starts with this never decide a parent label.
pub const ASSIST: &str = "assist";
/// Like [`ASSIST`], and takes priority over it.
pub const REDUNDANT: &str = "redundant";

const NON_TERMINAL_MARK: char = '\'';

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(Vec<String>);

impl Label {
  /// The "no constituent" label.
  pub fn empty() -> Self {
    Self(Vec::new())
  }

  pub fn new(tags: Vec<String>) -> Self {
    Self(tags)
  }

  pub fn single(tag: impl Into<String>) -> Self {
    Self(vec![tag.into()])
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn tags(&self) -> &[String] {
    &self.0
  }

  pub fn first(&self) -> Option<&str> {
    self.0.first().map(String::as_str)
  }

  pub fn last(&self) -> Option<&str> {
    self.0.last().map(String::as_str)
  }

  /// Whether the outermost tag marks a synthetic node: primed, or [`EMPTY`].
  pub fn is_synthetic(&self) -> bool {
    self
      .first()
      .is_some_and(|tag| is_non_terminal(tag) || tag == EMPTY)
  }
}

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({})", self.0.join(" "))
  }
}

impl From<&str> for Label {
  fn from(tag: &str) -> Self {
    Self::single(tag)
  }
}

pub fn is_non_terminal(tag: &str) -> bool {
  tag.ends_with(NON_TERMINAL_MARK)
}

pub fn to_non_terminal(tag: &str) -> String {
  if is_non_terminal(tag) {
    tag.to_string()
  } else {
    format!("{}{}", tag, NON_TERMINAL_MARK)
  }
}

pub fn to_terminal(tag: &str) -> &str {
  tag.strip_suffix(NON_TERMINAL_MARK).unwrap_or(tag)
}

/// Total preference order over tags, read off a frozen label vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct LabelOrder<'v> {
  vocab: &'v LabelVocab,
}

impl<'v> LabelOrder<'v> {
  pub fn new(vocab: &'v LabelVocab) -> Self {
    Self { vocab }
  }

  pub fn vocab(&self) -> &'v LabelVocab {
    self.vocab
  }

  /// `size - index` of the terminal form of `tag`; tags outside the
  /// vocabulary get -1, below every registered tag.
  pub fn order(&self, tag: &str) -> i64 {
    let label = Label::single(to_terminal(tag));
    match self.vocab.index(&label) {
      Some(idx) => self.vocab.size() as i64 - idx as i64,
      None => -1,
    }
  }

  pub fn contains(&self, tag: &str) -> bool {
    self.vocab.index(&Label::single(to_terminal(tag))).is_some()
  }

  /// Label of the node built over two siblings.
  ///
  /// [`REDUNDANT`] children defer to the other child, then [`ASSIST`] children
  /// do; otherwise the child with the higher order wins, `child1` on ties.
  pub fn parent_label(&self, child1: &str, child2: &str) -> String {
    for marker in [REDUNDANT, ASSIST] {
      match (child1.starts_with(marker), child2.starts_with(marker)) {
        (true, true) => return to_non_terminal(marker),
        (true, false) => return to_non_terminal(child2),
        (false, true) => return to_non_terminal(child1),
        (false, false) => {}
      }
    }

    if self.order(child1) >= self.order(child2) {
      to_non_terminal(child1)
    } else {
      to_non_terminal(child2)
    }
  }

  /// The highest-ordered tag, the first one on ties.
  pub fn dominant<'a, I>(&self, tags: I) -> Option<&'a str>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let mut best: Option<(&'a str, i64)> = None;
    for tag in tags {
      let order = self.order(tag);
      if best.is_none_or(|(_, best_order)| order > best_order) {
        best = Some((tag, order));
      }
    }
    best.map(|(tag, _)| tag)
  }
}

/// Where pivot merging stops and where the latent region begins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RbtBoundary {
  /// Never merge around the pivot; no chunk is latent-worthy.
  None,
  /// Every chunk is below the threshold.
  #[default]
  Start,
  /// Chunks ordered below this label are below the threshold.
  Label(String),
}

impl RbtBoundary {
  /// Fails on a boundary label outside the vocabulary, whose order would
  /// otherwise collide with [`RbtBoundary::None`].
  pub fn threshold(&self, order: &LabelOrder) -> Result<i64, ChunkError> {
    match self {
      Self::None => Ok(-1),
      Self::Start => Ok(order.vocab().size() as i64 + 1),
      Self::Label(tag) if order.contains(tag) => Ok(order.order(tag)),
      Self::Label(tag) => Err(ChunkError::UnknownLabel { label: tag.clone() }),
    }
  }
}

impl std::str::FromStr for RbtBoundary {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "none" => Self::None,
      "start" => Self::Start,
      tag => Self::Label(tag.to_string()),
    })
  }
}

/// How synthetic nodes are labeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonTerminalMode {
  /// The dominant child label, primed.
  #[default]
  Ordered,
  /// Always [`EMPTY`].
  Empty,
  /// A uniformly drawn primed label.
  Random,
  /// As `Ordered`, but the gold chart pass keeps the argmax label.
  OrderedArgmaxGold,
}

impl NonTerminalMode {
  /// Numeric style as used on the command line: 0, 1, 2 or 3.
  pub fn from_style(style: u8) -> Option<Self> {
    match style {
      0 => Some(Self::Ordered),
      1 => Some(Self::Empty),
      2 => Some(Self::Random),
      3 => Some(Self::OrderedArgmaxGold),
      _ => None,
    }
  }

  pub fn is_ordered(self) -> bool {
    matches!(self, Self::Ordered | Self::OrderedArgmaxGold)
  }
}

/// Label order plus the rule for naming synthetic nodes.
#[derive(Debug, Clone, Copy)]
pub struct Labeling<'v> {
  order: LabelOrder<'v>,
  mode: NonTerminalMode,
  label_count: usize,
}

impl<'v> Labeling<'v> {
  pub fn new(vocab: &'v LabelVocab, mode: NonTerminalMode) -> Self {
    Self {
      order: LabelOrder::new(vocab),
      mode,
      label_count: vocab.base_label_count(),
    }
  }

  pub fn order(&self) -> &LabelOrder<'v> {
    &self.order
  }

  pub fn mode(&self) -> NonTerminalMode {
    self.mode
  }

  /// Number of genuine chunk labels in the vocabulary.
  pub fn label_count(&self) -> usize {
    self.label_count
  }

  /// Label of a node covering chunks labeled `tags`. `current` is what
  /// [`NonTerminalMode::Empty`] keeps.
  pub fn region_label<'a, I, R>(&self, tags: I, current: &str, rng: &mut R) -> String
  where
    I: IntoIterator<Item = &'a str>,
    R: Rng + ?Sized,
  {
    match self.mode {
      NonTerminalMode::Ordered | NonTerminalMode::OrderedArgmaxGold => self
        .order
        .dominant(tags)
        .map(to_non_terminal)
        .unwrap_or_else(|| EMPTY.to_string()),
      NonTerminalMode::Empty => current.to_string(),
      NonTerminalMode::Random => self.random_label(rng),
    }
  }

  /// Label of the parent of two siblings of a right-branching chain.
  pub fn chain_label<R>(&self, child1: &str, child2: &str, rng: &mut R) -> String
  where
    R: Rng + ?Sized,
  {
    match self.mode {
      NonTerminalMode::Ordered | NonTerminalMode::OrderedArgmaxGold => {
        self.order.parent_label(child1, child2)
      }
      NonTerminalMode::Empty => EMPTY.to_string(),
      NonTerminalMode::Random => self.random_label(rng),
    }
  }

  /// Draws from the primed labels, which follow the base labels in the
  /// vocabulary.
  pub fn random_label<R>(&self, rng: &mut R) -> String
  where
    R: Rng + ?Sized,
  {
    if self.label_count == 0 {
      return EMPTY.to_string();
    }
    let idx = rng.gen_range(self.label_count + 1..=2 * self.label_count);
    self
      .order
      .vocab()
      .value(idx)
      .and_then(Label::last)
      .filter(|tag| is_non_terminal(tag))
      .map(str::to_string)
      .unwrap_or_else(|| EMPTY.to_string())
  }
}
