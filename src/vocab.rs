use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::path::Path;

use crate::labels::{EMPTY, Label, NonTerminalMode, is_non_terminal, to_non_terminal};
use crate::utils::Err;

/// Dense two-way mapping between values and indices. Frozen vocabularies
/// reject new values.
#[derive(Debug, Clone)]
pub struct Vocabulary<T> {
  values: Vec<T>,
  indices: HashMap<T, usize>,
  frozen: bool,
}

impl<T> Default for Vocabulary<T> {
  fn default() -> Self {
    Self {
      values: Vec::new(),
      indices: HashMap::new(),
      frozen: false,
    }
  }
}

impl<T> Vocabulary<T>
where
  T: Clone + Eq + Hash,
{
  pub fn new() -> Self {
    Default::default()
  }

  /// Index of `value`, registering it first if needed.
  pub fn add(&mut self, value: T) -> usize {
    if let Some(&idx) = self.indices.get(&value) {
      return idx;
    }
    assert!(!self.frozen, "tried to add to a frozen vocabulary");
    let idx = self.values.len();
    self.indices.insert(value.clone(), idx);
    self.values.push(value);
    idx
  }

  pub fn index(&self, value: &T) -> Option<usize> {
    self.indices.get(value).copied()
  }

  pub fn value(&self, idx: usize) -> Option<&T> {
    self.values.get(idx)
  }

  pub fn values(&self) -> &[T] {
    &self.values
  }

  pub fn size(&self) -> usize {
    self.values.len()
  }

  pub fn freeze(&mut self) {
    self.frozen = true;
  }

  pub fn is_frozen(&self) -> bool {
    self.frozen
  }
}

pub type LabelVocab = Vocabulary<Label>;

impl LabelVocab {
  /// Builds the frozen label vocabulary: the empty label at index 0, then the
  /// base labels, then either their primed forms or the single [`EMPTY`]
  /// label, depending on `mode`.
  pub fn from_labels<S: AsRef<str>>(labels: &[S], mode: NonTerminalMode) -> Self {
    let mut vocab = Self::new();
    vocab.add(Label::empty());
    for tag in labels {
      vocab.add(Label::single(tag.as_ref()));
    }
    if mode == NonTerminalMode::Empty {
      vocab.add(Label::single(EMPTY));
    } else {
      for tag in labels {
        vocab.add(Label::single(to_non_terminal(tag.as_ref())));
      }
    }
    vocab.freeze();
    vocab
  }

  /// Reads a label list, one label per line, and builds the vocabulary from it.
  pub fn read_from_file(path: impl AsRef<Path>, mode: NonTerminalMode) -> Result<Self, Err> {
    let labels = load_label_list(path)?;
    Ok(Self::from_labels(&labels, mode))
  }

  /// Number of single-tag labels that are genuine chunk labels.
  pub fn base_label_count(&self) -> usize {
    self
      .values
      .iter()
      .filter(|label| {
        label.len() == 1 && label.first().is_some_and(|tag| !is_non_terminal(tag) && tag != EMPTY)
      })
      .count()
  }
}

pub fn load_label_list(path: impl AsRef<Path>) -> Result<Vec<String>, Err> {
  let path = path.as_ref();
  let contents = fs::read_to_string(path)
    .map_err(|e| -> Err { format!("label list {}: {}", path.display(), e).into() })?;
  Ok(
    contents
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect(),
  )
}
