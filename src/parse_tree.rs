//! Indexed (span-based) trees, used as gold structure and built by the chart
//! parsers.

use std::fmt;

use crate::chunks::Chunk;
use crate::labels::Label;
use crate::syntree::TreebankNode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedLeaf {
  pub index: usize,
  pub tag: String,
  pub word: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternalNode {
  label: Label,
  children: Vec<ParseNode>,
  left: usize,
  right: usize,
}

impl InternalNode {
  fn new(label: Label, children: Vec<ParseNode>) -> Self {
    assert!(!label.is_empty(), "internal node with empty label");
    assert!(!children.is_empty(), "internal node {} without children", label);
    assert!(
      children.len() > 1 || children[0].is_leaf(),
      "unary internal node {} over a non-leaf",
      label
    );
    assert!(
      children.windows(2).all(|w| w[0].right() == w[1].left()),
      "children of {} are not contiguous",
      label
    );
    let left = children[0].left();
    let right = children[children.len() - 1].right();
    Self {
      label,
      children,
      left,
      right,
    }
  }

  pub fn label(&self) -> &Label {
    &self.label
  }

  pub fn children(&self) -> &[ParseNode] {
    &self.children
  }
}

/// The unresolved latent region. Chunk boundaries are its only fixed
/// structure; everything between them is resolved on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct UncompletedNode {
  label: Label,
  chunk_leaves: Vec<ParseNode>,
  chunks: Vec<Chunk>,
  splits: Vec<usize>,
  left: usize,
  right: usize,
}

impl UncompletedNode {
  fn new(label: Label, chunk_leaves: Vec<ParseNode>) -> Self {
    assert!(!label.is_empty(), "latent region with empty label");
    assert!(!chunk_leaves.is_empty(), "latent region without chunks");
    assert!(
      chunk_leaves.windows(2).all(|w| w[0].right() == w[1].left()),
      "chunks of latent region {} are not contiguous",
      label
    );

    let chunks = chunk_leaves
      .iter()
      .map(|node| {
        let tag = node.label().and_then(Label::last).unwrap_or_default();
        let words = node.leaves().into_iter().map(|l| l.word.clone()).collect();
        Chunk::new(tag, node.left(), node.right(), words)
      })
      .collect::<Vec<_>>();
    let mut splits = chunks.iter().map(|c| c.start).collect::<Vec<_>>();
    splits.push(chunks[chunks.len() - 1].end);

    let left = chunk_leaves[0].left();
    let right = chunk_leaves[chunk_leaves.len() - 1].right();
    Self {
      label,
      chunk_leaves,
      chunks,
      splits,
      left,
      right,
    }
  }

  pub fn label(&self) -> &Label {
    &self.label
  }

  pub fn chunk_leaves(&self) -> &[ParseNode] {
    &self.chunk_leaves
  }

  pub fn chunks(&self) -> &[Chunk] {
    &self.chunks
  }

  /// Chunk boundaries, both ends included.
  pub fn splits(&self) -> &[usize] {
    &self.splits
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseNode {
  Leaf(IndexedLeaf),
  Internal(InternalNode),
  ChunkInternal(InternalNode),
  Uncompleted(UncompletedNode),
}

impl ParseNode {
  pub fn leaf(index: usize, tag: impl Into<String>, word: impl Into<String>) -> Self {
    Self::Leaf(IndexedLeaf {
      index,
      tag: tag.into(),
      word: word.into(),
    })
  }

  /// Panics unless `children` are non-empty and contiguous, and a single
  /// child is a leaf.
  pub fn internal(label: Label, children: Vec<ParseNode>) -> Self {
    Self::Internal(InternalNode::new(label, children))
  }

  pub fn chunk_internal(label: Label, children: Vec<ParseNode>) -> Self {
    Self::ChunkInternal(InternalNode::new(label, children))
  }

  pub fn uncompleted(label: Label, chunk_leaves: Vec<ParseNode>) -> Self {
    Self::Uncompleted(UncompletedNode::new(label, chunk_leaves))
  }

  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf(_))
  }

  pub fn left(&self) -> usize {
    match self {
      Self::Leaf(leaf) => leaf.index,
      Self::Internal(node) | Self::ChunkInternal(node) => node.left,
      Self::Uncompleted(node) => node.left,
    }
  }

  pub fn right(&self) -> usize {
    match self {
      Self::Leaf(leaf) => leaf.index + 1,
      Self::Internal(node) | Self::ChunkInternal(node) => node.right,
      Self::Uncompleted(node) => node.right,
    }
  }

  pub fn span(&self) -> (usize, usize) {
    (self.left(), self.right())
  }

  pub fn label(&self) -> Option<&Label> {
    match self {
      Self::Leaf(_) => None,
      Self::Internal(node) | Self::ChunkInternal(node) => Some(&node.label),
      Self::Uncompleted(node) => Some(&node.label),
    }
  }

  /// Contiguous children. A latent region has none; see
  /// [`UncompletedNode::chunk_leaves`].
  pub fn children(&self) -> &[ParseNode] {
    match self {
      Self::Internal(node) | Self::ChunkInternal(node) => &node.children,
      Self::Leaf(_) | Self::Uncompleted(_) => &[],
    }
  }

  pub fn leaves(&self) -> Vec<&IndexedLeaf> {
    let mut out = Vec::new();
    self.collect_leaves(&mut out);
    out
  }

  fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a IndexedLeaf>) {
    match self {
      Self::Leaf(leaf) => out.push(leaf),
      Self::Internal(node) | Self::ChunkInternal(node) => {
        for child in node.children.iter() {
          child.collect_leaves(out);
        }
      }
      Self::Uncompleted(node) => {
        for child in node.chunk_leaves.iter() {
          child.collect_leaves(out);
        }
      }
    }
  }

  /// Back to an unindexed tree, expanding multi-tag labels into unary chains.
  pub fn convert(&self) -> TreebankNode {
    match self {
      Self::Leaf(leaf) => TreebankNode::leaf(&leaf.tag, &leaf.word),
      Self::Internal(node) => {
        expand_chain(&node.label, node.children.iter().map(Self::convert).collect(), |l, c| {
          TreebankNode::internal(l, c)
        })
      }
      Self::ChunkInternal(node) => expand_chain(
        &node.label,
        node.children.iter().map(Self::convert).collect(),
        |l, c| TreebankNode::chunk_internal(l, c),
      ),
      Self::Uncompleted(node) => TreebankNode::uncompleted(
        node.label.last().unwrap_or_default(),
        node.chunk_leaves.iter().map(Self::convert).collect(),
        node.chunks.clone(),
      ),
    }
  }

  pub fn linearize(&self) -> String {
    self.convert().linearize()
  }
}

fn expand_chain(
  label: &Label,
  children: Vec<TreebankNode>,
  make: fn(String, Vec<TreebankNode>) -> TreebankNode,
) -> TreebankNode {
  let tags = label.tags();
  let mut tree = make(tags[tags.len() - 1].clone(), children);
  for sublabel in tags[..tags.len() - 1].iter().rev() {
    tree = make(sublabel.clone(), vec![tree]);
  }
  tree
}

impl fmt::Display for ParseNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {}", self.left(), self.right(), self.linearize())
  }
}
