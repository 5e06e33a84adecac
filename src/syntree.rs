//! Unindexed (word-based) trees, used for reading, writing and chunk
//! extraction.

use std::fmt;

use crate::chunks::Chunk;
use crate::labels::{Label, to_terminal};
use crate::parse_tree::ParseNode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
  pub tag: String,
  pub word: String,
}

impl Leaf {
  pub fn new(tag: impl Into<String>, word: impl Into<String>) -> Self {
    Self {
      tag: tag.into(),
      word: word.into(),
    }
  }
}

impl fmt::Display for Leaf {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({} {})", self.tag, self.word)
  }
}

/// A latent region: chunk subtrees whose arrangement is left to the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct UncompletedRegion {
  pub label: String,
  /// One subtree per chunk, each holding that chunk's leaves.
  pub chunk_leaves: Vec<TreebankNode>,
  pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreebankNode {
  Leaf(Leaf),
  Internal {
    label: String,
    children: Vec<TreebankNode>,
  },
  /// An internal node that came from a chunk rather than from merging.
  ChunkInternal {
    label: String,
    children: Vec<TreebankNode>,
  },
  Uncompleted(UncompletedRegion),
}

impl TreebankNode {
  pub fn leaf(tag: impl Into<String>, word: impl Into<String>) -> Self {
    Self::Leaf(Leaf::new(tag, word))
  }

  pub fn internal(label: impl Into<String>, children: Vec<TreebankNode>) -> Self {
    assert!(!children.is_empty(), "internal node without children");
    Self::Internal {
      label: label.into(),
      children,
    }
  }

  pub fn chunk_internal(label: impl Into<String>, children: Vec<TreebankNode>) -> Self {
    assert!(!children.is_empty(), "chunk node without children");
    Self::ChunkInternal {
      label: label.into(),
      children,
    }
  }

  pub fn uncompleted(
    label: impl Into<String>,
    chunk_leaves: Vec<TreebankNode>,
    chunks: Vec<Chunk>,
  ) -> Self {
    assert!(!chunk_leaves.is_empty(), "latent region without chunks");
    assert_eq!(chunk_leaves.len(), chunks.len(), "one subtree per chunk");
    Self::Uncompleted(UncompletedRegion {
      label: label.into(),
      chunk_leaves,
      chunks,
    })
  }

  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf(_))
  }

  /// Node label, or the tag for a leaf.
  pub fn label(&self) -> &str {
    match self {
      Self::Leaf(leaf) => &leaf.tag,
      Self::Internal { label, .. } | Self::ChunkInternal { label, .. } => label,
      Self::Uncompleted(region) => &region.label,
    }
  }

  pub fn children(&self) -> &[TreebankNode] {
    match self {
      Self::Leaf(_) => &[],
      Self::Internal { children, .. } | Self::ChunkInternal { children, .. } => children,
      Self::Uncompleted(region) => &region.chunk_leaves,
    }
  }

  pub fn leaves(&self) -> Vec<&Leaf> {
    let mut out = Vec::new();
    self.collect_leaves(&mut out);
    out
  }

  fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf>) {
    match self {
      Self::Leaf(leaf) => out.push(leaf),
      _ => {
        for child in self.children() {
          child.collect_leaves(out);
        }
      }
    }
  }

  pub fn words(&self) -> Vec<&str> {
    self.leaves().into_iter().map(|l| l.word.as_str()).collect()
  }

  /// Bracketed single-line form, `(LABEL child ...)`.
  pub fn linearize(&self) -> String {
    self.to_string()
  }

  pub fn convert(&self) -> ParseNode {
    self.convert_at(0)
  }

  /// Converts to an indexed tree whose first leaf sits at `index`. Chains of
  /// single internal children collapse into one multi-tag label.
  pub fn convert_at(&self, index: usize) -> ParseNode {
    match self {
      Self::Leaf(leaf) => ParseNode::leaf(index, &leaf.tag, &leaf.word),
      Self::Internal { label, .. } | Self::ChunkInternal { label, .. } => {
        let mut tree = self;
        let mut sublabels = vec![label.clone()];
        while let [child @ (Self::Internal { .. } | Self::ChunkInternal { .. })] = tree.children() {
          tree = child;
          sublabels.push(child.label().to_string());
        }

        let children = convert_sequence(tree.children(), index);
        if matches!(self, Self::ChunkInternal { .. }) {
          ParseNode::chunk_internal(Label::new(sublabels), children)
        } else {
          ParseNode::internal(Label::new(sublabels), children)
        }
      }
      Self::Uncompleted(region) => {
        let chunk_leaves = convert_sequence(&region.chunk_leaves, index);
        ParseNode::uncompleted(Label::single(region.label.as_str()), chunk_leaves)
      }
    }
  }

  /// Flattens the tree into chunks: the lowest nodes with at least one leaf
  /// child each become one chunk over all of their words.
  pub fn to_chunks(&self) -> Vec<Chunk> {
    let mut raw = Vec::new();
    self.collect_chunks(&mut raw);

    let mut chunks = Vec::with_capacity(raw.len());
    let mut pos = 0;
    for (label, words) in raw {
      let end = pos + words.len();
      chunks.push(Chunk::new(
        to_terminal(label),
        pos,
        end,
        words.into_iter().map(str::to_string).collect(),
      ));
      pos = end;
    }
    chunks
  }

  fn collect_chunks<'a>(&'a self, out: &mut Vec<(&'a str, Vec<&'a str>)>) {
    match self {
      Self::Leaf(leaf) => out.push((&leaf.tag, vec![&leaf.word])),
      Self::Internal { label, children } | Self::ChunkInternal { label, children } => {
        if children.iter().any(Self::is_leaf) {
          out.push((label, self.words()));
        } else {
          for child in children {
            child.collect_chunks(out);
          }
        }
      }
      Self::Uncompleted(region) => {
        for child in region.chunk_leaves.iter() {
          child.collect_chunks(out);
        }
      }
    }
  }
}

fn convert_sequence(nodes: &[TreebankNode], mut index: usize) -> Vec<ParseNode> {
  let mut out = Vec::with_capacity(nodes.len());
  for node in nodes {
    let converted = node.convert_at(index);
    index = converted.right();
    out.push(converted);
  }
  out
}

impl fmt::Display for TreebankNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf(leaf) => write!(f, "{}", leaf),
      _ => {
        write!(f, "({}", self.label())?;
        for child in self.children() {
          write!(f, " {}", child)?;
        }
        write!(f, ")")
      }
    }
  }
}
