//! Gold-side queries over an indexed tree: which gold node encloses a span,
//! which label and which split points the gold structure dictates for it.
//!
//! Latent regions have no fixed structure below their chunks, so a span inside
//! one is answered by assembling a node from the chunks it overlaps. The label
//! of that node follows the non-terminal labeling mode, which is why every
//! query takes an [`OracleContext`].

use std::collections::HashMap;
use std::rc::Rc;

use rand::RngCore;

use crate::labels::{Label, Labeling};
use crate::parse_tree::{ParseNode, UncompletedNode};

/// Childless stand-in for a chunk node, returned when no child of the chunk
/// contains the queried span.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkTail {
  pub label: Label,
  pub left: usize,
  pub right: usize,
}

/// The smallest gold node containing a span.
#[derive(Debug, Clone, PartialEq)]
pub enum Enclosing<'a> {
  Node(&'a ParseNode),
  /// Built on the fly from the chunks of a latent region.
  Assembled {
    label: Label,
    children: Vec<&'a ParseNode>,
  },
  Tail(Rc<ChunkTail>),
}

impl Enclosing<'_> {
  pub fn span(&self) -> (usize, usize) {
    match self {
      Self::Node(node) => node.span(),
      Self::Assembled { children, .. } => (children[0].left(), children[children.len() - 1].right()),
      Self::Tail(tail) => (tail.left, tail.right),
    }
  }

  pub fn label(&self) -> Option<&Label> {
    match self {
      Self::Node(node) => node.label(),
      Self::Assembled { label, .. } => Some(label),
      Self::Tail(tail) => Some(&tail.label),
    }
  }

  /// Left boundaries of the children, in order.
  pub fn child_lefts(&self) -> Vec<usize> {
    match self {
      Self::Node(node) => node.children().iter().map(ParseNode::left).collect(),
      Self::Assembled { children, .. } => children.iter().map(|c| c.left()).collect(),
      Self::Tail(_) => Vec::new(),
    }
  }
}

/// Labeling configuration, randomness, and the memo of chunk tails for one
/// gold tree.
pub struct OracleContext<'c> {
  labeling: Labeling<'c>,
  rng: &'c mut dyn RngCore,
  tails: HashMap<(usize, usize), Rc<ChunkTail>>,
}

impl<'c> OracleContext<'c> {
  pub fn new(labeling: Labeling<'c>, rng: &'c mut dyn RngCore) -> Self {
    Self {
      labeling,
      rng,
      tails: HashMap::new(),
    }
  }

  pub fn labeling(&self) -> &Labeling<'c> {
    &self.labeling
  }

  fn tail(&mut self, label: &Label, left: usize, right: usize) -> Rc<ChunkTail> {
    self
      .tails
      .entry((left, right))
      .or_insert_with(|| {
        Rc::new(ChunkTail {
          label: label.clone(),
          left,
          right,
        })
      })
      .clone()
  }

  fn assemble<'a>(&mut self, region: &'a UncompletedNode, left: usize, right: usize) -> Enclosing<'a> {
    let children = region
      .chunk_leaves()
      .iter()
      .filter(|c| left < c.right() && right > c.left())
      .collect::<Vec<_>>();
    let tags = children.iter().filter_map(|c| c.label().and_then(Label::first));
    let current = region.label().last().unwrap_or_default();
    let label = self.labeling.region_label(tags, current, &mut *self.rng);
    Enclosing::Assembled {
      label: Label::single(label),
      children,
    }
  }
}

fn contains(node: &ParseNode, left: usize, right: usize) -> bool {
  node.left() <= left && right <= node.right()
}

impl ParseNode {
  /// Descends to the smallest node whose span contains `[left, right)`.
  pub fn enclosing<'a>(&'a self, left: usize, right: usize, ctx: &mut OracleContext) -> Enclosing<'a> {
    assert!(
      self.left() <= left && left < right && right <= self.right(),
      "span {}..{} outside of {}..{}",
      left,
      right,
      self.left(),
      self.right()
    );

    let candidates = match self {
      Self::Uncompleted(region) => region.chunk_leaves(),
      _ => self.children(),
    };
    if let Some(child) = candidates
      .iter()
      .find(|c| !c.is_leaf() && contains(c, left, right))
    {
      return child.enclosing(left, right, ctx);
    }

    match self {
      Self::ChunkInternal(node) => Enclosing::Tail(ctx.tail(node.label(), self.left(), self.right())),
      Self::Uncompleted(region) => ctx.assemble(region, left, right),
      Self::Leaf(_) | Self::Internal(_) => Enclosing::Node(self),
    }
  }

  /// Label of the gold node exactly covering `[left, right)`, or the empty
  /// label.
  pub fn oracle_label(&self, left: usize, right: usize, ctx: &mut OracleContext) -> Label {
    if let Self::Uncompleted(region) = self {
      return region_oracle_label(region, left, right);
    }

    let enclosing = self.enclosing(left, right, ctx);
    if enclosing.span() == (left, right) {
      enclosing.label().cloned().unwrap_or_default()
    } else {
      Label::empty()
    }
  }

  /// Child boundaries of the enclosing gold node strictly inside the span.
  pub fn oracle_splits(&self, left: usize, right: usize, ctx: &mut OracleContext) -> Vec<usize> {
    if let Self::Uncompleted(region) = self {
      let inside = region
        .splits()
        .iter()
        .copied()
        .filter(|&p| left < p && p < right)
        .collect::<Vec<_>>();
      if !inside.is_empty() {
        return inside;
      }
    }

    self
      .enclosing(left, right, ctx)
      .child_lefts()
      .into_iter()
      .filter(|&p| left < p && p < right)
      .collect()
  }

  /// Inner child boundaries of a gold node exactly covering the span; empty
  /// when no gold node does.
  pub fn oracle_splits2(&self, left: usize, right: usize, ctx: &mut OracleContext) -> Vec<usize> {
    let enclosing = self.enclosing(left, right, ctx);
    if enclosing.span() == (left, right) {
      enclosing.child_lefts().into_iter().skip(1).collect()
    } else {
      Vec::new()
    }
  }
}

fn region_oracle_label(region: &UncompletedNode, left: usize, right: usize) -> Label {
  if let Some(chunk) = region
    .chunks()
    .iter()
    .find(|c| c.start == left && c.end == right)
  {
    return Label::single(chunk.label.as_str());
  }
  if region.splits().contains(&left) && region.splits().contains(&right) {
    return region.label().clone();
  }
  Label::empty()
}
