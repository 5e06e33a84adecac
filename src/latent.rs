//! Turning flat chunk supervision into binary trees.

use rand::Rng;
use tracing::{debug, warn};

use crate::chunks::{Chunk, Instance, validate_chunks};
use crate::error::ChunkError;
use crate::labels::{EMPTY, Labeling, NonTerminalMode, PIVOT, RbtBoundary, XX};
use crate::parse_tree::ParseNode;
use crate::syntree::TreebankNode;
use crate::vocab::LabelVocab;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderConfig {
  pub boundary: RbtBoundary,
  pub mode: NonTerminalMode,
}

/// Character offsets `[start, end)` of the latent region. Empty when the
/// tree has no latent region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatentScope {
  pub start: usize,
  pub end: usize,
}

impl LatentScope {
  pub fn new(start: usize, end: usize) -> Self {
    Self { start, end }
  }

  pub fn is_empty(&self) -> bool {
    self.start >= self.end
  }

  pub fn contains(&self, left: usize, right: usize) -> bool {
    self.start <= left && right <= self.end
  }
}

/// Output of the dynamic right-branching builder.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentTree {
  pub sentence: Vec<String>,
  pub tree: TreebankNode,
  pub chunks: Vec<Chunk>,
  pub scope: LatentScope,
}

impl LatentTree {
  /// The tree as indexed gold structure for the chart parser.
  pub fn indexed(&self) -> ParseNode {
    self.tree.convert()
  }
}

pub struct LatentTreeBuilder<'v> {
  labeling: Labeling<'v>,
  threshold: i64,
}

impl<'v> LatentTreeBuilder<'v> {
  pub fn new(vocab: &'v LabelVocab, config: &BuilderConfig) -> Result<Self, ChunkError> {
    let labeling = Labeling::new(vocab, config.mode);
    let threshold = config.boundary.threshold(labeling.order())?;
    Ok(Self {
      labeling,
      threshold,
    })
  }

  pub fn labeling(&self) -> &Labeling<'v> {
    &self.labeling
  }

  /// Order below which chunks may be merged freely.
  pub fn threshold(&self) -> i64 {
    self.threshold
  }

  fn check(&self, words: &[String], chunks: &[Chunk]) -> Result<(), ChunkError> {
    validate_chunks(words.len(), chunks)?;
    match chunks.iter().find(|c| !self.labeling.order().contains(&c.label)) {
      Some(chunk) => Err(ChunkError::UnknownLabel {
        label: chunk.label.clone(),
      }),
      None => Ok(()),
    }
  }

  /// Randomized priority merge around the last [`PIVOT`] chunk, then right
  /// branching over whatever is left.
  ///
  /// A neighbor is absorbed into the pivot only while both sit below the
  /// threshold; with two candidates the side is a coin flip. Without a pivot,
  /// or under [`RbtBoundary::None`], the result is plain right branching.
  pub fn build_latent_tree<R>(&self, words: &[String], chunks: &[Chunk], rng: &mut R) -> Result<TreebankNode, ChunkError>
  where
    R: Rng + ?Sized,
  {
    self.check(words, chunks)?;
    let order = self.labeling.order();

    let mut nodes = chunks
      .iter()
      .map(|c| chunk_node(&c.label, &words[c.start..c.end]))
      .collect::<Vec<_>>();
    let merge = |left: TreebankNode, right: TreebankNode| {
      let label = order.parent_label(left.label(), right.label());
      TreebankNode::internal(label, vec![left, right])
    };

    if let Some(mut idx) = chunks.iter().rposition(|c| c.label == PIVOT) {
      let below = |node: &TreebankNode| order.order(node.label()) < self.threshold;
      while nodes.len() > 1 && below(&nodes[idx]) {
        let mut options = Vec::with_capacity(2);
        if idx + 1 < nodes.len() && below(&nodes[idx + 1]) {
          options.push(idx + 1);
        }
        if idx > 0 && below(&nodes[idx - 1]) {
          options.push(idx - 1);
        }

        let option = match options[..] {
          [] => break,
          [only] => only,
          [next, prev] => {
            if rng.gen_bool(0.5) {
              next
            } else {
              prev
            }
          }
          _ => unreachable!(),
        };

        if option < idx {
          idx -= 1;
        }
        let right = nodes.remove(idx + 1);
        let left = nodes.remove(idx);
        nodes.insert(idx, merge(left, right));
      }
    }

    Ok(right_branch(nodes, merge))
  }

  /// Right branching up to the last chunk at or above the threshold, with
  /// everything after it left as one latent region.
  pub fn build_dynamic_rbt_tree<R>(&self, words: &[String], chunks: &[Chunk], rng: &mut R) -> Result<LatentTree, ChunkError>
  where
    R: Rng + ?Sized,
  {
    self.check(words, chunks)?;
    let order = self.labeling.order();
    let len = words.len();

    let cut_off = chunks.iter().rposition(|c| order.order(&c.label) >= self.threshold);
    let split = cut_off.map_or(0, |i| i + 1);
    let scope = LatentScope::new(chunks.get(split).map_or(len, |c| c.start), len);
    let (mut prefix, latent) = chunks.split_at(split);

    let mut tree = if latent.is_empty() {
      let (last, rest) = prefix
        .split_last()
        .ok_or(ChunkError::EmptySentence)?;
      prefix = rest;
      chunk_node(&last.label, &words[last.start..last.end])
    } else {
      let chunk_leaves = latent
        .iter()
        .map(|c| chunk_node(&c.label, &words[c.start..c.end]))
        .collect();
      let label = self
        .labeling
        .region_label(latent.iter().map(|c| c.label.as_str()), EMPTY, rng);
      TreebankNode::uncompleted(label, chunk_leaves, latent.to_vec())
    };

    for chunk in prefix.iter().rev() {
      let label = self.labeling.chain_label(&chunk.label, tree.label(), rng);
      let node = chunk_node(&chunk.label, &words[chunk.start..chunk.end]);
      tree = TreebankNode::internal(label, vec![node, tree]);
    }

    debug!(
      cut_off = ?cut_off,
      scope_start = scope.start,
      scope_end = scope.end,
      tree = %tree,
      "built dynamic right-branching tree"
    );
    Ok(LatentTree {
      sentence: words.to_vec(),
      tree,
      chunks: chunks.to_vec(),
      scope,
    })
  }

  /// Builds a randomized tree per instance, skipping instances whose chunks
  /// do not fit their sentence.
  pub fn build_latent_trees<R>(&self, instances: &[Instance], rng: &mut R) -> Vec<TreebankNode>
  where
    R: Rng + ?Sized,
  {
    instances
      .iter()
      .enumerate()
      .filter_map(|(i, inst)| match self.build_latent_tree(&inst.words, &inst.chunks, rng) {
        Ok(tree) => Some(tree),
        Err(e) => {
          warn!(sentence = i, error = %e, "skipping sentence");
          None
        }
      })
      .collect()
  }

  pub fn build_dynamic_rbt_trees<R>(&self, instances: &[Instance], rng: &mut R) -> Vec<LatentTree>
  where
    R: Rng + ?Sized,
  {
    instances
      .iter()
      .enumerate()
      .filter_map(|(i, inst)| match self.build_dynamic_rbt_tree(&inst.words, &inst.chunks, rng) {
        Ok(tree) => Some(tree),
        Err(e) => {
          warn!(sentence = i, error = %e, "skipping sentence");
          None
        }
      })
      .collect()
  }
}

fn chunk_node(label: &str, words: &[String]) -> TreebankNode {
  TreebankNode::internal(
    label,
    words.iter().map(|w| TreebankNode::leaf(XX, w.as_str())).collect(),
  )
}

fn right_branch<F>(mut nodes: Vec<TreebankNode>, merge: F) -> TreebankNode
where
  F: Fn(TreebankNode, TreebankNode) -> TreebankNode,
{
  let Some(mut tree) = nodes.pop() else {
    panic!("nothing to merge");
  };
  while let Some(left) = nodes.pop() {
    tree = merge(left, tree);
  }
  tree
}
