//! Simple recursive-descent reading of bracketed trees, `(LABEL child ...)`
//! with `(TAG word)` leaves.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::syntree::TreebankNode;
use crate::utils::{Err, maybe_normalize, regex_static};

/// Wrapper label removed from the top of loaded trees.
pub const TOP: &str = "TOP";

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// Try to consume a regex, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => {
      let (_, rest) = s.split_at(m.end());
      (Some(m.as_str()), rest)
    }
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", re, s).into())
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", c, s).into())
  }
}

fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE, r"\s+");
  optional_re(&WHITESPACE, s).1
}

/// A label or a word: anything up to whitespace or a paren
fn parse_token(s: &str) -> ParseResult<'_, &str> {
  regex_static!(TOKEN, r"[^\s()]+");
  needed_re(&TOKEN, s).map_err(|e| format!("token: {}", e).into())
}

/// Parses one node. Extra opening parens before the label wrap nothing and
/// need matching closing parens.
fn parse_node(s: &str, normalize: bool) -> ParseResult<'_, TreebankNode> {
  let mut s = s;
  let mut parens = 0;
  while let (Some(_), rest) = optional_char('(', s) {
    parens += 1;
    s = skip_whitespace(rest);
  }
  if parens == 0 {
    return Err(format!("expected '(' at {}", s).into());
  }

  let (label, rest) = parse_token(s).map_err(|e| -> Err { format!("label: {}", e).into() })?;
  let rest = skip_whitespace(rest);
  let (node, mut s) = if rest.starts_with('(') {
    let (children, rest) = parse_children(rest, normalize)?;
    (TreebankNode::internal(label, children), rest)
  } else {
    let (word, rest) = parse_token(rest).map_err(|e| -> Err { format!("leaf {}: {}", label, e).into() })?;
    (TreebankNode::leaf(label, maybe_normalize(word, normalize)), rest)
  };

  for _ in 0..parens {
    s = skip_whitespace(s);
    let (_, rest) = needed_char(')', s)?;
    s = rest;
  }
  Ok((node, s))
}

fn parse_children(s: &str, normalize: bool) -> ParseResult<'_, Vec<TreebankNode>> {
  let mut s = s;
  let mut children = Vec::new();
  while s.starts_with('(') {
    let (child, rest) = parse_node(s, normalize)?;
    children.push(child);
    s = skip_whitespace(rest);
  }
  Ok((children, s))
}

fn strip_top(tree: TreebankNode) -> Result<TreebankNode, Err> {
  match tree {
    TreebankNode::Internal { label, mut children } if label == TOP => {
      if children.len() != 1 {
        return Err(format!("{} node with {} children", TOP, children.len()).into());
      }
      Ok(children.remove(0))
    }
    tree => Ok(tree),
  }
}

/// Reads every tree in `s`, stripping [`TOP`] wrappers. With `normalize`,
/// digits in words become `0`.
pub fn load_trees_from_str(s: &str, normalize: bool) -> Result<Vec<TreebankNode>, Err> {
  let (trees, rest) = parse_children(skip_whitespace(s), normalize)?;
  if !rest.is_empty() {
    return Err(format!("unexpected input at {}", rest).into());
  }
  trees.into_iter().map(strip_top).collect()
}

pub fn load_trees(path: impl AsRef<Path>, normalize: bool) -> Result<Vec<TreebankNode>, Err> {
  let path = path.as_ref();
  let contents = fs::read_to_string(path)
    .map_err(|e| -> Err { format!("tree file {}: {}", path.display(), e).into() })?;
  load_trees_from_str(&contents, normalize)
    .map_err(|e| -> Err { format!("tree file {}: {}", path.display(), e).into() })
}
