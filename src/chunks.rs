//! Chunk records, the BIO encoding and the chunk file reader.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::ChunkError;
use crate::utils::{Err, maybe_normalize};

/// A labeled, contiguous span `[start, end)` with its text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chunk {
  pub label: String,
  pub start: usize,
  pub end: usize,
  pub text: Vec<String>,
}

impl Chunk {
  pub fn new(label: impl Into<String>, start: usize, end: usize, text: Vec<String>) -> Self {
    Self {
      label: label.into(),
      start,
      end,
      text,
    }
  }

  pub fn len(&self) -> usize {
    self.end - self.start
  }

  pub fn is_empty(&self) -> bool {
    self.end <= self.start
  }

  pub fn span(&self) -> (usize, usize) {
    (self.start, self.end)
  }
}

impl fmt::Display for Chunk {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({} {})", self.label, self.text.concat())
  }
}

/// A chunk-annotated sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
  pub words: Vec<String>,
  pub chunks: Vec<Chunk>,
}

impl Instance {
  /// Attaches text to `(label, start, end)` spans over `words`.
  pub fn new(words: Vec<String>, spans: Vec<(String, usize, usize)>) -> Self {
    let chunks = spans
      .into_iter()
      .map(|(label, start, end)| {
        let text = words[start..end].to_vec();
        Chunk::new(label, start, end, text)
      })
      .collect();
    Self { words, chunks }
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  pub fn max_chunk_len(&self) -> usize {
    self.chunks.iter().map(Chunk::len).max().unwrap_or(0)
  }

  pub fn validate(&self) -> Result<(), ChunkError> {
    validate_chunks(self.words.len(), &self.chunks)
  }
}

/// Checks that `chunks` sweep `0..len` in order without gaps or overlaps.
pub fn validate_chunks(len: usize, chunks: &[Chunk]) -> Result<(), ChunkError> {
  if len == 0 || chunks.is_empty() {
    return Err(ChunkError::EmptySentence);
  }
  let mut expected = 0;
  for (index, chunk) in chunks.iter().enumerate() {
    if chunk.start != expected {
      return Err(ChunkError::NotContiguous {
        index,
        expected,
        found: chunk.start,
      });
    }
    if chunk.is_empty() {
      return Err(ChunkError::EmptyChunk {
        index,
        start: chunk.start,
        end: chunk.end,
      });
    }
    expected = chunk.end;
  }
  if expected != len {
    return Err(ChunkError::LengthMismatch { end: expected, len });
  }
  Ok(())
}

fn split_tag(tag: &str) -> (bool, &str) {
  if let Some(label) = tag.strip_prefix("B-") {
    (true, label)
  } else if let Some(label) = tag.strip_prefix("I-") {
    (false, label)
  } else {
    (false, tag)
  }
}

/// Collapses a BIO tag sequence into `(label, start, end)` spans. A `B-`
/// prefix or a change of label starts a new span; bare tags count as inside.
pub fn seq_to_chunks<S: AsRef<str>>(seq: &[S]) -> Vec<(String, usize, usize)> {
  let mut chunks = Vec::new();
  let mut current: Option<(&str, usize)> = None;

  for (i, tag) in seq.iter().enumerate() {
    let (begin, label) = split_tag(tag.as_ref());
    match current {
      Some((last, start)) if begin || last != label => {
        chunks.push((last.to_string(), start, i));
        current = Some((label, i));
      }
      Some(_) => {}
      None => current = Some((label, i)),
    }
  }

  if let Some((last, start)) = current {
    chunks.push((last.to_string(), start, seq.len()));
  }
  chunks
}

/// BIO tags for a chunk sequence: `B-X` then `I-X` for the rest of each chunk.
pub fn chunks_to_seq(chunks: &[Chunk]) -> Vec<String> {
  let mut seq = Vec::new();
  for chunk in chunks {
    seq.push(format!("B-{}", chunk.label));
    for _ in chunk.start + 1..chunk.end {
      seq.push(format!("I-{}", chunk.label));
    }
  }
  seq
}

pub fn chunks_to_str(chunks: &[Chunk]) -> String {
  chunks
    .iter()
    .map(Chunk::to_string)
    .collect::<Vec<_>>()
    .join(" ")
}

/// The sentence text covered by `chunks`, in order.
pub fn text_of(chunks: &[Chunk]) -> Vec<&str> {
  chunks
    .iter()
    .flat_map(|c| c.text.iter().map(String::as_str))
    .collect()
}

/// Lowercases everything after the two-character BIO prefix.
fn lowercase_label(tag: &str) -> String {
  let prefix_len = tag.char_indices().nth(2).map_or(tag.len(), |(idx, _)| idx);
  let (prefix, rest) = tag.split_at(prefix_len);
  format!("{}{}", prefix, rest.to_lowercase())
}

/// Parses blank-line separated sentences of `word tag` lines.
pub fn parse_chunks(s: &str, normalize: bool) -> Result<Vec<Instance>, Err> {
  let mut instances = Vec::new();
  let mut words = Vec::new();
  let mut tags = Vec::new();

  let mut flush = |words: &mut Vec<String>, tags: &mut Vec<String>| {
    if !words.is_empty() {
      let spans = seq_to_chunks(tags);
      instances.push(Instance::new(std::mem::take(words), spans));
      tags.clear();
    }
  };

  for (line_no, line) in s.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() {
      flush(&mut words, &mut tags);
      continue;
    }

    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next()) {
      (Some(word), Some(tag)) => {
        words.push(maybe_normalize(word, normalize));
        tags.push(lowercase_label(tag));
      }
      _ => return Err(format!("line {}: expected `word tag`, got '{}'", line_no + 1, line).into()),
    }
  }
  flush(&mut words, &mut tags);

  Ok(instances)
}

pub fn read_chunks(path: impl AsRef<Path>, normalize: bool) -> Result<Vec<Instance>, Err> {
  let path = path.as_ref();
  let contents = fs::read_to_string(path)
    .map_err(|e| -> Err { format!("chunk file {}: {}", path.display(), e).into() })?;
  let instances = parse_chunks(&contents, normalize)
    .map_err(|e| -> Err { format!("chunk file {}: {}", path.display(), e).into() })?;

  info!(
    path = %path.display(),
    sentences = instances.len(),
    max_chunk_length = instances.iter().map(Instance::max_chunk_len).max().unwrap_or(0),
    max_char_length = instances.iter().map(Instance::len).max().unwrap_or(0),
    "loaded chunk file"
  );
  Ok(instances)
}
