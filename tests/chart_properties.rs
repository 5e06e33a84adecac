use std::collections::HashMap;

use latent_chart::{
  BuilderConfig, Chunk, ChartParser, ChunkChartParser, ChunkParserConfig, Gold, LabelVocab, LatentTreeBuilder,
  NonTerminalMode, ParserConfig, RbtBoundary,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LABELS: [&str; 3] = ["a", "b", "c"];

fn words(n: usize) -> Vec<String> {
  "uvwxyz0123".chars().take(n).map(|c| c.to_string()).collect()
}

fn random_scores(n: usize, width: usize, rng: &mut StdRng) -> HashMap<(usize, usize), Vec<f64>> {
  let mut scores = HashMap::new();
  for left in 0..n {
    for right in left + 1..=n {
      scores.insert((left, right), (0..width).map(|_| rng.gen_range(-3.0..3.0)).collect());
    }
  }
  scores
}

fn random_chunks(words: &[String], rng: &mut StdRng) -> Vec<Chunk> {
  let mut chunks = Vec::new();
  let mut start = 0;
  for end in 1..=words.len() {
    if end == words.len() || rng.gen_bool(0.4) {
      let label = LABELS[rng.gen_range(0..LABELS.len())];
      chunks.push(Chunk::new(label, start, end, words[start..end].to_vec()));
      start = end;
    }
  }
  chunks
}

fn best(scores: &[f64]) -> f64 {
  scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Totals of every derivation of `left..right`, enumerated without sharing.
fn derivations(scores: &HashMap<(usize, usize), Vec<f64>>, n: usize, left: usize, right: usize) -> Vec<f64> {
  let raw = &scores[&(left, right)];
  let label = if (left, right) == (0, n) { best(&raw[1..]) } else { best(raw) };
  if right - left == 1 {
    return vec![label];
  }

  let flat = |l: usize, r: usize| best(&scores[&(l, r)]);
  let mut out = Vec::new();
  for p in left + 1..right {
    for rest in derivations(scores, n, p, right) {
      out.push(label + flat(left, p) + rest);
    }
    for rest in derivations(scores, n, left, p) {
      out.push(label + rest + flat(p, right));
    }
  }
  out
}

proptest! {
  #[test]
  fn parse_finds_best_derivation(n in 1usize..=6, seed in any::<u64>()) {
    let vocab = LabelVocab::from_labels(&LABELS, NonTerminalMode::Ordered);
    let mut rng = StdRng::seed_from_u64(seed);
    let scores = random_scores(n, vocab.size(), &mut rng);
    let sentence = words(n);

    let parser = ChartParser::new(&vocab, ParserConfig::default());
    let parse = parser.parse(&sentence, &mut |l: usize, r: usize| scores[&(l, r)].clone());

    let expected = best(&derivations(&scores, n, 0, n));
    prop_assert!((parse.score - expected).abs() < 1e-9, "{} != {}", parse.score, expected);
    prop_assert_eq!(parse.tree.span(), (0, n));
    let parsed_words = parse.tree.leaves().into_iter().map(|l| l.word.clone()).collect::<Vec<_>>();
    prop_assert_eq!(parsed_words, sentence);
  }

  #[test]
  fn loss_is_never_negative(n in 1usize..=7, seed in any::<u64>(), boundary in 0usize..3, mode in 0usize..4) {
    let mode = [
      NonTerminalMode::Ordered,
      NonTerminalMode::Empty,
      NonTerminalMode::Random,
      NonTerminalMode::OrderedArgmaxGold,
    ][mode];
    let vocab = LabelVocab::from_labels(&LABELS, mode);
    let mut rng = StdRng::seed_from_u64(seed);
    let sentence = words(n);
    let chunks = random_chunks(&sentence, &mut rng);
    let scores = random_scores(n, vocab.size(), &mut rng);
    let mut scorer = |l: usize, r: usize| scores[&(l, r)].clone();

    let config = BuilderConfig {
      boundary: [RbtBoundary::None, RbtBoundary::Start, RbtBoundary::Label("b".into())][boundary].clone(),
      mode,
    };
    let latent = LatentTreeBuilder::new(&vocab, &config)
      .unwrap()
      .build_dynamic_rbt_tree(&sentence, &chunks, &mut rng)
      .unwrap();
    let indexed = latent.indexed();
    let gold = Gold { tree: &indexed, chunks: &latent.chunks, scope: latent.scope };

    let parser = ChartParser::new(&vocab, ParserConfig { mode, ..Default::default() });
    let outcome = parser.train(&sentence, &mut scorer, &gold, &mut rng).unwrap();
    prop_assert!(outcome.loss >= -1e-9, "chart loss {}", outcome.loss);
    // argmax gold labels may drop a chunk from the gold tree
    if mode != NonTerminalMode::OrderedArgmaxGold {
      prop_assert_eq!(outcome.gold_tree.convert().to_chunks(), chunks.clone());
    }

    let parser = ChunkChartParser::new(&vocab, ChunkParserConfig { mode, ..Default::default() });
    let outcome = parser.train(&sentence, &mut scorer, &gold, &mut rng).unwrap();
    prop_assert!(outcome.loss >= -1e-9, "chunk loss {}", outcome.loss);
    prop_assert_eq!(outcome.gold_tree.convert().to_chunks(), chunks);
  }

  #[test]
  fn zero_cost_only_forgives_correct_chunks(n in 1usize..=6, seed in any::<u64>()) {
    let vocab = LabelVocab::from_labels(&LABELS, NonTerminalMode::Ordered);
    let mut rng = StdRng::seed_from_u64(seed);
    let sentence = words(n);
    let chunks = random_chunks(&sentence, &mut rng);
    let scores = random_scores(n, vocab.size(), &mut rng);
    let mut scorer = |l: usize, r: usize| scores[&(l, r)].clone();

    let latent = LatentTreeBuilder::new(&vocab, &BuilderConfig::default())
      .unwrap()
      .build_dynamic_rbt_tree(&sentence, &chunks, &mut rng)
      .unwrap();
    let indexed = latent.indexed();
    let gold = Gold { tree: &indexed, chunks: &latent.chunks, scope: latent.scope };

    let plain = ChartParser::new(&vocab, ParserConfig::default())
      .train(&sentence, &mut scorer, &gold, &mut rng)
      .unwrap();
    let forgiving = ChartParser::new(&vocab, ParserConfig { zero_cost: true, ..Default::default() })
      .train(&sentence, &mut scorer, &gold, &mut rng)
      .unwrap();

    prop_assert_eq!(&forgiving.tree, &plain.tree);
    if forgiving.tree.convert().to_chunks() == chunks {
      prop_assert_eq!(forgiving.loss, 0.0);
    } else {
      prop_assert_eq!(forgiving.loss, plain.loss);
    }
  }
}
