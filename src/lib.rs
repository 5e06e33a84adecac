#[macro_use]
extern crate lazy_static;

pub mod bracket;
pub mod chart;
pub mod chunk_parser;
pub mod chunks;
pub mod error;
pub mod evaluate;
pub mod labels;
pub mod latent;
pub mod oracle;
pub mod parse_tree;
pub mod parser;
pub mod syntree;
pub mod utils;
pub mod vocab;

pub use crate::chart::SpanScorer;
pub use crate::chunk_parser::{ChunkChartParser, ChunkParserConfig};
pub use crate::chunks::{Chunk, Instance};
pub use crate::error::{ChunkError, EvalError, ParseError};
pub use crate::labels::{Label, NonTerminalMode, RbtBoundary};
pub use crate::latent::{BuilderConfig, LatentScope, LatentTree, LatentTreeBuilder};
pub use crate::parse_tree::ParseNode;
pub use crate::parser::{ChartParser, Gold, Parse, ParserConfig, TrainOutcome};
pub use crate::syntree::TreebankNode;
pub use crate::utils::Err;
pub use crate::vocab::LabelVocab;

#[test]
fn test_train_then_evaluate() {
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  let labels = ["loc", "o", "poi"];
  let vocab = LabelVocab::from_labels(&labels, NonTerminalMode::Ordered);
  let instances = chunks::parse_chunks("北 B-LOC\n京 I-LOC\n欢 B-O\n迎 I-O\n你 I-O\n", false).unwrap();
  let mut rng = StdRng::seed_from_u64(7);

  let builder = LatentTreeBuilder::new(&vocab, &BuilderConfig::default()).unwrap();
  let latent = builder.build_dynamic_rbt_trees(&instances, &mut rng);
  assert_eq!(latent.len(), 1);
  let indexed = latent[0].indexed();
  let gold = Gold {
    tree: &indexed,
    chunks: &latent[0].chunks,
    scope: latent[0].scope,
  };

  let width = vocab.size();
  let mut scorer = |_: usize, _: usize| vec![0.0; width];
  let parser = ChartParser::new(&vocab, ParserConfig::default());
  let outcome = parser.train(&latent[0].sentence, &mut scorer, &gold, &mut rng).unwrap();
  assert!(outcome.loss >= 0.0);

  let predicted = parser.parse(&latent[0].sentence, &mut scorer).chunks();
  let eval = evaluate::eval_chunks(vec![latent[0].chunks.clone()], vec![predicted]);
  assert_eq!(eval.sentences(), 1);
  assert_eq!(eval.invalid(), 0);
}
