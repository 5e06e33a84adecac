use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process;

use latent_chart::bracket::load_trees;
use latent_chart::chunks::{Instance, chunks_to_str, read_chunks};
use latent_chart::evaluate::eval_trees;
use latent_chart::vocab::load_label_list;
use latent_chart::{BuilderConfig, Err, LabelVocab, LatentTreeBuilder, NonTerminalMode, RbtBoundary};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {0} build CHUNK_FILE [options]
       {0} chunks TREE_FILE [options]
       {0} eval GOLD_TREE_FILE PREDICTED_TREE_FILE [options]

Commands:
  build     Print one latent tree per chunked sentence
  chunks    Print the chunks of every bracketed tree
  eval      Score predicted chunks against gold chunks

Options:
  -h, --help            Print this message
  -l, --labels FILE     Label list, one per line (defaults to the labels of CHUNK_FILE)
  -b, --boundary B      none, start or a label (defaults to start)
  -m, --mode N          Synthetic labels: 0 ordered, 1 empty, 2 random, 3 ordered with argmax gold
  -r, --random          Build randomized pivot trees instead of dynamic right-branching ones
  -s, --seed N          Random seed (defaults to 0)
  -n, --normalize       Map digits to 0
  -c, --conll FILE      With eval, also write per-symbol gold and predicted tags

Set RUST_LOG (e.g. RUST_LOG=debug) for diagnostics.",
    prog_name
  )
}

#[derive(Debug, PartialEq)]
enum Command {
  Build { chunk_file: String },
  Chunks { tree_file: String },
  Eval { gold_file: String, predicted_file: String },
}

struct Args {
  command: Command,
  labels: Option<String>,
  boundary: RbtBoundary,
  mode: NonTerminalMode,
  random: bool,
  seed: u64,
  normalize: bool,
  conll: Option<String>,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    if v.is_empty() {
      return Err(Self::make_error_message("bad argument vector", "latent-chart"));
    }

    let mut iter = v.into_iter();
    let prog_name = iter.next().unwrap_or_default();

    let mut positional = Vec::new();
    let mut labels = None;
    let mut boundary = RbtBoundary::default();
    let mut mode = NonTerminalMode::default();
    let mut random = false;
    let mut seed = 0;
    let mut normalize = false;
    let mut conll = None;

    while let Some(o) = iter.next() {
      let mut value = |name: &str| {
        iter
          .next()
          .ok_or_else(|| Self::make_error_message(&format!("missing value for {}", name), &prog_name))
      };

      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-l" || o == "--labels" {
        labels = Some(value(o.as_str())?);
      } else if o == "-b" || o == "--boundary" {
        // checked against the label vocabulary once it is known
        let Ok(b) = value(o.as_str())?.parse::<RbtBoundary>();
        boundary = b;
      } else if o == "-m" || o == "--mode" {
        let style = value(o.as_str())?;
        mode = style
          .parse()
          .ok()
          .and_then(NonTerminalMode::from_style)
          .ok_or_else(|| Self::make_error_message(&format!("bad mode '{}'", style), &prog_name))?;
      } else if o == "-s" || o == "--seed" {
        let s = value(o.as_str())?;
        seed = s
          .parse()
          .map_err(|_| Self::make_error_message(&format!("bad seed '{}'", s), &prog_name))?;
      } else if o == "-c" || o == "--conll" {
        conll = Some(value(o.as_str())?);
      } else if o == "-r" || o == "--random" {
        random = true;
      } else if o == "-n" || o == "--normalize" {
        normalize = true;
      } else if o.starts_with('-') {
        return Err(Self::make_error_message(&format!("unknown option {}", o), &prog_name));
      } else {
        positional.push(o);
      }
    }

    let mut positional = positional.into_iter();
    let command = match (positional.next().as_deref(), positional.next(), positional.next()) {
      (Some("build"), Some(chunk_file), None) => Command::Build { chunk_file },
      (Some("chunks"), Some(tree_file), None) => Command::Chunks { tree_file },
      (Some("eval"), Some(gold_file), Some(predicted_file)) => Command::Eval {
        gold_file,
        predicted_file,
      },
      (None, _, _) => return Err(Self::make_error_message("missing command", prog_name)),
      _ => return Err(Self::make_error_message("invalid arguments", prog_name)),
    };
    if positional.next().is_some() {
      return Err(Self::make_error_message("too many arguments", prog_name));
    }

    Ok(Self {
      command,
      labels,
      boundary,
      mode,
      random,
      seed,
      normalize,
      conll,
    })
  }
}

/// Labels in order of first appearance.
fn labels_of(instances: &[Instance]) -> Vec<String> {
  let mut labels: Vec<String> = Vec::new();
  for chunk in instances.iter().flat_map(|inst| &inst.chunks) {
    if !labels.contains(&chunk.label) {
      labels.push(chunk.label.clone());
    }
  }
  labels
}

fn build(opts: &Args, chunk_file: &str) -> Result<(), Err> {
  let instances = read_chunks(chunk_file, opts.normalize)?;
  let labels = match &opts.labels {
    Some(path) => load_label_list(path)?,
    None => labels_of(&instances),
  };
  let vocab = LabelVocab::from_labels(&labels, opts.mode);
  info!(labels = vocab.size(), "label vocabulary");

  let config = BuilderConfig {
    boundary: opts.boundary.clone(),
    mode: opts.mode,
  };
  let builder = match LatentTreeBuilder::new(&vocab, &config) {
    Ok(builder) => builder,
    Err(e) => {
      eprintln!("{}", Args::make_error_message(&format!("bad boundary: {}", e), "latent-chart"));
      process::exit(255);
    }
  };
  let mut rng = StdRng::seed_from_u64(opts.seed);

  let stdout = io::stdout();
  let mut out = BufWriter::new(stdout.lock());
  if opts.random {
    for tree in builder.build_latent_trees(&instances, &mut rng) {
      writeln!(out, "{}", tree)?;
    }
  } else {
    for latent in builder.build_dynamic_rbt_trees(&instances, &mut rng) {
      writeln!(out, "{}\t{}\t{}", latent.tree, latent.scope.start, latent.scope.end)?;
    }
  }
  out.flush()?;
  Ok(())
}

fn chunks(opts: &Args, tree_file: &str) -> Result<(), Err> {
  let trees = load_trees(tree_file, opts.normalize)?;
  let stdout = io::stdout();
  let mut out = BufWriter::new(stdout.lock());
  for tree in trees {
    writeln!(out, "{}", chunks_to_str(&tree.to_chunks()))?;
  }
  out.flush()?;
  Ok(())
}

fn eval(opts: &Args, gold_file: &str, predicted_file: &str) -> Result<(), Err> {
  let gold = load_trees(gold_file, opts.normalize)?;
  let predicted = load_trees(predicted_file, opts.normalize)?;
  if gold.len() != predicted.len() {
    return Err(format!("{} gold trees but {} predicted trees", gold.len(), predicted.len()).into());
  }

  let evaluator = eval_trees(&gold, &predicted);
  if let Some(path) = &opts.conll {
    let mut out = BufWriter::new(File::create(path)?);
    evaluator.write_conll(&mut out)?;
    out.flush()?;
  }
  println!(
    "{} sentences, {} invalid {}",
    evaluator.sentences(),
    evaluator.invalid(),
    evaluator.score()
  );
  Ok(())
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  match &opts.command {
    Command::Build { chunk_file } => build(&opts, chunk_file),
    Command::Chunks { tree_file } => chunks(&opts, tree_file),
    Command::Eval {
      gold_file,
      predicted_file,
    } => eval(&opts, gold_file, predicted_file),
  }
}
