use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hornvecs::reader::{TokenReader, EOS};
use hornvecs::{real, Args, DumpTarget, HornVecs, LossKind, ModelKind};

#[derive(Parser)]
#[command(about = "Subword-aware word vectors and text classification", long_about = None, version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a supervised classifier
    Supervised(TrainOptions),
    /// Train word vectors with the skipgram model
    Skipgram(TrainOptions),
    /// Train word vectors with the continuous bag of words model
    Cbow(TrainOptions),
    /// Evaluate a classifier on labeled data, printing N, P@k and R@k
    Test(PredictOptions),
    /// Print the most likely labels for each line of FILE
    Predict(PredictOptions),
    /// Print the most likely labels for each line of FILE, with probabilities
    PredictProb(PredictOptions),
    /// Print vectors for words read from stdin
    PrintWordVectors {
        #[arg(value_name = "MODEL")]
        model: PathBuf,
    },
    /// Print one vector per line of stdin
    PrintSentenceVectors {
        #[arg(value_name = "MODEL")]
        model: PathBuf,
    },
    /// Print the subwords of WORD and their vectors
    PrintNgrams {
        #[arg(value_name = "MODEL")]
        model: PathBuf,
        word: String,
    },
    /// Print the nearest neighbors of words read from stdin
    Nn {
        #[arg(value_name = "MODEL")]
        model: PathBuf,
        #[arg(default_value_t = 10)]
        k: usize,
    },
    /// Complete analogies "A B C" read from stdin (B - A + C)
    Analogies {
        #[arg(value_name = "MODEL")]
        model: PathBuf,
        #[arg(default_value_t = 10)]
        k: usize,
    },
    /// Print the hyperparameters, dictionary or a matrix of a model
    Dump {
        #[arg(value_name = "MODEL")]
        model: PathBuf,
        #[arg(value_enum)]
        what: DumpTarget,
    },
}

#[derive(clap::Args)]
struct PredictOptions {
    #[arg(value_name = "MODEL")]
    model: PathBuf,
    /// Input text, or `-` for stdin
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Number of labels to predict
    #[arg(default_value_t = 1)]
    k: usize,
    /// Minimum probability of a predicted label
    #[arg(default_value_t = 0.0)]
    threshold: real,
}

/// Training options. Anything left out takes the default for the chosen model.
#[derive(clap::Args)]
struct TrainOptions {
    /// Training file path
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Output file path prefix; `.bin` and `.vec` are appended
    #[arg(long, value_name = "PREFIX")]
    output: PathBuf,

    /// Learning rate [0.05, supervised 0.1]
    #[arg(long)]
    lr: Option<f64>,

    /// Change the rate of updates for the learning rate [100]
    #[arg(long = "lrUpdateRate", value_name = "N")]
    lr_update_rate: Option<u64>,

    /// Size of word vectors [100]
    #[arg(long)]
    dim: Option<usize>,

    /// Size of the context window [5]
    #[arg(long)]
    ws: Option<usize>,

    /// Number of epochs [5]
    #[arg(long)]
    epoch: Option<usize>,

    /// Minimal number of word occurrences [5, supervised 1]
    #[arg(long = "minCount", value_name = "N")]
    min_count: Option<u64>,

    /// Minimal number of label occurrences [0]
    #[arg(long = "minCountLabel", value_name = "N")]
    min_count_label: Option<u64>,

    /// Number of negatives sampled [5]
    #[arg(long)]
    neg: Option<usize>,

    /// Max length of word n-grams [1]
    #[arg(long = "wordNgrams", value_name = "N")]
    word_ngrams: Option<usize>,

    /// Loss function [ns, supervised softmax]
    #[arg(long, value_enum)]
    loss: Option<LossKind>,

    /// Number of hash buckets [2000000]
    #[arg(long)]
    bucket: Option<usize>,

    /// Min length of character n-grams [3, supervised 0]
    #[arg(long)]
    minn: Option<usize>,

    /// Max length of character n-grams [6, supervised 0]
    #[arg(long)]
    maxn: Option<usize>,

    /// Max gap between characters of skip-pattern subwords [0]
    #[arg(long = "maxSkip", value_name = "N")]
    max_skip: Option<usize>,

    /// Number of threads [12]
    #[arg(long)]
    thread: Option<usize>,

    /// Sampling threshold [0.0001]
    #[arg(long)]
    t: Option<f64>,

    /// Labels prefix [__label__]
    #[arg(long)]
    label: Option<String>,

    /// Verbosity level: 0 quiet, 1 summary, 2 progress bar [2]
    #[arg(long)]
    verbose: Option<u8>,

    /// Pretrained word vectors (.vec text format) for initialization
    #[arg(long = "pretrainedVectors", value_name = "FILE")]
    pretrained_vectors: Option<PathBuf>,

    /// Also write the output matrix to `<output>.output`
    #[arg(long = "saveOutput")]
    save_output: bool,

    /// Seed for random initialization [0]
    #[arg(long)]
    seed: Option<u64>,
}

impl TrainOptions {
    fn into_args(self, model: ModelKind) -> Args {
        let mut args = Args::new(model);
        args.input = self.input;
        args.output = self.output;
        args.pretrained_vectors = self.pretrained_vectors;
        args.save_output = self.save_output;
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field {
                    args.$field = value;
                })*
            };
        }
        set!(
            lr,
            lr_update_rate,
            dim,
            ws,
            epoch,
            min_count,
            min_count_label,
            neg,
            word_ngrams,
            loss,
            bucket,
            minn,
            maxn,
            max_skip,
            thread,
            t,
            label,
            verbose,
            seed
        );
        args
    }
}

fn init_logging(verbose: u8) {
    let default = if verbose == 0 { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("error opening {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn load(model: &Path) -> Result<HornVecs> {
    HornVecs::load(model).context("error loading model")
}

/// Train and save. Once `cancel` is set the workers finish their current
/// update and nothing is written.
fn train(model: ModelKind, options: TrainOptions, cancel: &AtomicBool) -> Result<()> {
    let args = options.into_args(model);
    let hv = HornVecs::train_with_cancel(args, cancel).context("training failed")?;
    if cancel.load(Ordering::Relaxed) {
        bail!("training interrupted; nothing was saved");
    }
    hv.save_artifacts().context("error saving model")?;
    Ok(())
}

/// A flag that Ctrl-C sets instead of killing the process.
fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
        .context("error installing the interrupt handler")?;
    Ok(cancel)
}

fn predict(options: PredictOptions, with_prob: bool, out: &mut impl Write) -> Result<()> {
    let hv = load(&options.model)?;
    let input = open_input(&options.file)?;
    for line in input.lines() {
        let line = line.context("error reading input")?;
        let predictions = hv.predict(&line, options.k, options.threshold)?;
        let mut first = true;
        for (prob, label) in predictions {
            if !first {
                write!(out, " ")?;
            }
            first = false;
            if with_prob {
                write!(out, "{label} {prob:.5}")?;
            } else {
                write!(out, "{label}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

fn run(command: Command) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match command {
        Command::Supervised(options) => train(ModelKind::Supervised, options, &*interrupt_flag()?)?,
        Command::Skipgram(options) => train(ModelKind::Skipgram, options, &*interrupt_flag()?)?,
        Command::Cbow(options) => train(ModelKind::Cbow, options, &*interrupt_flag()?)?,
        Command::Test(options) => {
            let hv = load(&options.model)?;
            let input = open_input(&options.file)?;
            let report = hv.test(input, options.k, options.threshold)?;
            writeln!(out, "{report}")?;
        }
        Command::Predict(options) => predict(options, false, &mut out)?,
        Command::PredictProb(options) => predict(options, true, &mut out)?,
        Command::PrintWordVectors { model } => {
            let hv = load(&model)?;
            let mut reader = TokenReader::new(io::stdin().lock());
            while let Some(word) = reader.next_token().context("error reading stdin")? {
                if word == EOS {
                    continue;
                }
                writeln!(out, "{} {}", word, hv.word_vector(&word))?;
            }
        }
        Command::PrintSentenceVectors { model } => {
            let hv = load(&model)?;
            for line in io::stdin().lock().lines() {
                let line = line.context("error reading stdin")?;
                writeln!(out, "{}", hv.sentence_vector(&line)?)?;
            }
        }
        Command::PrintNgrams { model, word } => {
            let hv = load(&model)?;
            for (ngram, v) in hv.ngram_vectors(&word) {
                writeln!(out, "{ngram} {v}")?;
            }
        }
        Command::Nn { model, k } => {
            let hv = load(&model)?;
            for line in io::stdin().lock().lines() {
                let line = line.context("error reading stdin")?;
                let word = line.trim();
                if word.is_empty() {
                    continue;
                }
                for (sim, neighbor) in hv.nearest_neighbors(word, k) {
                    writeln!(out, "{neighbor} {sim:.6}")?;
                }
                out.flush()?;
            }
        }
        Command::Analogies { model, k } => {
            let hv = load(&model)?;
            for line in io::stdin().lock().lines() {
                let line = line.context("error reading stdin")?;
                let words: Vec<&str> = line.split_whitespace().collect();
                let &[a, b, c] = words.as_slice() else {
                    eprintln!("{} words were entered; an analogy needs three", words.len());
                    continue;
                };
                for (sim, word) in hv.analogies(a, b, c, k) {
                    writeln!(out, "{word} {sim:.6}")?;
                }
                out.flush()?;
            }
        }
        Command::Dump { model, what } => {
            let hv = load(&model)?;
            hv.dump(what, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Supervised(o) | Command::Skipgram(o) | Command::Cbow(o) => o.verbose.unwrap_or(2),
        _ => 2,
    };
    init_logging(verbose);

    if let Err(err) = run(cli.command) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn options(dir: &Path) -> TrainOptions {
        let input = dir.join("reviews.txt");
        fs::write(&input, "great movie __label__pos\nbad movie __label__neg\n").unwrap();
        let args = ["hornvecs", "supervised", "--input"]
            .into_iter()
            .map(String::from)
            .chain([
                input.display().to_string(),
                "--output".to_string(),
                dir.join("reviews").display().to_string(),
                "--thread".to_string(),
                "1".to_string(),
                "--verbose".to_string(),
                "0".to_string(),
            ]);
        match Cli::parse_from(args).command {
            Command::Supervised(options) => options,
            _ => unreachable!(),
        }
    }

    #[test]
    fn interrupted_training_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(true);
        let err = train(ModelKind::Supervised, options(dir.path()), &cancel).unwrap_err();
        assert!(format!("{err:#}").contains("interrupted"), "{err:#}");
        assert!(!dir.path().join("reviews.bin").exists());
        assert!(!dir.path().join("reviews.vec").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn uninterrupted_training_saves_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        train(ModelKind::Supervised, options(dir.path()), &cancel).unwrap();
        assert!(dir.path().join("reviews.bin").exists());
        assert!(dir.path().join("reviews.vec").exists());
    }
}
