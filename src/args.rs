//! Training hyperparameters.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which training objective to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum ModelKind {
    /// Predict a word from the average of its context.
    Cbow,
    /// Predict each context word from the center word.
    Skipgram,
    /// Predict a label from the average of a line's features.
    Supervised,
}

/// How the output layer turns a hidden vector into a loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum LossKind {
    /// Negative sampling.
    Ns,
    /// Hierarchical softmax.
    Hs,
    /// Full softmax.
    Softmax,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::Cbow => "cbow",
            ModelKind::Skipgram => "sg",
            ModelKind::Supervised => "sup",
        })
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LossKind::Ns => "ns",
            LossKind::Hs => "hs",
            LossKind::Softmax => "softmax",
        })
    }
}

/// Immutable snapshot of the training configuration.
///
/// Built once before training, shared by the dictionary, model and trainer,
/// and stored in the model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Args {
    /// Training corpus.
    pub input: PathBuf,
    /// Output prefix; `.bin`, `.vec` and `.output` are appended.
    pub output: PathBuf,
    pub model: ModelKind,
    pub loss: LossKind,
    /// Starting learning rate.
    pub lr: f64,
    /// Number of tokens a worker processes between learning rate updates.
    pub lr_update_rate: u64,
    /// Embedding dimension.
    pub dim: usize,
    /// Maximum context window radius.
    pub ws: usize,
    pub epoch: usize,
    pub min_count: u64,
    pub min_count_label: u64,
    /// Number of negatives per positive example.
    pub neg: usize,
    /// Longest word n-gram hashed into buckets (1 = words only).
    pub word_ngrams: usize,
    /// Number of hash buckets for character and word n-grams.
    pub bucket: usize,
    pub minn: usize,
    pub maxn: usize,
    /// Largest gap between characters of a skip-pattern subword; 0 disables them.
    pub max_skip: usize,
    pub thread: usize,
    /// Subsampling threshold.
    pub t: f64,
    /// Prefix that marks a token as a label.
    pub label: String,
    pub verbose: u8,
    pub pretrained_vectors: Option<PathBuf>,
    pub save_output: bool,
    /// Seed for parameter initialization; worker `i` uses `seed + i`.
    pub seed: u64,
}

impl Default for Args {
    fn default() -> Self {
        Args::new(ModelKind::Skipgram)
    }
}

impl Args {
    /// Defaults for the given training mode.
    pub fn new(model: ModelKind) -> Self {
        let mut args = Args {
            input: PathBuf::new(),
            output: PathBuf::new(),
            model,
            loss: LossKind::Ns,
            lr: 0.05,
            lr_update_rate: 100,
            dim: 100,
            ws: 5,
            epoch: 5,
            min_count: 5,
            min_count_label: 0,
            neg: 5,
            word_ngrams: 1,
            bucket: 2_000_000,
            minn: 3,
            maxn: 6,
            max_skip: 0,
            thread: 12,
            t: 1e-4,
            label: "__label__".to_string(),
            verbose: 2,
            pretrained_vectors: None,
            save_output: false,
            seed: 0,
        };
        if model == ModelKind::Supervised {
            args.loss = LossKind::Softmax;
            args.min_count = 1;
            args.minn = 0;
            args.maxn = 0;
            args.lr = 0.1;
        }
        args
    }

    /// Check every option against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.input.as_os_str().is_empty() {
            return Err(Error::config("input path is empty"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(Error::config("output path is empty"));
        }
        if self.input.as_os_str() == "-" {
            return Err(Error::config("cannot use stdin for training"));
        }
        let positive = [
            ("dim", self.dim),
            ("ws", self.ws),
            ("epoch", self.epoch),
            ("thread", self.thread),
            ("wordNgrams", self.word_ngrams),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::config(format!("{name} must be at least 1")));
            }
        }
        if self.lr_update_rate == 0 {
            return Err(Error::config("lrUpdateRate must be at least 1"));
        }
        if !(self.lr > 0.0) {
            return Err(Error::config(format!("lr must be positive, got {}", self.lr)));
        }
        if !(self.t > 0.0) {
            return Err(Error::config(format!("t must be positive, got {}", self.t)));
        }
        if self.maxn > 0 && self.minn > self.maxn {
            return Err(Error::config(format!(
                "minn ({}) must not exceed maxn ({})",
                self.minn, self.maxn
            )));
        }
        if self.label.is_empty() {
            return Err(Error::config("label prefix is empty"));
        }
        Ok(())
    }

    /// Validate, then drop the bucket table when nothing would be hashed into it.
    pub fn finalize(mut self) -> Result<Self> {
        self.validate()?;
        if self.word_ngrams <= 1 && self.maxn == 0 {
            self.bucket = 0;
        }
        Ok(self)
    }

    pub fn dump(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "dim {}", self.dim)?;
        writeln!(out, "ws {}", self.ws)?;
        writeln!(out, "epoch {}", self.epoch)?;
        writeln!(out, "minCount {}", self.min_count)?;
        writeln!(out, "minCountLabel {}", self.min_count_label)?;
        writeln!(out, "neg {}", self.neg)?;
        writeln!(out, "wordNgrams {}", self.word_ngrams)?;
        writeln!(out, "loss {}", self.loss)?;
        writeln!(out, "model {}", self.model)?;
        writeln!(out, "bucket {}", self.bucket)?;
        writeln!(out, "minn {}", self.minn)?;
        writeln!(out, "maxn {}", self.maxn)?;
        writeln!(out, "maxSkip {}", self.max_skip)?;
        writeln!(out, "lrUpdateRate {}", self.lr_update_rate)?;
        writeln!(out, "t {}", self.t)?;
        writeln!(out, "label {}", self.label)?;
        Ok(())
    }
}
