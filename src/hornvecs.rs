//! [`HornVecs`]: a trained model, and everything you can do with one.

use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::args::{Args, ModelKind};
use crate::dictionary::{Dictionary, EntryType};
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::matrix::{Matrix, Vector};
use crate::model::Model;
use crate::model_file::{self, write_atomic};
use crate::reader::{TokenReader, EOS};
use crate::real;
use crate::trainer::{self, Summary};
use crate::vectors::Vectors;

/// Which part of a model [`HornVecs::dump`] prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DumpTarget {
    Args,
    Dict,
    Input,
    Output,
}

/// Precision and recall of a supervised model on a labeled corpus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestReport {
    /// Number of examples that had both features and labels.
    pub examples: u64,
    pub k: usize,
    pub precision: f64,
    pub recall: f64,
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "N\t{}", self.examples)?;
        writeln!(f, "P@{}\t{:.3}", self.k, self.precision)?;
        write!(f, "R@{}\t{:.3}", self.k, self.recall)
    }
}

/// A trained model.
///
/// Training and loading produce one; every query takes `&self`, so a model can
/// be shared between threads and queried concurrently.
pub struct HornVecs {
    dict: Dictionary,
    model: Model,
    summary: Option<Summary>,
    /// Unit-length vectors for every vocabulary word, built on first use by
    /// the similarity queries.
    neighbors: OnceLock<Vectors>,
}

fn with_extension(prefix: &Path, ext: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(".");
    path.push(ext);
    PathBuf::from(path)
}

impl HornVecs {
    fn from_parts(dict: Dictionary, model: Model, summary: Option<Summary>) -> Self {
        HornVecs {
            dict,
            model,
            summary,
            neighbors: OnceLock::new(),
        }
    }

    /// Train a model as described by `args`.
    pub fn train(args: Args) -> Result<Self> {
        HornVecs::train_with_cancel(args, &AtomicBool::new(false))
    }

    /// Train a model, giving up with [`Error::Interrupted`] as soon as
    /// `cancel` is set.
    pub fn train_with_cancel(args: Args, cancel: &AtomicBool) -> Result<Self> {
        let args = Arc::new(args.finalize()?);

        let pretrained = match &args.pretrained_vectors {
            Some(path) => {
                let vectors = Vectors::read_text(path)?;
                if vectors.size() != args.dim {
                    return Err(Error::config(format!(
                        "dimension of pretrained vectors ({}) does not match dim ({})",
                        vectors.size(),
                        args.dim
                    )));
                }
                Some(vectors)
            }
            None => None,
        };

        let file = File::open(&args.input).map_err(|e| Error::io(&args.input, e))?;
        let mut dict = Dictionary::new(args.clone());
        dict.read(&mut TokenReader::new(BufReader::new(file)))
            .map_err(|e| match e {
                Error::Stream(e) => Error::io(&args.input, e),
                other => other,
            })?;

        let input = match &pretrained {
            Some(vectors) => {
                dict.add_pretrained(vectors.words());
                let input = Matrix::new(dict.nwords() + args.bucket, args.dim)?;
                input.uniform(1.0 / args.dim as real, args.seed);
                for i in 0..vectors.num_words() {
                    match dict.id(vectors.word(i)) {
                        Some(id) if dict.kind(id) == EntryType::Word => input.set_row(id, &vectors[i]),
                        _ => {}
                    }
                }
                input
            }
            None => {
                let input = Matrix::new(dict.nwords() + args.bucket, args.dim)?;
                input.uniform(1.0 / args.dim as real, args.seed);
                input
            }
        };

        let kind = match args.model {
            ModelKind::Supervised => EntryType::Label,
            _ => EntryType::Word,
        };
        let counts = dict.counts(kind);
        let output = Matrix::new(counts.len(), args.dim)?;
        info!(
            "input matrix {}x{}, output matrix {}x{}",
            input.rows(),
            input.cols(),
            output.rows(),
            output.cols()
        );
        let loss = Loss::new(args.loss, &counts, args.neg);
        let model = Model::new(args, input, output, loss);

        let summary = trainer::train(&dict, &model, cancel)?;
        Ok(HornVecs::from_parts(dict, model, Some(summary)))
    }

    /// Load a model file written by [`save_model`](Self::save_model).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (dict, model) = model_file::load(path)?;
        info!(
            "loaded {}: {} words, {} labels",
            path.display(),
            dict.nwords(),
            dict.nlabels()
        );
        Ok(HornVecs::from_parts(dict, model, None))
    }

    /// Replace this model with the one in `path`. On error, `self` is left
    /// unchanged.
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<()> {
        *self = HornVecs::load(path)?;
        Ok(())
    }

    pub fn args(&self) -> &Args {
        self.model.args()
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn dim(&self) -> usize {
        self.model.dim()
    }

    /// How training went, if this model was trained rather than loaded.
    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        model_file::save(path.as_ref(), &self.dict, &self.model)
    }

    /// Write the vector of every vocabulary word in text format.
    pub fn save_vectors(&self, path: impl AsRef<Path>) -> Result<()> {
        write_atomic(path.as_ref(), |out| {
            writeln!(out, "{} {}", self.dict.nwords(), self.dim())?;
            for i in 0..self.dict.nwords() {
                let word = self.dict.word(i);
                writeln!(out, "{} {}", word, self.word_vector(word))?;
            }
            Ok(())
        })
    }

    /// Write the output matrix in text format, one row per class.
    pub fn save_output(&self, path: impl AsRef<Path>) -> Result<()> {
        let output = self.model.output();
        let offset = match self.args().model {
            ModelKind::Supervised => self.dict.nwords(),
            _ => 0,
        };
        write_atomic(path.as_ref(), |out| {
            writeln!(out, "{} {}", output.rows(), output.cols())?;
            for i in 0..output.rows() {
                writeln!(out, "{} {}", self.dict.word(offset + i), output.row_values(i))?;
            }
            Ok(())
        })
    }

    /// Write `<output>.bin` and `<output>.vec`, plus `<output>.output` if
    /// `saveOutput` was set.
    pub fn save_artifacts(&self) -> Result<()> {
        let prefix = &self.args().output;
        self.save_model(with_extension(prefix, "bin"))?;
        self.save_vectors(with_extension(prefix, "vec"))?;
        if self.args().save_output {
            self.save_output(with_extension(prefix, "output"))?;
        }
        Ok(())
    }

    /// The `k` most likely labels for the first line of `text`, best first,
    /// with their probabilities.
    pub fn predict(&self, text: &str, k: usize, threshold: real) -> Result<Vec<(real, String)>> {
        let mut reader = TokenReader::new(text.as_bytes());
        let (mut words, mut labels) = (vec![], vec![]);
        self.dict
            .get_labeled_line(&mut reader, &mut words, &mut labels)?;
        let mut state = self.model.state(0);
        let predictions = self.model.predict(&words, k, threshold, &mut state)?;
        Ok(predictions
            .into_iter()
            .map(|(score, lid)| (score.exp(), self.dict.label(lid).to_string()))
            .collect())
    }

    /// Precision and recall at `k` over every labeled line of `input`.
    pub fn test<R: BufRead>(&self, input: R, k: usize, threshold: real) -> Result<TestReport> {
        let mut reader = TokenReader::new(input);
        let mut state = self.model.state(0);
        let (mut words, mut labels) = (vec![], vec![]);
        let (mut examples, mut correct, mut npredictions, mut nlabels) = (0u64, 0u64, 0u64, 0u64);
        loop {
            let ntokens = self
                .dict
                .get_labeled_line(&mut reader, &mut words, &mut labels)?;
            if ntokens == 0 && reader.is_eof() {
                break;
            }
            if words.is_empty() || labels.is_empty() {
                continue;
            }
            let predictions = self.model.predict(&words, k, threshold, &mut state)?;
            correct += predictions
                .iter()
                .filter(|(_, lid)| labels.contains(lid))
                .count() as u64;
            examples += 1;
            npredictions += predictions.len() as u64;
            nlabels += labels.len() as u64;
        }
        let ratio = |a: u64, b: u64| if b == 0 { 0.0 } else { a as f64 / b as f64 };
        Ok(TestReport {
            examples,
            k,
            precision: ratio(correct, npredictions),
            recall: ratio(correct, nlabels),
        })
    }

    /// The vector for `word`: the mean of its own row and its subword rows.
    /// Words outside the vocabulary get a vector from their subwords alone,
    /// or zero if they have none.
    pub fn word_vector(&self, word: &str) -> Vector {
        let mut v = Vector::new(self.dim());
        self.model.compute_hidden(&self.dict.subwords(word), &mut v);
        v
    }

    /// The mean of the unit-length word vectors of the first line of `text`.
    /// Labels and words with a zero vector are skipped.
    pub fn sentence_vector(&self, text: &str) -> Result<Vector> {
        let mut reader = TokenReader::new(text.as_bytes());
        let mut sum = Vector::new(self.dim());
        let mut count = 0;
        while let Some(token) = reader.next_token()? {
            if token == EOS {
                break;
            }
            if token.starts_with(&self.args().label) {
                continue;
            }
            let v = self.word_vector(&token);
            let norm = v.norm();
            if norm > 0.0 {
                sum.add_vector(&v, 1.0 / norm);
                count += 1;
            }
        }
        if count > 0 {
            sum.mul(1.0 / count as real);
        }
        Ok(sum)
    }

    /// Each subword of `word` with its input row.
    pub fn ngram_vectors(&self, word: &str) -> Vec<(String, Vector)> {
        self.dict
            .subwords_with_strings(word)
            .into_iter()
            .map(|(id, ngram)| (ngram, self.model.input().row_values(id)))
            .collect()
    }

    fn neighbors(&self) -> &Vectors {
        self.neighbors.get_or_init(|| {
            let mut vectors = Vectors::new(self.dim());
            for i in 0..self.dict.nwords() {
                let word = self.dict.word(i);
                vectors.push(word.to_string(), self.word_vector(word).as_slice());
            }
            vectors.normalize_all();
            vectors
        })
    }

    /// The `k` vocabulary words closest to `word` by cosine similarity.
    pub fn nearest_neighbors(&self, word: &str, k: usize) -> Vec<(real, String)> {
        let query = self.word_vector(word);
        self.neighbors()
            .nearest(query.as_slice(), k, &[word])
            .into_iter()
            .map(|(sim, w)| (sim, w.to_string()))
            .collect()
    }

    /// Words closest to `b - a + c`: "`a` is to `b` as `c` is to ...".
    pub fn analogies(&self, a: &str, b: &str, c: &str, k: usize) -> Vec<(real, String)> {
        let unit = |word: &str| {
            let mut v = self.word_vector(word);
            let norm = v.norm();
            if norm > 0.0 {
                v.mul(1.0 / norm);
            }
            v
        };
        let (va, vb, vc) = (unit(a), unit(b), unit(c));
        self.neighbors()
            .analogy(va.as_slice(), vb.as_slice(), vc.as_slice(), k, &[a, b, c])
            .into_iter()
            .map(|(sim, w)| (sim, w.to_string()))
            .collect()
    }

    pub fn dump(&self, target: DumpTarget, out: &mut impl Write) -> io::Result<()> {
        match target {
            DumpTarget::Args => self.args().dump(out),
            DumpTarget::Dict => self.dict.dump(out),
            DumpTarget::Input => self.model.input().dump(out),
            DumpTarget::Output => self.model.output().dump(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names() {
        assert_eq!(
            with_extension(Path::new("out/model"), "bin"),
            PathBuf::from("out/model.bin")
        );
        assert_eq!(
            with_extension(Path::new("model.v2"), "vec"),
            PathBuf::from("model.v2.vec")
        );
    }

    #[test]
    fn report_format() {
        let report = TestReport {
            examples: 3,
            k: 1,
            precision: 2.0 / 3.0,
            recall: 2.0 / 3.0,
        };
        assert_eq!(report.to_string(), "N\t3\nP@1\t0.667\nR@1\t0.667");
    }
}
