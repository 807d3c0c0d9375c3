//! The shallow network: input embeddings, output weights and a loss.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::args::{Args, ModelKind};
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::matrix::{Matrix, Vector};
use crate::real;

/// Scratch space owned by one thread: the hidden layer, the output layer,
/// the gradient, a random number generator, and a running loss average.
pub struct State {
    pub hidden: Vector,
    pub output: Vector,
    pub grad: Vector,
    pub rng: StdRng,
    loss: f64,
    nexamples: u64,
}

impl State {
    pub fn new(dim: usize, osz: usize, seed: u64) -> Self {
        State {
            hidden: Vector::new(dim),
            output: Vector::new(osz),
            grad: Vector::new(dim),
            rng: StdRng::seed_from_u64(seed),
            loss: 0.0,
            nexamples: 0,
        }
    }

    /// Mean loss per example since this state was created.
    pub fn average_loss(&self) -> real {
        if self.nexamples == 0 {
            0.0
        } else {
            (self.loss / self.nexamples as f64) as real
        }
    }

    fn record(&mut self, loss: real) {
        self.loss += loss as f64;
        self.nexamples += 1;
    }
}

pub struct Model {
    args: Arc<Args>,
    /// One row per word, then one per hash bucket.
    input: Matrix,
    /// One row per output class (or per internal tree node, for hierarchical softmax).
    output: Matrix,
    loss: Loss,
}

impl Model {
    pub fn new(args: Arc<Args>, input: Matrix, output: Matrix, loss: Loss) -> Self {
        Model {
            args,
            input,
            output,
            loss,
        }
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn input(&self) -> &Matrix {
        &self.input
    }

    pub fn output(&self) -> &Matrix {
        &self.output
    }

    pub fn loss(&self) -> &Loss {
        &self.loss
    }

    pub fn dim(&self) -> usize {
        self.input.cols()
    }

    /// Fresh scratch space sized for this model.
    pub fn state(&self, seed: u64) -> State {
        State::new(self.dim(), self.output.rows(), seed)
    }

    /// `hidden` = mean of the input rows in `input`; zero if `input` is empty.
    pub fn compute_hidden(&self, input: &[usize], hidden: &mut Vector) {
        hidden.zero();
        if input.is_empty() {
            return;
        }
        for &i in input {
            hidden.add_row(&self.input, i, 1.0);
        }
        hidden.mul(1.0 / input.len() as real);
    }

    /// One SGD step: predict `target` from the average of `input`.
    pub fn update(&self, input: &[usize], target: usize, lr: real, state: &mut State) {
        if input.is_empty() {
            return;
        }
        self.compute_hidden(input, &mut state.hidden);
        let loss = self.loss.forward(&self.output, target, lr, state);
        state.record(loss);

        state.grad.mul(1.0 / input.len() as real);
        for &i in input {
            self.input.add_to_row(&state.grad, i, 1.0);
        }
    }

    /// Each word is predicted from the subwords of the words around it.
    pub fn train_cbow(&self, dict: &Dictionary, line: &[usize], lr: real, state: &mut State) {
        let mut bow = vec![];
        for w in 0..line.len() {
            let boundary = state.rng.gen_range(1..=self.args.ws);
            bow.clear();
            let end = (w + boundary + 1).min(line.len());
            for c in w.saturating_sub(boundary)..end {
                if c != w {
                    bow.extend_from_slice(dict.subwords_of(line[c]));
                }
            }
            self.update(&bow, line[w], lr, state);
        }
    }

    /// Each word's subwords predict every word in its window.
    pub fn train_skipgram(&self, dict: &Dictionary, line: &[usize], lr: real, state: &mut State) {
        for w in 0..line.len() {
            let boundary = state.rng.gen_range(1..=self.args.ws);
            let ngrams = dict.subwords_of(line[w]);
            let end = (w + boundary + 1).min(line.len());
            for c in w.saturating_sub(boundary)..end {
                if c != w {
                    self.update(ngrams, line[c], lr, state);
                }
            }
        }
    }

    /// A line's features predict one of its labels, picked at random.
    pub fn train_supervised(&self, line: &[usize], labels: &[usize], lr: real, state: &mut State) {
        if labels.is_empty() || line.is_empty() {
            return;
        }
        let i = state.rng.gen_range(0..labels.len());
        self.update(line, labels[i], lr, state);
    }

    /// The `k` most likely labels for a line of features, best first, as
    /// `(log probability, label id)` pairs.
    pub fn predict(
        &self,
        input: &[usize],
        k: usize,
        threshold: real,
        state: &mut State,
    ) -> Result<Vec<(real, usize)>> {
        if k == 0 {
            return Err(Error::InvalidArgument("k needs to be 1 or higher".to_string()));
        }
        if self.args.model != ModelKind::Supervised {
            return Err(Error::InvalidArgument(
                "model needs to be supervised for prediction".to_string(),
            ));
        }
        if input.is_empty() {
            return Ok(vec![]);
        }
        self.compute_hidden(input, &mut state.hidden);
        Ok(self.loss.predict(&self.output, k, threshold, state))
    }
}
