//! Multithreaded Hogwild training loop.
//!
//! Every worker opens its own handle on the corpus, seeks to its share of the
//! file, and loops over the corpus (rewinding at the end) until the workers
//! have together processed `epoch * ntokens` tokens. They all write to the
//! same parameter matrices without locks.

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::args::{Args, ModelKind};
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::matrix::Real;
use crate::model::Model;
use crate::reader::TokenReader;
use crate::real;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Linearly decayed learning rate after `processed` of `total` tokens.
pub fn learning_rate(lr0: f64, processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (lr0 * (1.0 - processed as f64 / total as f64)).max(0.0)
}

/// What a finished training run reports.
#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub tokens: u64,
    pub elapsed: Duration,
    /// Average loss seen by the first worker.
    pub loss: real,
}

struct Trainer<'a> {
    args: &'a Args,
    dict: &'a Dictionary,
    model: &'a Model,
    /// Tokens processed by all workers, updated in batches.
    processed: AtomicU64,
    total: u64,
    /// Running loss of worker 0, for progress reports.
    loss: Real,
    cancel: &'a AtomicBool,
    /// Set when a worker fails, so the rest stop early.
    failed: AtomicBool,
}

/// Train `model` on `args.input`. Stops early, with [`Error::Interrupted`],
/// if `cancel` is set.
pub fn train(dict: &Dictionary, model: &Model, cancel: &AtomicBool) -> Result<Summary> {
    let args = model.args();
    let trainer = Trainer {
        args,
        dict,
        model,
        processed: AtomicU64::new(0),
        total: args.epoch as u64 * dict.ntokens(),
        loss: Real::default(),
        cancel,
        failed: AtomicBool::new(false),
    };
    trainer.run()
}

impl<'a> Trainer<'a> {
    fn run(&self) -> Result<Summary> {
        let bar = if self.args.verbose >= 2 {
            ProgressBar::new(self.total)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {msg}",
        ) {
            bar.set_style(style);
        }

        info!(
            "training {} model on {} with {} threads",
            self.args.model,
            self.args.input.display(),
            self.args.thread
        );
        let start = Instant::now();
        let results: Vec<Result<real>> = thread::scope(|s| {
            let workers: Vec<_> = (0..self.args.thread)
                .map(|id| s.spawn(move || self.worker(id)))
                .collect();
            while !workers.iter().all(|w| w.is_finished()) {
                thread::sleep(POLL_INTERVAL);
                self.report(&bar, start);
            }
            workers
                .into_iter()
                .map(|w| w.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });
        bar.finish_and_clear();

        let mut loss = 0.0;
        for (id, result) in results.into_iter().enumerate() {
            let l = result?;
            if id == 0 {
                loss = l;
            }
        }
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Error::Interrupted);
        }

        let summary = Summary {
            tokens: self.processed.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
            loss,
        };
        info!(
            "trained on {} tokens in {:.1}s, avg.loss {:.6}",
            summary.tokens,
            summary.elapsed.as_secs_f64(),
            summary.loss
        );
        Ok(summary)
    }

    fn report(&self, bar: &ProgressBar, start: Instant) {
        let processed = self.processed.load(Ordering::Relaxed).min(self.total);
        let secs = start.elapsed().as_secs_f64().max(1e-3);
        let rate = processed as f64 / secs / self.args.thread as f64;
        bar.set_position(processed);
        bar.set_message(format!(
            "words/sec/thread: {:>7.0}  lr: {:.6}  loss: {:.6}",
            rate,
            learning_rate(self.args.lr, processed, self.total),
            self.loss.get()
        ));
    }

    fn stopped(&self) -> bool {
        self.cancel.load(Ordering::Relaxed) || self.failed.load(Ordering::Relaxed)
    }

    fn worker(&self, id: usize) -> Result<real> {
        let result = self.work(id);
        if let Err(err) = &result {
            warn!("worker {id} failed: {err}");
            self.failed.store(true, Ordering::Relaxed);
        }
        result
    }

    fn work(&self, id: usize) -> Result<real> {
        let path = &self.args.input;
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let size = file.metadata().map_err(|e| Error::io(path, e))?.len();
        let mut reader = TokenReader::new(BufReader::new(file));
        let offset = size * id as u64 / self.args.thread as u64;
        reader
            .seek_to_line(offset)
            .map_err(|e| Error::io(path, e))?;

        let mut state = self.model.state(self.args.seed.wrapping_add(id as u64));
        let mut line = vec![];
        let mut labels = vec![];
        let mut local = 0u64;
        while self.processed.load(Ordering::Relaxed) < self.total {
            if self.stopped() {
                break;
            }
            let processed = self.processed.load(Ordering::Relaxed);
            let lr = learning_rate(self.args.lr, processed, self.total) as real;
            local += match self.args.model {
                ModelKind::Supervised => {
                    let n = self
                        .dict
                        .get_labeled_line(&mut reader, &mut line, &mut labels)
                        .map_err(|e| Error::io(path, e))?;
                    self.model.train_supervised(&line, &labels, lr, &mut state);
                    n
                }
                ModelKind::Cbow => {
                    let n = self
                        .dict
                        .get_line(&mut reader, &mut line, &mut state.rng)
                        .map_err(|e| Error::io(path, e))?;
                    self.model.train_cbow(self.dict, &line, lr, &mut state);
                    n
                }
                ModelKind::Skipgram => {
                    let n = self
                        .dict
                        .get_line(&mut reader, &mut line, &mut state.rng)
                        .map_err(|e| Error::io(path, e))?;
                    self.model.train_skipgram(self.dict, &line, lr, &mut state);
                    n
                }
            };
            if local > self.args.lr_update_rate {
                self.processed.fetch_add(local, Ordering::Relaxed);
                local = 0;
                if id == 0 {
                    self.loss.set(state.average_loss());
                }
            }
            if reader.is_eof() {
                reader.rewind().map_err(|e| Error::io(path, e))?;
            }
        }
        self.processed.fetch_add(local, Ordering::Relaxed);
        Ok(state.average_loss())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learning_rate_decays_to_zero() {
        let total = 1000;
        let mut last = f64::INFINITY;
        for processed in (0..=total + 100).step_by(50) {
            let lr = learning_rate(0.1, processed, total);
            assert!(lr <= last);
            assert!(lr >= 0.0);
            last = lr;
        }
        assert_eq!(learning_rate(0.1, 0, total), 0.1);
        assert_eq!(learning_rate(0.1, total, total), 0.0);
        assert_eq!(learning_rate(0.1, total * 2, total), 0.0);
        assert_eq!(learning_rate(0.1, 0, 0), 0.0);
    }
}
