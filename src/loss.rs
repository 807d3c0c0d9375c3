//! Output layers: full softmax, hierarchical softmax and negative sampling.
//!
//! All three take the hidden vector in a [`State`], return the loss for one
//! target, leave the gradient with respect to the hidden vector in
//! `state.grad`, and update the rows of the output matrix they used.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use rand::Rng;

use crate::args::LossKind;
use crate::matrix::{Matrix, Vector};
use crate::model::State;
use crate::real;
use crate::tree::HuffmanTree;

const SIGMOID_TABLE_SIZE: usize = 512;
const MAX_SIGMOID: real = 8.0;
const LOG_TABLE_SIZE: usize = 512;

const NEGATIVE_TABLE_SIZE: usize = 10_000_000;
/// Negatives are drawn in proportion to `count^NEGATIVE_POWER`.
const NEGATIVE_POWER: f64 = 0.75;

/// Log used for prediction scores; never returns -inf.
pub fn std_log(x: real) -> real {
    (x + 1e-5).ln()
}

/// Precomputed sigmoid and log, used in the training hot loop.
pub struct Tables {
    sigmoid: Vec<real>,
    log: Vec<real>,
}

impl Default for Tables {
    fn default() -> Self {
        Tables::new()
    }
}

impl Tables {
    pub fn new() -> Self {
        let sigmoid = (0..=SIGMOID_TABLE_SIZE)
            .map(|i| {
                let x = (i as real * 2.0 * MAX_SIGMOID) / SIGMOID_TABLE_SIZE as real - MAX_SIGMOID;
                1.0 / (1.0 + (-x).exp())
            })
            .collect();
        let log = (0..=LOG_TABLE_SIZE)
            .map(|i| {
                let x = (i as real + 1e-5) / LOG_TABLE_SIZE as real;
                x.ln()
            })
            .collect();
        Tables { sigmoid, log }
    }

    /// Approximate the logistic function, 1 / (1 + e^-x).
    pub fn sigmoid(&self, x: real) -> real {
        if x < -MAX_SIGMOID {
            0.0
        } else if x > MAX_SIGMOID {
            1.0
        } else {
            let i = ((x + MAX_SIGMOID) * SIGMOID_TABLE_SIZE as real / MAX_SIGMOID / 2.0) as usize;
            self.sigmoid[i]
        }
    }

    /// Approximate natural log for `x` in `[0, 1]`.
    pub fn log(&self, x: real) -> real {
        if x > 1.0 {
            return 0.0;
        }
        let i = (x * LOG_TABLE_SIZE as real) as usize;
        self.log[i]
    }
}

/// Unigram table for drawing negative examples.
pub struct NegativeTable {
    table: Vec<u32>,
}

impl NegativeTable {
    pub fn new(counts: &[u64]) -> Self {
        let z: f64 = counts.iter().map(|&c| (c as f64).powf(NEGATIVE_POWER)).sum();
        let mut table = Vec::with_capacity(NEGATIVE_TABLE_SIZE + counts.len());
        for (i, &c) in counts.iter().enumerate() {
            let slots = ((c as f64).powf(NEGATIVE_POWER) * NEGATIVE_TABLE_SIZE as f64 / z).ceil();
            table.extend(std::iter::repeat(i as u32).take(slots as usize));
        }
        NegativeTable { table }
    }

    /// Draw one class, with replacement. The target itself may come up.
    pub fn sample(&self, rng: &mut impl Rng) -> usize {
        self.table[rng.gen_range(0..self.table.len())] as usize
    }
}

pub enum Strategy {
    Softmax,
    HierarchicalSoftmax(HuffmanTree),
    NegativeSampling { negatives: NegativeTable, neg: usize },
}

pub struct Loss {
    strategy: Strategy,
    tables: Tables,
}

/// The `k` best `(score, class)` pairs seen so far. Higher scores win; on a
/// tie the lower class id wins.
struct TopK {
    k: usize,
    heap: BinaryHeap<Reverse<(OrderedFloat<real>, Reverse<usize>)>>,
}

impl TopK {
    fn new(k: usize) -> Self {
        TopK {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    /// Score of the worst kept entry, once `k` entries are kept.
    fn floor(&self) -> Option<real> {
        if self.heap.len() < self.k {
            return None;
        }
        self.heap.peek().map(|Reverse((score, _))| score.0)
    }

    fn push(&mut self, score: real, class: usize) {
        if matches!(self.floor(), Some(floor) if score < floor) {
            return;
        }
        self.heap.push(Reverse((OrderedFloat(score), Reverse(class))));
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    fn into_sorted(self) -> Vec<(real, usize)> {
        let mut entries: Vec<_> = self.heap.into_iter().map(|Reverse(e)| e).collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries
            .into_iter()
            .map(|(score, Reverse(class))| (score.0, class))
            .collect()
    }
}

/// `output = softmax(wo · hidden)`
fn compute_output_softmax(wo: &Matrix, hidden: &Vector, output: &mut Vector) {
    output.mul_matrix(wo, hidden);
    let max = (0..output.len()).map(|i| output[i]).fold(real::MIN, real::max);
    let mut z = 0.0;
    for i in 0..output.len() {
        output[i] = (output[i] - max).exp();
        z += output[i];
    }
    output.mul(1.0 / z);
}

impl Loss {
    /// Build the output layer for classes with the given counts.
    pub fn new(kind: LossKind, counts: &[u64], neg: usize) -> Self {
        let strategy = match kind {
            LossKind::Softmax => Strategy::Softmax,
            LossKind::Hs => Strategy::HierarchicalSoftmax(HuffmanTree::new(counts)),
            LossKind::Ns => Strategy::NegativeSampling {
                negatives: NegativeTable::new(counts),
                neg,
            },
        };
        Loss {
            strategy,
            tables: Tables::new(),
        }
    }

    /// Hierarchical softmax over an existing tree, as stored in a model file.
    pub fn hierarchical(tree: HuffmanTree) -> Self {
        Loss {
            strategy: Strategy::HierarchicalSoftmax(tree),
            tables: Tables::new(),
        }
    }

    pub fn tree(&self) -> Option<&HuffmanTree> {
        match &self.strategy {
            Strategy::HierarchicalSoftmax(tree) => Some(tree),
            _ => None,
        }
    }

    /// One logistic regression step on output row `target`.
    fn binary_logistic(
        &self,
        wo: &Matrix,
        target: usize,
        label: bool,
        lr: real,
        state: &mut State,
    ) -> real {
        let score = self.tables.sigmoid(wo.dot_row(&state.hidden, target));
        let alpha = lr * (if label { 1.0 } else { 0.0 } - score);
        state.grad.add_row(wo, target, alpha);
        wo.add_to_row(&state.hidden, target, alpha);
        if label {
            -self.tables.log(score)
        } else {
            -self.tables.log(1.0 - score)
        }
    }

    /// Compute the loss for `target`, fill `state.grad`, and update `wo`.
    pub fn forward(&self, wo: &Matrix, target: usize, lr: real, state: &mut State) -> real {
        state.grad.zero();
        match &self.strategy {
            Strategy::NegativeSampling { negatives, neg } => {
                let mut loss = self.binary_logistic(wo, target, true, lr, state);
                for _ in 0..*neg {
                    let negative = negatives.sample(&mut state.rng);
                    loss += self.binary_logistic(wo, negative, false, lr, state);
                }
                loss
            }
            Strategy::HierarchicalSoftmax(tree) => {
                let mut loss = 0.0;
                for (&row, &bit) in tree.path(target).iter().zip(tree.code(target)) {
                    loss += self.binary_logistic(wo, row, bit, lr, state);
                }
                loss
            }
            Strategy::Softmax => {
                compute_output_softmax(wo, &state.hidden, &mut state.output);
                for i in 0..wo.rows() {
                    let label = if i == target { 1.0 } else { 0.0 };
                    let alpha = lr * (label - state.output[i]);
                    state.grad.add_row(wo, i, alpha);
                    wo.add_to_row(&state.hidden, i, alpha);
                }
                -self.tables.log(state.output[target])
            }
        }
    }

    /// The `k` most likely classes for `state.hidden` with probability at
    /// least `threshold`, as `(log probability, class)` pairs, best first.
    pub fn predict(
        &self,
        wo: &Matrix,
        k: usize,
        threshold: real,
        state: &mut State,
    ) -> Vec<(real, usize)> {
        let mut top = TopK::new(k);
        match &self.strategy {
            Strategy::HierarchicalSoftmax(tree) => {
                self.dfs(tree, wo, threshold, tree.root(), 0.0, &mut top, &state.hidden);
            }
            _ => {
                compute_output_softmax(wo, &state.hidden, &mut state.output);
                for i in 0..state.output.len() {
                    let p = state.output[i];
                    if p < threshold {
                        continue;
                    }
                    top.push(std_log(p), i);
                }
            }
        }
        top.into_sorted()
    }

    /// Walk the tree, pruning branches that can't beat the current top `k`.
    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        tree: &HuffmanTree,
        wo: &Matrix,
        threshold: real,
        node: usize,
        score: real,
        top: &mut TopK,
        hidden: &Vector,
    ) {
        if score < std_log(threshold) {
            return;
        }
        if matches!(top.floor(), Some(floor) if score < floor) {
            return;
        }
        if tree.is_leaf(node) {
            top.push(score, node);
            return;
        }
        let f = self.tables.sigmoid(wo.dot_row(hidden, node - tree.leaves()));
        let n = tree.node(node);
        if let (Some(left), Some(right)) = (n.left, n.right) {
            self.dfs(tree, wo, threshold, left, score + std_log(1.0 - f), top, hidden);
            self.dfs(tree, wo, threshold, right, score + std_log(f), top, hidden);
        }
    }
}
