//! Plain word-vector tables: text `.vec` files and similarity queries.

use std::cmp::Reverse;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Index;
use std::path::Path;

use ordered_float::OrderedFloat;

use crate::error::{Error, Result};
use crate::matrix::{dot, norm};
use crate::real;

pub struct Vectors {
    /// Embedding vector length (number of dimensions).
    size: usize,

    /// The vocabulary.
    vocab: Vec<String>,

    /// `embeddings[k * size..(k+1) * size]` is the vector embedding for word `k`.
    embeddings: Vec<real>,
}

/// Scale `v` to unit length. Zero vectors are left alone.
pub fn normalize(v: &mut [real]) {
    let len = norm(v);
    if len > 0.0 {
        for e in v {
            *e /= len;
        }
    }
}

impl Index<usize> for Vectors {
    type Output = [real];

    fn index(&self, i: usize) -> &[real] {
        &self.embeddings[i * self.size..][..self.size]
    }
}

impl Vectors {
    pub fn new(size: usize) -> Self {
        Vectors {
            size,
            vocab: vec![],
            embeddings: vec![],
        }
    }

    pub fn push(&mut self, word: String, v: &[real]) {
        assert_eq!(v.len(), self.size);
        self.vocab.push(word);
        self.embeddings.extend_from_slice(v);
    }

    /// Read a text vectors file: a `count dim` header line, then one
    /// `word v1 ... vdim` line per word.
    pub fn read_text(file_name: &Path) -> Result<Self> {
        let f = BufReader::new(File::open(file_name).map_err(|e| Error::io(file_name, e))?);
        let mut lines = f.lines();
        let header = match lines.next() {
            Some(line) => line.map_err(|e| Error::io(file_name, e))?,
            None => return Err(Error::format(file_name, "missing header line")),
        };
        let mut fields = header.split_whitespace();
        let mut field = |name: &str| -> Result<usize> {
            fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::format(file_name, format!("invalid {name} in header")))
        };
        let num_words = field("word count")?;
        let size = field("dimension")?;

        let mut vectors = Vectors::new(size);
        let mut row = Vec::with_capacity(size);
        for line in lines.take(num_words) {
            let line = line.map_err(|e| Error::io(file_name, e))?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            row.clear();
            for value in fields {
                let x: real = value.parse().map_err(|_| {
                    Error::format(file_name, format!("invalid number {value:?} for {word:?}"))
                })?;
                row.push(x);
            }
            if row.len() != size {
                return Err(Error::format(
                    file_name,
                    format!("{word:?} has {} values, expected {size}", row.len()),
                ));
            }
            vectors.push(word.to_string(), &row);
        }
        Ok(vectors)
    }

    pub fn num_words(&self) -> usize {
        self.vocab.len()
    }

    /// Returns the vector size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the word for a word-index. Panics if `word` is out of range.
    pub fn word(&self, word: usize) -> &str {
        &self.vocab[word]
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.vocab.iter().map(String::as_str)
    }

    /// Scale every vector to unit length, so dot products are cosines.
    pub fn normalize_all(&mut self) {
        if self.size == 0 {
            return;
        }
        for row in self.embeddings.chunks_mut(self.size) {
            normalize(row);
        }
    }

    /// The `k` words most similar to `query`, skipping any word in `exclude`.
    /// Assumes the table is normalized; `query` need not be.
    pub fn nearest(&self, query: &[real], k: usize, exclude: &[&str]) -> Vec<(real, &str)> {
        let mut query = query.to_vec();
        normalize(&mut query);
        let mut best: Vec<(real, &str)> = (0..self.num_words())
            .filter(|&c| !exclude.contains(&self.word(c)))
            .map(|c| (dot(&query, &self[c]), self.word(c)))
            .collect();
        best.sort_by_key(|&(dist, _word)| Reverse(OrderedFloat(dist)));
        best.truncate(k);
        best
    }

    /// Words closest to `b - a + c`, as in "a is to b as c is to ?".
    pub fn analogy(
        &self,
        a: &[real],
        b: &[real],
        c: &[real],
        k: usize,
        exclude: &[&str],
    ) -> Vec<(real, &str)> {
        let mut query = vec![0.0; self.size];
        for i in 0..self.size {
            query[i] = b[i] - a[i] + c[i];
        }
        self.nearest(&query, k, exclude)
    }
}
