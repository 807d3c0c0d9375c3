//! Dense vectors and the shared parameter matrices.
//!
//! Training threads update the same matrices concurrently without any
//! locking ("Hogwild" SGD). Each cell is a [`Real`], an `f32` stored in an
//! `AtomicU32` with relaxed loads and stores. `Real::add` is a load followed
//! by a store, so two threads updating the same cell can lose one of the
//! updates; training tolerates that as noise.

use std::fmt;
use std::io::{self, Read, Write};
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU32, Ordering};

use aligned_box::AlignedBox;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::real;

const ALIGNMENT: usize = 128;

#[derive(Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

impl Real {
    pub fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn add(&self, x: real) {
        let a = self.get();
        self.set(a + x);
    }
}

pub fn norm(v: &[real]) -> real {
    v.iter().copied().map(|e| e * e).sum::<real>().sqrt()
}

pub fn dot(a: &[real], b: &[real]) -> real {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&a, &b)| a * b).sum()
}

/// A thread-local dense vector: hidden layers, gradients, query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    data: Vec<real>,
}

impl Vector {
    pub fn new(len: usize) -> Self {
        Vector {
            data: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[real] {
        &self.data
    }

    pub fn zero(&mut self) {
        self.data.fill(0.0);
    }

    pub fn mul(&mut self, a: real) {
        for e in &mut self.data {
            *e *= a;
        }
    }

    pub fn norm(&self) -> real {
        norm(&self.data)
    }

    /// `self += a * other`
    pub fn add_vector(&mut self, other: &Vector, a: real) {
        assert_eq!(self.len(), other.len());
        for (x, &y) in self.data.iter_mut().zip(other.data.iter()) {
            *x += a * y;
        }
    }

    /// `self += a * matrix[i]`
    pub fn add_row(&mut self, matrix: &Matrix, i: usize, a: real) {
        for (x, cell) in self.data.iter_mut().zip(matrix.row(i)) {
            *x += a * cell.get();
        }
    }

    /// `self[i] = matrix[i] · v` for every row of `matrix`.
    pub fn mul_matrix(&mut self, matrix: &Matrix, v: &Vector) {
        assert_eq!(self.len(), matrix.rows());
        for (i, out) in self.data.iter_mut().enumerate() {
            *out = matrix.dot_row(v, i);
        }
    }
}

impl From<Vec<real>> for Vector {
    fn from(data: Vec<real>) -> Self {
        Vector { data }
    }
}

impl Index<usize> for Vector {
    type Output = real;

    fn index(&self, i: usize) -> &real {
        &self.data[i]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, i: usize) -> &mut real {
        &mut self.data[i]
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, x) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{x:.5}")?;
        }
        Ok(())
    }
}

/// A row-major matrix of shared cells.
pub struct Matrix {
    rows: usize,
    cols: usize,
    /// `data[i * cols..(i+1) * cols]` is row `i`. Never empty, even for a 0x0 matrix.
    data: AlignedBox<[Real]>,
}

impl Matrix {
    /// A zero-filled `rows` x `cols` matrix.
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or(Error::Alloc { rows, cols })?;
        let data = AlignedBox::slice_from_default(ALIGNMENT, len.max(1))
            .map_err(|_| Error::Alloc { rows, cols })?;
        Ok(Matrix { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn cells(&self) -> &[Real] {
        &self.data[..self.rows * self.cols]
    }

    pub fn row(&self, i: usize) -> &[Real] {
        &self.data[i * self.cols..][..self.cols]
    }

    pub fn row_values(&self, i: usize) -> Vector {
        self.row(i).iter().map(Real::get).collect::<Vec<real>>().into()
    }

    pub fn set_row(&self, i: usize, values: &[real]) {
        assert_eq!(values.len(), self.cols);
        for (cell, &v) in self.row(i).iter().zip(values) {
            cell.set(v);
        }
    }

    pub fn zero(&self) {
        for cell in self.cells() {
            cell.set(0.0);
        }
    }

    /// Fill with values drawn uniformly from `[-a, a]`.
    pub fn uniform(&self, a: real, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = Uniform::new_inclusive(-a, a);
        for cell in self.cells() {
            cell.set(dist.sample(&mut rng));
        }
    }

    pub fn dot_row(&self, v: &Vector, i: usize) -> real {
        assert_eq!(v.len(), self.cols);
        self.row(i)
            .iter()
            .zip(v.as_slice())
            .map(|(cell, &x)| cell.get() * x)
            .sum()
    }

    /// `self[i] += a * v`
    pub fn add_to_row(&self, v: &Vector, i: usize, a: real) {
        assert_eq!(v.len(), self.cols);
        for (cell, &x) in self.row(i).iter().zip(v.as_slice()) {
            cell.add(a * x);
        }
    }

    /// Write the shape as two `u64`s followed by the raw values.
    pub fn save(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(bytemuck::bytes_of(&(self.rows as u64)))?;
        out.write_all(bytemuck::bytes_of(&(self.cols as u64)))?;
        let mut buf: Vec<real> = Vec::with_capacity(self.cols);
        for i in 0..self.rows {
            buf.clear();
            buf.extend(self.row(i).iter().map(Real::get));
            out.write_all(bytemuck::cast_slice::<real, u8>(&buf))?;
        }
        Ok(())
    }

    /// Read a matrix written by [`Matrix::save`].
    ///
    /// I/O errors, including a stream that ends early, come back as
    /// [`Error::Stream`] so the caller can attach the file name.
    pub fn load(input: &mut impl Read) -> Result<Self> {
        let (rows, cols) = Matrix::read_shape(input)?;
        Matrix::read_values(input, rows, cols)
    }

    /// Read just the `(rows, cols)` header, so it can be checked before
    /// anything is allocated.
    pub fn read_shape(input: &mut impl Read) -> Result<(usize, usize)> {
        let mut shape = [0u64; 2];
        input.read_exact(bytemuck::cast_slice_mut::<u64, u8>(&mut shape))?;
        Ok((shape[0] as usize, shape[1] as usize))
    }

    /// Read the values that follow a shape header.
    pub fn read_values(input: &mut impl Read, rows: usize, cols: usize) -> Result<Self> {
        let matrix = Matrix::new(rows, cols)?;
        let mut buf: Vec<real> = vec![0.0; cols];
        for i in 0..rows {
            input.read_exact(bytemuck::cast_slice_mut::<real, u8>(&mut buf))?;
            matrix.set_row(i, &buf);
        }
        Ok(matrix)
    }

    pub fn dump(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{} {}", self.rows, self.cols)?;
        for i in 0..self.rows {
            writeln!(out, "{}", self.row_values(i))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_arithmetic() {
        let mut v = Vector::from(vec![3.0, 4.0]);
        assert_eq!(v.norm(), 5.0);
        v.mul(0.5);
        assert_eq!(v.as_slice(), &[1.5, 2.0]);
        v.add_vector(&Vector::from(vec![1.0, -1.0]), 2.0);
        assert_eq!(v.as_slice(), &[3.5, 0.0]);
        assert_eq!(v.to_string(), "3.50000 0.00000");
    }

    #[test]
    fn row_operations() {
        let m = Matrix::new(3, 2).unwrap();
        m.set_row(1, &[1.0, 2.0]);
        let v = Vector::from(vec![10.0, 100.0]);
        assert_eq!(m.dot_row(&v, 1), 210.0);
        assert_eq!(m.dot_row(&v, 0), 0.0);

        m.add_to_row(&v, 2, 0.5);
        assert_eq!(m.row_values(2).as_slice(), &[5.0, 50.0]);

        let mut acc = Vector::new(2);
        acc.add_row(&m, 1, -1.0);
        assert_eq!(acc.as_slice(), &[-1.0, -2.0]);

        let mut out = Vector::new(3);
        out.mul_matrix(&m, &Vector::from(vec![1.0, 1.0]));
        assert_eq!(out.as_slice(), &[0.0, 3.0, 55.0]);
    }

    #[test]
    fn uniform_is_bounded_and_seeded() {
        let a = Matrix::new(10, 10).unwrap();
        let b = Matrix::new(10, 10).unwrap();
        a.uniform(0.1, 7);
        b.uniform(0.1, 7);
        for i in 0..10 {
            let row = a.row_values(i);
            assert_eq!(row, b.row_values(i));
            assert!(row.as_slice().iter().all(|x| x.abs() <= 0.1));
        }
    }

    #[test]
    fn save_and_load() {
        let m = Matrix::new(2, 3).unwrap();
        m.uniform(1.0, 1);
        let mut bytes = vec![];
        m.save(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 16 + 6 * 4);

        let loaded = Matrix::load(&mut bytes.as_slice()).unwrap();
        assert_eq!((loaded.rows(), loaded.cols()), (2, 3));
        for i in 0..2 {
            assert_eq!(loaded.row_values(i), m.row_values(i));
        }

        let truncated = &bytes[..bytes.len() - 1];
        assert!(Matrix::load(&mut &truncated[..]).is_err());
    }

    #[test]
    fn empty_matrix() {
        let m = Matrix::new(0, 4).unwrap();
        assert_eq!(m.rows(), 0);
        m.zero();
        let mut bytes = vec![];
        m.save(&mut bytes).unwrap();
        assert_eq!(Matrix::load(&mut bytes.as_slice()).unwrap().rows(), 0);
    }
}
