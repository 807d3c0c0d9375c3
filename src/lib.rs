//! Subword-aware word embeddings and text classification.
//!
//! Train with [`HornVecs::train`] from an [`Args`] preset, or load a saved
//! model with [`HornVecs::load`]; then query word and sentence vectors,
//! nearest neighbors, or label predictions.

pub mod args;
pub mod dictionary;
pub mod error;
mod hornvecs;
pub mod loss;
pub mod matrix;
pub mod model;
pub mod model_file;
pub mod reader;
pub mod trainer;
pub mod tree;
pub mod vectors;

pub use crate::args::{Args, LossKind, ModelKind};
pub use crate::error::{Error, Result};
pub use crate::hornvecs::{DumpTarget, HornVecs, TestReport};
pub use crate::matrix::Vector;

#[allow(non_camel_case_types)]
pub type real = f32;
