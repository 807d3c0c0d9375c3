#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use hornvecs::{Args, HornVecs, LossKind, ModelKind};

pub const REVIEWS: &str = "great movie __label__pos\nbad movie __label__neg\n";

pub fn write_corpus(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

/// Small, single-threaded, quiet settings for `model`.
pub fn args(model: ModelKind, input: &Path, output: &Path) -> Args {
    Args {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        thread: 1,
        verbose: 0,
        seed: 7,
        ..Args::new(model)
    }
}

/// A classifier trained on [`REVIEWS`].
pub fn classifier(dir: &Path, loss: LossKind) -> HornVecs {
    let input = write_corpus(dir, "reviews.txt", REVIEWS);
    let args = Args {
        loss,
        dim: 10,
        epoch: 100,
        lr: 0.5,
        neg: 1,
        ..args(ModelKind::Supervised, &input, &dir.join("reviews"))
    };
    HornVecs::train(args).unwrap()
}
