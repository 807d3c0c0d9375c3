//! Error types for training, inference and model files.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Everything that can go wrong in the engine.
///
/// All of these are fatal for the operation that produced them; nothing is
/// retried.
#[derive(Debug, Error)]
pub enum Error {
    /// A required option is missing or out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Reading or writing a named file failed.
    #[error("error accessing {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading or writing an unnamed stream (stdin, stdout) failed.
    #[error("I/O error: {0}")]
    Stream(#[from] io::Error),

    /// A model file has the wrong magic number or version, or is truncated.
    #[error("invalid model file: {0}")]
    Format(String),

    /// The training data cannot produce a meaningful model.
    #[error("{0}")]
    Data(String),

    /// An inference call was made with arguments that can't be honored.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocating a parameter matrix failed.
    #[error("failed to allocate a {rows}x{cols} matrix")]
    Alloc { rows: usize, cols: usize },

    /// Training was cancelled before it finished.
    #[error("training interrupted")]
    Interrupted,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub(crate) fn format(path: &Path, message: impl std::fmt::Display) -> Self {
        Error::Format(format!("{}: {message}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_name_the_path() {
        let err = Error::io(
            Path::new("corpus.txt"),
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        let message = err.to_string();
        assert!(message.contains("corpus.txt"), "{message}");
        assert!(message.contains("no such file"), "{message}");
    }

    #[test]
    fn format_errors_name_the_path() {
        let err = Error::format(Path::new("model.bin"), "bad magic number");
        assert_eq!(err.to_string(), "invalid model file: model.bin: bad magic number");
    }
}
