//! The binary model format, and atomic writes for every artifact.
//!
//! A model file is, in order:
//!
//! 1. magic number and format version (`i32` each);
//! 2. the training [`Args`], bincode-encoded;
//! 3. the dictionary, bincode-encoded;
//! 4. the Huffman tree (`Option`, bincode-encoded; present only for
//!    hierarchical softmax);
//! 5. the input and output matrices, each a `u64` row count, a `u64` column
//!    count, and the raw `f32` values;
//! 6. a one-byte quantization flag.
//!
//! Integers and floats are stored in native byte order.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::args::{Args, LossKind, ModelKind};
use crate::dictionary::{Dictionary, EntryType};
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::matrix::Matrix;
use crate::model::Model;
use crate::tree::HuffmanTree;

pub const MAGIC: i32 = 793_712_314;
pub const VERSION: i32 = 1;

fn bincode_to_io(err: bincode::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

/// Write `path` by way of a temporary file in the same directory, so the
/// file is either fully written or left as it was.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(path, e))?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        write(&mut out).map_err(|e| Error::io(path, e))?;
        out.flush().map_err(|e| Error::io(path, e))?;
    }
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    debug!("wrote {}", path.display());
    Ok(())
}

pub fn save(path: &Path, dict: &Dictionary, model: &Model) -> Result<()> {
    write_atomic(path, |out| {
        out.write_all(bytemuck::bytes_of(&MAGIC))?;
        out.write_all(bytemuck::bytes_of(&VERSION))?;
        bincode::serialize_into(&mut *out, model.args()).map_err(bincode_to_io)?;
        dict.save(out).map_err(bincode_to_io)?;
        bincode::serialize_into(&mut *out, &model.loss().tree()).map_err(bincode_to_io)?;
        model.input().save(out)?;
        model.output().save(out)?;
        out.write_all(&[0u8])
    })
}

/// Read a matrix, checking its shape before allocating it.
fn load_matrix(
    path: &Path,
    input: &mut impl Read,
    what: &str,
    rows: usize,
    cols: usize,
) -> Result<Matrix> {
    let shape = Matrix::read_shape(input).map_err(|e| Error::format(path, e))?;
    if shape != (rows, cols) {
        return Err(Error::format(
            path,
            format!(
                "{what} matrix is {}x{}, expected {rows}x{cols}",
                shape.0, shape.1
            ),
        ));
    }
    Matrix::read_values(input, rows, cols).map_err(|e| match e {
        Error::Stream(e) => Error::format(path, format!("{what} matrix: {e}")),
        other => other,
    })
}

/// Load a model file written by [`save`].
pub fn load(path: &Path) -> Result<(Dictionary, Model)> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut input = BufReader::new(file);

    let mut header = [0i32; 2];
    input
        .read_exact(bytemuck::cast_slice_mut::<i32, u8>(&mut header))
        .map_err(|_| Error::format(path, "file is too short"))?;
    if header[0] != MAGIC {
        return Err(Error::format(path, "bad magic number"));
    }
    if header[1] != VERSION {
        return Err(Error::format(
            path,
            format!("unsupported version {}", header[1]),
        ));
    }

    let args: Args = bincode::deserialize_from(&mut input).map_err(|e| Error::format(path, e))?;
    let args = Arc::new(args);
    let dict = Dictionary::load(args.clone(), &mut input).map_err(|e| Error::format(path, e))?;
    if dict.nwords() == 0 {
        return Err(Error::format(path, "dictionary has no words"));
    }
    let tree: Option<HuffmanTree> =
        bincode::deserialize_from(&mut input).map_err(|e| Error::format(path, e))?;

    let (osz, kind) = match args.model {
        ModelKind::Supervised => (dict.nlabels(), EntryType::Label),
        _ => (dict.nwords(), EntryType::Word),
    };
    let nin = dict.nwords() + args.bucket;
    let input_matrix = load_matrix(path, &mut input, "input", nin, args.dim)?;
    let output_matrix = load_matrix(path, &mut input, "output", osz, args.dim)?;

    let mut quant = [0u8];
    input
        .read_exact(&mut quant)
        .map_err(|_| Error::format(path, "missing quantization flag"))?;
    if quant[0] != 0 {
        return Err(Error::format(path, "quantized models are unsupported"));
    }

    let loss = match (args.loss, tree) {
        (LossKind::Hs, Some(tree)) if tree.leaves() == osz => Loss::hierarchical(tree),
        (LossKind::Hs, _) => {
            return Err(Error::format(path, "missing or mismatched Huffman tree"));
        }
        (kind_of_loss, _) => Loss::new(kind_of_loss, &dict.counts(kind), args.neg),
    };
    let model = Model::new(args, input_matrix, output_matrix, loss);
    Ok((dict, model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "old").unwrap();

        let err = write_atomic(&path, |out| {
            out.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        });
        assert!(matches!(err, Err(Error::Io { .. })));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");

        write_atomic(&path, |out| out.write_all(b"new")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        // No temporary files left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        std::fs::write(&path, b"hi").unwrap();
        assert!(matches!(load(&path), Err(Error::Format(_))));

        let mut bytes = vec![];
        bytes.extend_from_slice(bytemuck::bytes_of(&12345i32));
        bytes.extend_from_slice(bytemuck::bytes_of(&VERSION));
        std::fs::write(&path, &bytes).unwrap();
        match load(&path) {
            Err(Error::Format(m)) => assert!(m.contains("magic"), "{m}"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("loaded a bogus file"),
        }

        let mut bytes = vec![];
        bytes.extend_from_slice(bytemuck::bytes_of(&MAGIC));
        bytes.extend_from_slice(bytemuck::bytes_of(&7i32));
        std::fs::write(&path, &bytes).unwrap();
        match load(&path) {
            Err(Error::Format(m)) => assert!(m.contains("version"), "{m}"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("loaded a bogus file"),
        }

        assert!(matches!(
            load(&dir.path().join("missing.bin")),
            Err(Error::Io { .. })
        ));
    }
}
