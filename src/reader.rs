//! Whitespace tokenizer over byte streams.

use std::io::{self, BufRead, ErrorKind, Seek, SeekFrom};

/// Token produced for every newline in the input.
pub const EOS: &str = "</s>";

/// Pulls whitespace-separated tokens out of a byte stream, one at a time.
///
/// A newline always produces an [`EOS`] token, so callers can split the
/// stream into lines without a separate pass. Seekable readers can be
/// rewound and restarted, which is how training threads loop over their
/// part of the corpus for several epochs.
pub struct TokenReader<R> {
    inner: R,
    word: Vec<u8>,
    /// A word was terminated by '\n'; the next call returns EOS.
    pending_eol: bool,
    eof: bool,
}

enum Scan {
    /// The buffer ran out in the middle of a word (or between words).
    More,
    /// A complete word is in `self.word`.
    Word,
    /// A bare newline.
    Eol,
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | 0x0b | 0x0c | 0)
}

impl<R: BufRead> TokenReader<R> {
    pub fn new(inner: R) -> Self {
        TokenReader {
            inner,
            word: Vec::new(),
            pending_eol: false,
            eof: false,
        }
    }

    /// True once a read has hit the end of the stream.
    pub fn is_eof(&self) -> bool {
        self.eof && !self.pending_eol
    }

    /// Reads the next token. Returns `Ok(None)` at end of stream.
    pub fn next_token(&mut self) -> io::Result<Option<String>> {
        if self.pending_eol {
            self.pending_eol = false;
            return Ok(Some(EOS.to_string()));
        }
        self.word.clear();
        loop {
            let buf = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if buf.is_empty() {
                self.eof = true;
                break;
            }

            let mut used = 0;
            let mut scan = Scan::More;
            for &b in buf {
                used += 1;
                if b == b'\n' {
                    if self.word.is_empty() {
                        scan = Scan::Eol;
                    } else {
                        self.pending_eol = true;
                        scan = Scan::Word;
                    }
                    break;
                }
                if is_space(b) {
                    if !self.word.is_empty() {
                        scan = Scan::Word;
                        break;
                    }
                    continue;
                }
                self.word.push(b);
            }
            self.inner.consume(used);

            match scan {
                Scan::More => continue,
                Scan::Word => break,
                Scan::Eol => return Ok(Some(EOS.to_string())),
            }
        }

        if self.word.is_empty() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&self.word).into_owned()))
        }
    }

    /// Skip to just past the next newline.
    fn skip_line(&mut self) -> io::Result<()> {
        let mut discard = Vec::new();
        if self.inner.read_until(b'\n', &mut discard)? == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

impl<R: BufRead + Seek> TokenReader<R> {
    /// Go back to the start of the stream.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        self.word.clear();
        self.pending_eol = false;
        self.eof = false;
        Ok(())
    }

    /// Position the reader at the first line starting at or after `offset`.
    pub fn seek_to_line(&mut self, offset: u64) -> io::Result<()> {
        if offset == 0 {
            return self.rewind();
        }
        // Back up one byte so that an offset right at a line start keeps that line.
        self.inner.seek(SeekFrom::Start(offset - 1))?;
        self.word.clear();
        self.pending_eol = false;
        self.eof = false;
        self.skip_line()
    }
}
