use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{SourceError, TokenSource};

/// Line-oriented token source over any buffered reader (pipe, file, stdin).
///
/// Reads block until the producer has written a complete line. A final line
/// without a terminator is still returned as a token; only a read of zero
/// bytes is reported as [`SourceError::EndOfStream`].
///
/// # Examples
/// ```
/// use std::io::Cursor;
///
/// use pcscspy_core::{LineSource, TokenSource};
///
/// let mut source = LineSource::new(Cursor::new("first\n\nthird"));
/// assert_eq!(source.next_token()?, "first");
/// assert_eq!(source.next_token()?, "");
/// assert_eq!(source.next_token()?, "third");
/// assert!(source.next_token().unwrap_err().is_end_of_stream());
/// # Ok::<(), pcscspy_core::SourceError>(())
/// ```
pub struct LineSource<R> {
    reader: R,
    buf: Vec<u8>,
    position: u64,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
            position: 0,
        }
    }
}

impl LineSource<BufReader<File>> {
    /// Open a named pipe or regular file for reading.
    ///
    /// Opening a FIFO blocks until a writer connects.
    ///
    /// # Errors
    /// Returns [`SourceError::Io`] when the path cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TokenSource for LineSource<R> {
    fn next_token(&mut self) -> Result<String, SourceError> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf)?;
        if read == 0 {
            return Err(SourceError::EndOfStream);
        }
        self.position += 1;
        Ok(strip_terminator(&self.buf))
    }

    fn position(&self) -> u64 {
        self.position
    }
}

fn strip_terminator(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
