//! Decoder for PC/SC spy traces.
//!
//! The spy library writes one token per line to a named pipe: a version
//! line, then for every PC/SC call a header (`>|sec|usec|function`), the
//! call's arguments and results in a fixed per-function order, and a return
//! record (`<|sec|usec|function|rv`). This crate reads that stream and
//! renders each call with symbolic names, decoded bitmasks and the time spent
//! inside the call.
//!
//! Layers, leaves first: a [`TokenSource`] yields lines; field decoders in
//! `protocol::decoders` consume a fixed shape of tokens each; schemas in
//! `protocol::schema` bind a function name to its ordered decoders; the
//! [`TraceSession`] runs one schema and renders the result; the
//! [`Dispatcher`] checks the version line and loops over call headers.
//!
//! Invariants:
//! - A schema consumes exactly the tokens the producer emitted for a call.
//!   There is no resynchronization: an unknown function ends the session
//!   unless keep-going mode is requested.
//! - Nothing but the open cursor survives from one call to the next.
//! - The end of the stream, even in the middle of a call, is a normal end.
//!
//! # Examples
//! ```
//! use std::io::Cursor;
//!
//! use pcscspy_core::{TraceOptions, decode_trace};
//!
//! let trace = "PCSC SPY VERSION: 1\n\
//!              >|10|900000|SCardReleaseContext\n\
//!              0x0000ABCD\n\
//!              <|11|100000|SCardReleaseContext|0x00000000\n";
//! let mut out = Vec::new();
//! let summary = decode_trace(Cursor::new(trace), &mut out, &TraceOptions::default())?;
//! assert_eq!(summary.calls, 1);
//! let text = String::from_utf8(out)?;
//! assert!(text.contains(" i hContext: 0x0000ABCD"));
//! assert!(text.contains(" => 0x00000000 [0.200000]"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

mod dispatch;
pub mod protocol;
mod session;
mod source;
mod summary;

pub use dispatch::{DispatchError, DispatchState, Dispatcher};
pub use protocol::layout::VERSION_LINE;
pub use session::{OutputFormat, SessionError, TraceOptions, TraceSession};
pub use source::{LineSource, SourceError, TokenSource};
pub use summary::{FunctionSummary, TraceSummary};

/// Whether a value goes into the call or comes back from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Marker printed before a field in text output.
    pub fn marker(self) -> &'static str {
        match self {
            Direction::In => "i",
            Direction::Out => "o",
        }
    }
}

/// One rendered argument or result.
///
/// # Examples
/// ```
/// use pcscspy_core::{DecodedField, Direction};
///
/// let field = DecodedField::new("hCard", Direction::In, "0x00010001");
/// assert_eq!(field.to_string(), "hCard: 0x00010001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedField {
    pub label: String,
    pub direction: Direction,
    pub text: String,
    /// Record index for fields that belong to an array of records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<usize>,
}

impl DecodedField {
    pub fn new(label: &str, direction: Direction, text: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            direction,
            text: text.into(),
            item: None,
        }
    }

    pub fn item(label: &str, direction: Direction, index: usize, text: impl Into<String>) -> Self {
        Self {
            item: Some(index),
            ..Self::new(label, direction, text)
        }
    }
}

impl fmt::Display for DecodedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item {
            Some(index) => write!(f, "{}[{}]: {}", self.label, index, self.text),
            None => write!(f, "{}: {}", self.label, self.text),
        }
    }
}

/// Signed time between a call header and its return record.
///
/// `usec` is the non-negative remainder after borrowing from `sec`, so
/// `-1.5s` is stored as `{ sec: -2, usec: 500_000 }` and displayed as
/// `-1.500000`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elapsed {
    pub sec: i64,
    pub usec: i64,
}

impl Elapsed {
    /// Total microseconds, saturating at the `i64` bounds.
    pub fn as_micros(self) -> i64 {
        let total = self.total_micros();
        i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
    }

    fn total_micros(self) -> i128 {
        i128::from(self.sec) * i128::from(protocol::layout::USEC_PER_SEC) + i128::from(self.usec)
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total_micros();
        let sign = if total < 0 { "-" } else { "" };
        let magnitude = total.unsigned_abs();
        let per_sec = u128::from(protocol::layout::USEC_PER_SEC.unsigned_abs());
        write!(f, "{sign}{}.{:06}", magnitude / per_sec, magnitude % per_sec)
    }
}

/// A fully decoded call, from header to return record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub function: String,
    /// RFC3339 wall-clock time of the call header, when representable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub fields: Vec<DecodedField>,
    /// Stringified error, when the producer includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_text: Option<String>,
    pub return_code: String,
    pub success: bool,
    pub elapsed: Elapsed,
}

/// Decode a whole trace from `input`, writing the rendering to `output`.
///
/// # Errors
/// Returns [`DispatchError`] on a wrong version line, an unknown function
/// (unless `keep_going`), a structural protocol error, or an I/O failure.
pub fn decode_trace<R: BufRead, W: Write>(
    input: R,
    output: W,
    options: &TraceOptions,
) -> Result<TraceSummary, DispatchError> {
    let source = LineSource::new(input);
    let session = TraceSession::new(output, options.clone());
    Dispatcher::new(source, session, options.keep_going).run()
}

/// Open `path` (file or named pipe) and decode it.
///
/// # Errors
/// Fails with [`DispatchError::Open`] when the path cannot be opened, and
/// otherwise as [`decode_trace`].
pub fn decode_trace_file<W: Write>(
    path: &Path,
    output: W,
    options: &TraceOptions,
) -> Result<TraceSummary, DispatchError> {
    let source = LineSource::open(path).map_err(|source| DispatchError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let session = TraceSession::new(output, options.clone());
    Dispatcher::new(source, session, options.keep_going).run()
}
