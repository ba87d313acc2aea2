//! Token sources.
//!
//! A source yields one newline-terminated token at a time and owns no
//! protocol semantics. There is no pushback: once a token is handed out the
//! cursor has moved past it.

mod lines;

pub use lines::LineSource;

use thiserror::Error;

pub trait TokenSource {
    /// Read the next token, without its line terminator.
    fn next_token(&mut self) -> Result<String, SourceError>;

    /// Number of tokens handed out so far.
    fn position(&self) -> u64;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("end of stream")]
    EndOfStream,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, SourceError::EndOfStream)
    }
}

impl<S: TokenSource + ?Sized> TokenSource for &mut S {
    fn next_token(&mut self) -> Result<String, SourceError> {
        (**self).next_token()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}
