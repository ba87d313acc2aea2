use thiserror::Error;

use crate::source::SourceError;

/// Errors returned while reading structural lines or sized fields.
///
/// # Examples
/// ```
/// use pcscspy_core::protocol::error::ProtocolError;
///
/// let err = ProtocolError::NotCallHeader { line: "garbage".to_string() };
/// assert!(err.to_string().contains("not a call header"));
/// ```
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("not a call header: {line:?}")]
    NotCallHeader { line: String },
    #[error("malformed call header: {line:?}")]
    MalformedHeader { line: String },
    #[error("malformed return record: {line:?}")]
    MalformedReturn { line: String },
    #[error("invalid timestamp {value:?} in {line:?}")]
    InvalidTimestamp { value: String, line: String },
    #[error("return record for {found} while decoding {expected}")]
    ReturnMismatch { expected: String, found: String },
    #[error("invalid count for {label}: {token:?}")]
    InvalidCount { label: &'static str, token: String },
    #[error("invalid length for {label}: {token:?}")]
    InvalidLength { label: &'static str, token: String },
}

impl ProtocolError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ProtocolError::Source(err) if err.is_end_of_stream())
    }
}
