use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::error::ProtocolError;
use super::layout;
use super::tables::parse_hex;
use crate::Elapsed;

/// Wall-clock time as written by the producer (`gettimeofday`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub sec: i64,
    pub usec: i64,
}

impl Timestamp {
    pub fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }
    }

    /// Signed difference `self - start`, borrowing a second when the
    /// microsecond part goes negative.
    ///
    /// # Examples
    /// ```
    /// use pcscspy_core::protocol::header::Timestamp;
    ///
    /// let start = Timestamp::new(10, 900_000);
    /// let end = Timestamp::new(11, 100_000);
    /// let elapsed = end.elapsed_since(start);
    /// assert_eq!((elapsed.sec, elapsed.usec), (0, 200_000));
    /// ```
    pub fn elapsed_since(self, start: Timestamp) -> Elapsed {
        let mut sec = self.sec.saturating_sub(start.sec);
        let mut usec = self.usec.saturating_sub(start.usec);
        if usec < 0 {
            sec = sec.saturating_sub(1);
            usec = usec.saturating_add(layout::USEC_PER_SEC);
        }
        Elapsed { sec, usec }
    }

    pub fn to_rfc3339(self) -> Option<String> {
        let nanos = i128::from(self.sec) * 1_000_000_000 + i128::from(self.usec) * 1_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
    }
}

/// `>|sec|usec|function`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHeader {
    pub timestamp: Timestamp,
    pub function: String,
}

/// `<|sec|usec|function|rv` or `<|sec|usec|function|text|rv`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRecord {
    pub timestamp: Timestamp,
    pub function: String,
    pub text: Option<String>,
    pub code: String,
}

impl ReturnRecord {
    /// `SCARD_S_SUCCESS` is the only success value.
    pub fn is_success(&self) -> bool {
        parse_hex(&self.code) == Some(0)
    }
}

pub fn is_call_header(line: &str) -> bool {
    line.starts_with(layout::ENTER_MARKER)
}

pub fn parse_call_header(line: &str) -> Result<CallHeader, ProtocolError> {
    if !is_call_header(line) {
        return Err(ProtocolError::NotCallHeader {
            line: line.to_string(),
        });
    }
    let parts: Vec<&str> = line.split(layout::FIELD_SEPARATOR).collect();
    if parts.len() != layout::HEADER_FIELDS || parts[0] != layout::ENTER_MARKER {
        return Err(ProtocolError::MalformedHeader {
            line: line.to_string(),
        });
    }
    let timestamp = parse_timestamp(parts[1], parts[2], line)?;
    if parts[3].is_empty() {
        return Err(ProtocolError::MalformedHeader {
            line: line.to_string(),
        });
    }
    Ok(CallHeader {
        timestamp,
        function: parts[3].to_string(),
    })
}

pub fn parse_return_record(line: &str) -> Result<ReturnRecord, ProtocolError> {
    let parts: Vec<&str> = line.split(layout::FIELD_SEPARATOR).collect();
    if parts[0] != layout::RETURN_MARKER {
        return Err(ProtocolError::MalformedReturn {
            line: line.to_string(),
        });
    }
    let (text, code) = match parts.len() {
        layout::RETURN_FIELDS => (None, parts[4]),
        layout::RETURN_FIELDS_WITH_TEXT => (Some(parts[4].to_string()), parts[5]),
        _ => {
            return Err(ProtocolError::MalformedReturn {
                line: line.to_string(),
            });
        }
    };
    let timestamp = parse_timestamp(parts[1], parts[2], line)?;
    Ok(ReturnRecord {
        timestamp,
        function: parts[3].to_string(),
        text,
        code: code.to_string(),
    })
}

fn parse_timestamp(sec: &str, usec: &str, line: &str) -> Result<Timestamp, ProtocolError> {
    let parse = |value: &str| {
        value
            .parse::<i64>()
            .map_err(|_| ProtocolError::InvalidTimestamp {
                value: value.to_string(),
                line: line.to_string(),
            })
    };
    Ok(Timestamp::new(parse(sec)?, parse(usec)?))
}
