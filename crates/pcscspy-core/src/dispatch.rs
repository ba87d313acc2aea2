//! Dispatch loop.
//!
//! Two working states: `Header` expects the version line once, `Streaming`
//! reads call headers and runs the matching schema. End of stream while
//! streaming moves to `Finished` and is not an error.

use std::io::Write;

use log::{debug, info, warn};
use thiserror::Error;

use crate::protocol::error::ProtocolError;
use crate::protocol::header::parse_call_header;
use crate::protocol::layout::VERSION_LINE;
use crate::protocol::schema::lookup;
use crate::session::{SessionError, TraceSession};
use crate::source::{SourceError, TokenSource};
use crate::summary::TraceSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Header,
    Streaming,
    Finished,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: SourceError,
    },
    #[error("empty stream: no version line")]
    EmptyStream,
    #[error("wrong version line {found:?}, expected \"PCSC SPY VERSION: 1\"")]
    WrongVersion { found: String },
    #[error("unknown function {function}: stream alignment lost")]
    UnknownFunction { function: String },
    #[error("expected a call header, got {line:?}")]
    UnexpectedLine { line: String },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub struct Dispatcher<S, W> {
    source: S,
    session: TraceSession<W>,
    keep_going: bool,
    state: DispatchState,
    summary: TraceSummary,
}

impl<S: TokenSource, W: Write> Dispatcher<S, W> {
    pub fn new(source: S, session: TraceSession<W>, keep_going: bool) -> Self {
        Self {
            source,
            session,
            keep_going,
            state: DispatchState::Header,
            summary: TraceSummary::default(),
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn summary(&self) -> &TraceSummary {
        &self.summary
    }

    /// Run until end of stream.
    ///
    /// # Errors
    /// Fatal setup errors (version line) and structural errors (unknown
    /// function, malformed header or return record) stop the loop.
    pub fn run(&mut self) -> Result<TraceSummary, DispatchError> {
        while self.step()? != DispatchState::Finished {}
        Ok(self.summary.clone())
    }

    /// Perform one transition: read the version line, or decode one call.
    pub fn step(&mut self) -> Result<DispatchState, DispatchError> {
        match self.state {
            DispatchState::Header => {
                self.check_version()?;
                self.state = DispatchState::Streaming;
            }
            DispatchState::Streaming => self.next_call()?,
            DispatchState::Finished => {}
        }
        Ok(self.state)
    }

    pub fn into_parts(self) -> (S, TraceSession<W>) {
        (self.source, self.session)
    }

    fn check_version(&mut self) -> Result<(), DispatchError> {
        let line = match self.source.next_token() {
            Ok(line) => line,
            Err(SourceError::EndOfStream) => return Err(DispatchError::EmptyStream),
            Err(err) => return Err(err.into()),
        };
        if line != VERSION_LINE {
            return Err(DispatchError::WrongVersion { found: line });
        }
        info!("trace version accepted: {line}");
        Ok(())
    }

    fn next_call(&mut self) -> Result<(), DispatchError> {
        let line = match self.source.next_token() {
            Ok(line) => line,
            Err(SourceError::EndOfStream) => {
                info!("end of stream after {} calls", self.summary.calls);
                self.state = DispatchState::Finished;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let header = match parse_call_header(&line) {
            Ok(header) => header,
            Err(ProtocolError::NotCallHeader { line }) if !self.keep_going => {
                return Err(DispatchError::UnexpectedLine { line });
            }
            Err(
                err @ (ProtocolError::NotCallHeader { .. }
                | ProtocolError::MalformedHeader { .. }
                | ProtocolError::InvalidTimestamp { .. }),
            ) => {
                if !self.keep_going {
                    return Err(err.into());
                }
                warn!("skipping unusable line outside a call: {line:?}");
                self.summary.skipped_lines += 1;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let Some(schema) = lookup(&header.function) else {
            if !self.keep_going {
                return Err(DispatchError::UnknownFunction {
                    function: header.function,
                });
            }
            warn!(
                "unknown function {}; skipping to the next call header, alignment is not guaranteed",
                header.function
            );
            self.summary.unknown_calls += 1;
            self.session.report_unknown(&header.function)?;
            return Ok(());
        };

        match self.session.run_call(&header, schema, &mut self.source) {
            Ok(record) => {
                debug!(
                    "{} -> {} in {}s ({} fields)",
                    record.function,
                    record.return_code,
                    record.elapsed,
                    record.fields.len()
                );
                self.summary.record(&record);
            }
            Err(err) if err.is_end_of_stream() => {
                warn!("stream closed inside {}", header.function);
                self.summary.truncated = true;
                self.state = DispatchState::Finished;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}
