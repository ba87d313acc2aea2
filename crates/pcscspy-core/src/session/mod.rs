//! Trace session: runs one call schema against the token source and
//! renders the result.
//!
//! The time baseline is the call header's timestamp and lives only for the
//! duration of [`TraceSession::run_call`]. Text output is written field by
//! field so a live pipe shows progress even when the producer blocks inside
//! a call; JSON output is written once the call is complete.

mod render;

use std::io::Write;

use thiserror::Error;

use crate::protocol::decoders::{CallScratch, decode_step};
use crate::protocol::error::ProtocolError;
use crate::protocol::header::{CallHeader, parse_return_record};
use crate::protocol::schema::CallSchema;
use crate::source::{SourceError, TokenSource};
use crate::CallRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable, one line per field.
    #[default]
    Text,
    /// One JSON object per call.
    Json,
}

/// Rendering and dispatch options.
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    pub format: OutputFormat,
    /// ANSI highlighting; text output only.
    pub color: bool,
    /// Skip unknown functions and stray lines instead of stopping.
    pub keep_going: bool,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, SessionError::Protocol(err) if err.is_end_of_stream())
    }
}

impl From<SourceError> for SessionError {
    fn from(err: SourceError) -> Self {
        SessionError::Protocol(ProtocolError::Source(err))
    }
}

pub struct TraceSession<W> {
    out: W,
    options: TraceOptions,
}

impl<W: Write> TraceSession<W> {
    pub fn new(out: W, options: TraceOptions) -> Self {
        Self { out, options }
    }

    pub fn options(&self) -> &TraceOptions {
        &self.options
    }

    /// Decode the call opened by `header`, up to and including its return
    /// record. Output is flushed before returning, also on error.
    ///
    /// # Errors
    /// End of stream inside the call surfaces as an error for which
    /// [`SessionError::is_end_of_stream`] is true.
    pub fn run_call<S: TokenSource>(
        &mut self,
        header: &CallHeader,
        schema: &CallSchema,
        source: &mut S,
    ) -> Result<CallRecord, SessionError> {
        let result = self.decode_call(header, schema, source);
        let flushed = self.out.flush();
        let record = result?;
        flushed?;
        Ok(record)
    }

    /// Note a call with no schema in the rendered output.
    pub fn report_unknown(&mut self, function: &str) -> Result<(), SessionError> {
        if self.options.format == OutputFormat::Text {
            render::write_unknown(&mut self.out, function, self.options.color)?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn decode_call<S: TokenSource>(
        &mut self,
        header: &CallHeader,
        schema: &CallSchema,
        source: &mut S,
    ) -> Result<CallRecord, SessionError> {
        let text = self.options.format == OutputFormat::Text;
        let color = self.options.color;
        if text {
            render::write_function(&mut self.out, &header.function, color)?;
        }

        let mut scratch = CallScratch::default();
        let mut fields = Vec::new();
        for step in schema.steps {
            let decoded = decode_step(step, source, &mut scratch)?;
            if text {
                for field in &decoded {
                    render::write_field(&mut self.out, field, color)?;
                }
            }
            fields.extend(decoded);
        }

        let line = source.next_token()?;
        let rv = parse_return_record(&line)?;
        if rv.function != header.function {
            return Err(ProtocolError::ReturnMismatch {
                expected: header.function.clone(),
                found: rv.function,
            }
            .into());
        }

        let success = rv.is_success();
        let record = CallRecord {
            function: header.function.clone(),
            started_at: header.timestamp.to_rfc3339(),
            fields,
            return_text: rv.text,
            return_code: rv.code,
            success,
            elapsed: rv.timestamp.elapsed_since(header.timestamp),
        };

        match self.options.format {
            OutputFormat::Text => render::write_return(&mut self.out, &record, color)?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, &record)?;
                writeln!(self.out)?;
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::protocol::header::{Timestamp, parse_call_header};
    use crate::protocol::schema::lookup;
    use crate::source::LineSource;
    use crate::{DecodedField, Direction, Elapsed};

    type Outcome = (
        Result<CallRecord, SessionError>,
        String,
        LineSource<Cursor<String>>,
    );

    fn run(header: &str, body: &str, options: TraceOptions) -> Outcome {
        let header = parse_call_header(header).unwrap();
        let schema = lookup(&header.function).unwrap();
        let mut source = LineSource::new(Cursor::new(body.to_string()));
        let mut session = TraceSession::new(Vec::new(), options);
        let result = session.run_call(&header, schema, &mut source);
        let out = String::from_utf8(session.into_inner()).unwrap();
        (result, out, source)
    }

    #[test]
    fn release_context_renders_one_block() {
        let (result, out, _) = run(
            ">|10|900000|SCardReleaseContext",
            "0x0000ABCD\n<|11|100000|SCardReleaseContext|0x00000000\n",
            TraceOptions::default(),
        );
        let record = result.unwrap();
        assert_eq!(record.fields, vec![DecodedField::new("hContext", Direction::In, "0x0000ABCD")]);
        assert!(record.success);
        assert_eq!(record.elapsed, Elapsed { sec: 0, usec: 200_000 });
        assert_eq!(
            out,
            "SCardReleaseContext\n i hContext: 0x0000ABCD\n => 0x00000000 [0.200000]\n"
        );
    }

    #[test]
    fn one_field_per_step_for_single_token_schemas() {
        let (result, _, mut source) = run(
            ">|1|0|SCardTransmit",
            "0x00010001\n0x00000005\n00 A4 04 00 00 \n0x00000002\n90 00 \n<|1|50|SCardTransmit|0x00000000\nleftover\n",
            TraceOptions::default(),
        );
        let record = result.unwrap();
        assert_eq!(record.fields.len(), lookup("SCardTransmit").unwrap().steps.len());
        assert_eq!(source.next_token().unwrap(), "leftover");
    }

    #[test]
    fn failure_code_with_text() {
        let (result, out, _) = run(
            ">|5|0|SCardConnect",
            "0x00000001\nReader 0\n0x00000002\n0x00000003\n0x00000000\n0x00000000\n0x00000000\n0x00000000\n<|5|10|SCardConnect|No smart card inserted.|0x8010000C\n",
            TraceOptions::default(),
        );
        let record = result.unwrap();
        assert!(!record.success);
        assert_eq!(record.return_text.as_deref(), Some("No smart card inserted."));
        assert!(out.contains(" i dwShareMode: SCARD_SHARE_SHARED (0x00000002)\n"));
        assert!(out.contains(" i dwPreferredProtocols: T=0, T=1 (0x00000003)\n"));
        assert!(out.contains(" o dwActiveProtocol: UNKNOWN (0x00000000)\n"));
        assert!(out.ends_with(" => No smart card inserted. (0x8010000C) [0.000010]\n"));
    }

    #[test]
    fn color_highlights_failures_only() {
        let (_, ok, _) = run(
            ">|1|0|SCardBeginTransaction",
            "0x1\n<|1|0|SCardBeginTransaction|0x00000000\n",
            TraceOptions { color: true, ..TraceOptions::default() },
        );
        assert!(!ok.contains("\x1b[01;31m"));
        let (_, failed, _) = run(
            ">|1|0|SCardBeginTransaction",
            "0x1\n<|1|0|SCardBeginTransaction|0x80100003\n",
            TraceOptions { color: true, ..TraceOptions::default() },
        );
        assert!(failed.contains("\x1b[01;31m => 0x80100003\x1b[0m [0.000000]"));
    }

    #[test]
    fn json_writes_one_line_per_call() {
        let (result, out, _) = run(
            ">|0|0|SCardIsValidContext",
            "0x00000007\n<|0|1|SCardIsValidContext|0x00000000\n",
            TraceOptions { format: OutputFormat::Json, ..TraceOptions::default() },
        );
        result.unwrap();
        assert_eq!(out.lines().count(), 1);
        let parsed: CallRecord = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(parsed.function, "SCardIsValidContext");
        assert_eq!(parsed.elapsed.usec, 1);
        assert!(parsed.started_at.unwrap().starts_with("1970-01-01T00:00:00"));
    }

    #[test]
    fn end_of_stream_mid_call() {
        let (result, out, _) = run(">|1|0|SCardDisconnect", "0x00000001\n", TraceOptions::default());
        let err = result.unwrap_err();
        assert!(err.is_end_of_stream());
        assert_eq!(out, "SCardDisconnect\n i hCard: 0x00000001\n");
    }

    #[test]
    fn return_for_another_function_is_rejected() {
        let (result, _, _) = run(
            ">|1|0|SCardBeginTransaction",
            "0x1\n<|1|0|SCardEndTransaction|0x00000000\n",
            TraceOptions::default(),
        );
        let err = result.unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ProtocolError::ReturnMismatch { .. })));
    }

    /// Lines the spy library writes between header and return record.
    const EMISSIONS: &[(&str, &[&str])] = &[
        ("SCardEstablishContext", &["0x00000002", "0x0105A3C1"]),
        ("SCardIsValidContext", &["0x0105A3C1"]),
        ("SCardReleaseContext", &["0x0105A3C1"]),
        (
            "SCardListReaders",
            &["0x0105A3C1", "(null)", "0x00000008", "Reader", ""],
        ),
        (
            "SCardListReaderGroups",
            &["0x0105A3C1", "0x00000016", "0x00000016", "SCard$DefaultReaders", ""],
        ),
        ("SCardFreeMemory", &["0x0105A3C1", "0x55d1c0a0"]),
        (
            "SCardGetStatusChange",
            &[
                "0x0105A3C1",
                "0xFFFFFFFF",
                "0x00000001",
                "Reader",
                "0x00000000",
                "0x00000000",
                "0x00000000",
                "",
                "Reader",
                "0x00000000",
                "0x00000012",
                "0x00000002",
                "3B 00 ",
            ],
        ),
        ("SCardCancel", &["0x0105A3C1"]),
        (
            "SCardConnect",
            &[
                "0x0105A3C1",
                "Reader",
                "0x00000002",
                "0x00000003",
                "0x00000000",
                "0x00000000",
                "0x0001A2B3",
                "0x00000002",
            ],
        ),
        (
            "SCardReconnect",
            &["0x0001A2B3", "0x00000002", "0x00000003", "0x00000001", "0x00000002"],
        ),
        ("SCardDisconnect", &["0x0001A2B3", "0x00000000"]),
        ("SCardBeginTransaction", &["0x0001A2B3"]),
        ("SCardEndTransaction", &["0x0001A2B3", "0x00000000"]),
        (
            "SCardStatus",
            &[
                "0x0001A2B3",
                "0x00000040",
                "0x00000021",
                "0x00000007",
                "Reader",
                "0x00000034",
                "0x00000002",
                "0x00000002",
                "3B 00 ",
            ],
        ),
        (
            "SCardStatus",
            &[
                "0x0001A2B3",
                "0x00000040",
                "NULL",
                "0x00000007",
                "Reader",
                "0x00000034",
                "0x00000002",
                "NULL",
            ],
        ),
        (
            "SCardTransmit",
            &["0x0001A2B3", "0x00000005", "00 A4 04 00 00 ", "0x00000000", "NULL"],
        ),
        (
            "SCardControl",
            &["0x0001A2B3", "0x42000C00", "0x00000001", "01 ", "0x00000000", ""],
        ),
        (
            "SCardGetAttrib",
            &["0x0001A2B3", "0x00090303", "0x00000002", "3B 00 "],
        ),
        (
            "SCardSetAttrib",
            &["0x0001A2B3", "0x7FFF0003", "0x00000004", "41 42 43 00 "],
        ),
    ];

    #[test]
    fn every_schema_consumes_exactly_the_emitted_lines() {
        for (function, lines) in EMISSIONS {
            let body = format!(
                "{}\n<|1|10|{function}|0x00000000\nsentinel\n",
                lines.join("\n")
            );
            let (result, _, mut source) =
                run(&format!(">|1|0|{function}"), &body, TraceOptions::default());
            let record = result.unwrap_or_else(|err| panic!("{function}: {err}"));
            assert_eq!(record.fields.len(), lines.len(), "{function}");
            assert_eq!(source.next_token().unwrap(), "sentinel", "{function}");
        }
    }

    #[test]
    fn every_schema_has_an_emission() {
        for schema in crate::protocol::schema::SCHEMAS {
            assert!(
                EMISSIONS.iter().any(|(function, _)| *function == schema.function),
                "{}",
                schema.function
            );
        }
    }

    #[test]
    fn status_without_atr_length_keeps_alignment() {
        let (result, out, mut source) = run(
            ">|1|0|SCardStatus",
            "0x0001A2B3\n0x00000040\nNULL\n0x00000007\nReader\n0x00000034\n0x00000002\nNULL\n\
             <|1|10|SCardStatus|0x00000000\n>|2|0|SCardCancel\n",
            TraceOptions::default(),
        );
        result.unwrap();
        assert!(out.ends_with(" o bAtrLen: NULL\n => 0x00000000 [0.000010]\n"));
        assert_eq!(source.next_token().unwrap(), ">|2|0|SCardCancel");
    }

    #[test]
    fn timestamp_baseline_comes_from_header() {
        let header = CallHeader {
            timestamp: Timestamp::new(100, 999_999),
            function: "SCardCancel".to_string(),
        };
        let schema = lookup("SCardCancel").unwrap();
        let mut source = LineSource::new(Cursor::new("0x2\n<|101|1|SCardCancel|0x00000000\n"));
        let mut session = TraceSession::new(Vec::new(), TraceOptions::default());
        let record = session.run_call(&header, schema, &mut source).unwrap();
        assert_eq!(record.elapsed, Elapsed { sec: 0, usec: 2 });
    }
}
