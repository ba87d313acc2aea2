use std::io::{self, Write};

use crate::{CallRecord, DecodedField, Direction};

const RED: &str = "\x1b[01;31m";
const GREEN: &str = "\x1b[32m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const NORMAL: &str = "\x1b[0m";

fn paint(color: bool, code: &'static str) -> (&'static str, &'static str) {
    if color { (code, NORMAL) } else { ("", "") }
}

pub(super) fn write_function<W: Write>(out: &mut W, function: &str, color: bool) -> io::Result<()> {
    let (start, end) = paint(color, BLUE);
    writeln!(out, "{start}{function}{end}")
}

pub(super) fn write_field<W: Write>(out: &mut W, field: &DecodedField, color: bool) -> io::Result<()> {
    let code = match field.direction {
        Direction::In => GREEN,
        Direction::Out => MAGENTA,
    };
    let (start, end) = paint(color, code);
    writeln!(out, "{start} {} {field}{end}", field.direction.marker())
}

/// ` => [text ](code) [sec.usec]`, highlighted unless the call succeeded.
pub(super) fn write_return<W: Write>(out: &mut W, record: &CallRecord, color: bool) -> io::Result<()> {
    let (start, end) = paint(color && !record.success, RED);
    let rv = match &record.return_text {
        Some(text) => format!("{text} ({})", record.return_code),
        None => record.return_code.clone(),
    };
    writeln!(out, "{start} => {rv}{end} [{}]", record.elapsed)
}

pub(super) fn write_unknown<W: Write>(out: &mut W, function: &str, color: bool) -> io::Result<()> {
    let (start, end) = paint(color, RED);
    writeln!(out, "{start}Unknown function: {function}{end}")
}
