//! Field decoders.
//!
//! Each decoder consumes a fixed shape of tokens and renders one semantic
//! value. Unrecognised values are rendered inline and never abort decoding;
//! only a count or length that cannot be read is an error, because the
//! number of tokens to consume is then unknown.

use super::error::ProtocolError;
use super::layout;
use super::schema::Step;
use super::tables::{BitTable, EnumTable, PROTOCOLS, READER_STATES, parse_hex};
use crate::source::TokenSource;
use crate::{DecodedField, Direction};

/// How a protocol bitmask is read: `dwActiveProtocol` names a single
/// protocol, `dwPreferredProtocols` lists every accepted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolPolicy {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy)]
pub enum Decoder {
    /// One token, rendered verbatim.
    Opaque,
    Enum(&'static EnumTable),
    Bitmask(&'static BitTable),
    Protocol(ProtocolPolicy),
    /// Hex byte count, then lines until the count is used up or `NULL`.
    Blob { item_label: &'static str },
    /// Length line followed by one data line, unless the length is `NULL`.
    Buffer { data_label: &'static str },
    /// Reader count shared by the following `ReaderStates` steps.
    ReaderCount,
    ReaderStates,
}

/// Values decoded earlier in the same call.
#[derive(Debug, Default)]
pub struct CallScratch {
    reader_count: Option<usize>,
}

pub const READER_STATE_LABELS: [&str; 5] =
    ["szReader", "dwCurrentState", "dwEventState", "cbAtr", "rgbAtr"];

pub fn decode_step<S: TokenSource>(
    step: &Step,
    source: &mut S,
    scratch: &mut CallScratch,
) -> Result<Vec<DecodedField>, ProtocolError> {
    let Step {
        direction,
        label,
        decoder,
    } = *step;
    let fields = match decoder {
        Decoder::Opaque => vec![DecodedField::new(label, direction, source.next_token()?)],
        Decoder::Enum(table) => {
            let token = source.next_token()?;
            vec![DecodedField::new(label, direction, render_enum(table, &token))]
        }
        Decoder::Bitmask(table) => {
            let token = source.next_token()?;
            vec![DecodedField::new(label, direction, render_bitmask(table, &token))]
        }
        Decoder::Protocol(policy) => {
            let token = source.next_token()?;
            vec![DecodedField::new(label, direction, render_protocol(policy, &token))]
        }
        Decoder::Blob { item_label } => decode_blob(source, direction, label, item_label)?,
        Decoder::Buffer { data_label } => decode_buffer(source, direction, label, data_label)?,
        Decoder::ReaderCount => {
            let (count, field) = read_reader_count(source, direction, label)?;
            scratch.reader_count = Some(count);
            vec![field]
        }
        Decoder::ReaderStates => {
            let count = scratch.reader_count.unwrap_or(0);
            decode_reader_states(source, direction, count)?
                .into_iter()
                .flatten()
                .collect()
        }
    };
    Ok(fields)
}

/// `NAME (token)`, `UNKNOWN (token)`, or the token itself when it is not hex.
///
/// # Examples
/// ```
/// use pcscspy_core::protocol::decoders::render_enum;
/// use pcscspy_core::protocol::tables::SHARE_MODES;
///
/// assert_eq!(render_enum(&SHARE_MODES, "0x00000002"), "SCARD_SHARE_SHARED (0x00000002)");
/// assert_eq!(render_enum(&SHARE_MODES, "0x00000009"), "UNKNOWN (0x00000009)");
/// ```
pub fn render_enum(table: &EnumTable, token: &str) -> String {
    match parse_hex(token) {
        Some(value) => {
            let name = table.lookup(value).unwrap_or(layout::UNKNOWN_NAME);
            format!("{name} ({token})")
        }
        None => token.to_string(),
    }
}

pub fn render_bitmask(table: &BitTable, token: &str) -> String {
    let Some(value) = parse_hex(token) else {
        return token.to_string();
    };
    let set = table.decode(value);
    let mut names: Vec<String> = set.names.iter().map(|name| name.to_string()).collect();
    if set.residual != 0 {
        names.push(format!("{} (0x{:08X})", layout::UNKNOWN_NAME, set.residual));
    }
    if names.is_empty() {
        names.push(layout::UNKNOWN_NAME.to_string());
    }
    format!("{} ({token})", names.join(", "))
}

/// First matching protocol in T=0, T=1, RAW, T=15 order.
pub fn protocol_single(value: u64) -> &'static str {
    PROTOCOLS
        .bits
        .iter()
        .find(|(bit, _)| value & bit != 0)
        .map(|(_, name)| *name)
        .unwrap_or(layout::UNKNOWN_NAME)
}

/// Every protocol whose bit is set.
pub fn protocol_list(value: u64) -> Vec<&'static str> {
    PROTOCOLS.decode(value).names
}

pub fn render_protocol(policy: ProtocolPolicy, token: &str) -> String {
    let Some(value) = parse_hex(token) else {
        return token.to_string();
    };
    let rendered = match policy {
        ProtocolPolicy::Single => protocol_single(value).to_string(),
        ProtocolPolicy::Multi => {
            let names = protocol_list(value);
            if names.is_empty() {
                layout::UNKNOWN_NAME.to_string()
            } else {
                names.join(", ")
            }
        }
    };
    format!("{rendered} ({token})")
}

/// Length-prefixed run of lines, each counted as its length plus one
/// separator byte. A `NULL` line ends the run early; a `NULL` length is
/// followed by a single placeholder line.
pub fn decode_blob<S: TokenSource>(
    source: &mut S,
    direction: Direction,
    length_label: &'static str,
    item_label: &'static str,
) -> Result<Vec<DecodedField>, ProtocolError> {
    let length = source.next_token()?;
    let size = if length == layout::NULL_TOKEN {
        None
    } else {
        Some(parse_hex(&length).ok_or_else(|| ProtocolError::InvalidLength {
            label: length_label,
            token: length.clone(),
        })?)
    };
    let mut fields = vec![DecodedField::new(length_label, direction, length)];

    let Some(size) = size else {
        let placeholder = source.next_token()?;
        fields.push(DecodedField::new(item_label, direction, placeholder));
        return Ok(fields);
    };

    let mut consumed = 0u64;
    while consumed < size {
        let item = source.next_token()?;
        let end_marker = item == layout::NULL_TOKEN;
        consumed += (item.len() + layout::ITEM_SEPARATOR_BYTES) as u64;
        fields.push(DecodedField::new(item_label, direction, item));
        if end_marker {
            break;
        }
    }
    Ok(fields)
}

/// Optional byte buffer: a `NULL` length stands for an absent length
/// pointer and has no data line after it.
pub fn decode_buffer<S: TokenSource>(
    source: &mut S,
    direction: Direction,
    length_label: &'static str,
    data_label: &'static str,
) -> Result<Vec<DecodedField>, ProtocolError> {
    let length = source.next_token()?;
    if length == layout::NULL_TOKEN {
        return Ok(vec![DecodedField::new(length_label, direction, length)]);
    }
    let data = source.next_token()?;
    Ok(vec![
        DecodedField::new(length_label, direction, length),
        DecodedField::new(data_label, direction, data),
    ])
}

/// Decimal count; the `0x` form written by the spy library is read as hex.
pub fn parse_count(token: &str) -> Option<usize> {
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(digits) => usize::from_str_radix(digits, 16).ok(),
        None => token.parse().ok(),
    }
}

pub fn read_reader_count<S: TokenSource>(
    source: &mut S,
    direction: Direction,
    label: &'static str,
) -> Result<(usize, DecodedField), ProtocolError> {
    let token = source.next_token()?;
    let count = parse_count(&token).ok_or(ProtocolError::InvalidCount { label, token })?;
    Ok((count, DecodedField::new(label, direction, count.to_string())))
}

/// `count` reader state records, one field list per record.
pub fn decode_reader_states<S: TokenSource>(
    source: &mut S,
    direction: Direction,
    count: usize,
) -> Result<Vec<Vec<DecodedField>>, ProtocolError> {
    (0..count)
        .map(|index| decode_reader_state(source, direction, index))
        .collect()
}

fn decode_reader_state<S: TokenSource>(
    source: &mut S,
    direction: Direction,
    index: usize,
) -> Result<Vec<DecodedField>, ProtocolError> {
    let [reader_label, current_label, event_label, atr_len_label, atr_label] =
        READER_STATE_LABELS;
    let reader = source.next_token()?;
    let current = source.next_token()?;
    let event = source.next_token()?;
    let atr_len = source.next_token()?;
    let atr = source.next_token()?;
    Ok(vec![
        DecodedField::item(reader_label, direction, index, reader),
        DecodedField::item(
            current_label,
            direction,
            index,
            render_bitmask(&READER_STATES, &current),
        ),
        DecodedField::item(
            event_label,
            direction,
            index,
            render_bitmask(&READER_STATES, &event),
        ),
        DecodedField::item(atr_len_label, direction, index, atr_len),
        DecodedField::item(atr_label, direction, index, atr),
    ])
}
