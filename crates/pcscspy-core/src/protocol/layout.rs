/// First line written by the spy library.
pub const VERSION_LINE: &str = "PCSC SPY VERSION: 1";

pub const ENTER_MARKER: &str = ">";
pub const RETURN_MARKER: &str = "<";
pub const FIELD_SEPARATOR: char = '|';

/// `>|sec|usec|function`
pub const HEADER_FIELDS: usize = 4;
/// `<|sec|usec|function|rv`
pub const RETURN_FIELDS: usize = 5;
/// `<|sec|usec|function|text|rv`
pub const RETURN_FIELDS_WITH_TEXT: usize = 6;

/// Token written for a null pointer or a null buffer.
pub const NULL_TOKEN: &str = "NULL";

/// Each multi-string item is counted with its NUL separator.
pub const ITEM_SEPARATOR_BYTES: usize = 1;

pub const USEC_PER_SEC: i64 = 1_000_000;

/// Placeholder for a well-formed value with no symbolic name.
pub const UNKNOWN_NAME: &str = "UNKNOWN";
