//! Symbolic names for PC/SC constants, keyed by value.

/// Parse a hexadecimal token, with or without a `0x` prefix.
///
/// # Examples
/// ```
/// use pcscspy_core::protocol::tables::parse_hex;
///
/// assert_eq!(parse_hex("0x0000001F"), Some(0x1f));
/// assert_eq!(parse_hex("1f"), Some(0x1f));
/// assert_eq!(parse_hex("NULL"), None);
/// ```
pub fn parse_hex(token: &str) -> Option<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Closed set of named values for one field.
#[derive(Debug)]
pub struct EnumTable {
    pub entries: &'static [(u64, &'static str)],
}

impl EnumTable {
    pub fn lookup(&self, value: u64) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == value)
            .map(|(_, name)| *name)
    }
}

/// Named bits of a bitmask field, in display order.
#[derive(Debug)]
pub struct BitTable {
    /// Name shown when no bit is set, if the field defines one.
    pub zero: Option<&'static str>,
    pub bits: &'static [(u64, &'static str)],
}

/// Result of splitting a value over a [`BitTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSet {
    pub names: Vec<&'static str>,
    /// Set bits that have no name in the table.
    pub residual: u64,
}

impl BitTable {
    pub fn decode(&self, value: u64) -> BitSet {
        let mut names = Vec::new();
        let mut known = 0u64;
        for (bit, name) in self.bits {
            if value & bit != 0 {
                names.push(*name);
                known |= bit;
            }
        }
        if value == 0 {
            if let Some(zero) = self.zero {
                names.push(zero);
            }
        }
        BitSet {
            names,
            residual: value & !known,
        }
    }

    /// OR together the bits for `names`; unknown names contribute nothing.
    pub fn encode(&self, names: &[&str]) -> u64 {
        self.bits
            .iter()
            .filter(|(_, name)| names.contains(name))
            .fold(0, |acc, (bit, _)| acc | bit)
    }
}

pub static SCOPES: EnumTable = EnumTable {
    entries: &[
        (0, "SCARD_SCOPE_USER"),
        (1, "SCARD_SCOPE_TERMINAL"),
        (2, "SCARD_SCOPE_SYSTEM"),
    ],
};

pub static SHARE_MODES: EnumTable = EnumTable {
    entries: &[
        (1, "SCARD_SHARE_EXCLUSIVE"),
        (2, "SCARD_SHARE_SHARED"),
        (3, "SCARD_SHARE_DIRECT"),
    ],
};

pub static DISPOSITIONS: EnumTable = EnumTable {
    entries: &[
        (0, "SCARD_LEAVE_CARD"),
        (1, "SCARD_RESET_CARD"),
        (2, "SCARD_UNPOWER_CARD"),
        (3, "SCARD_EJECT_CARD"),
    ],
};

pub static ATTRIBUTES: EnumTable = EnumTable {
    entries: &[
        (0x0001_0100, "SCARD_ATTR_VENDOR_NAME"),
        (0x0001_0102, "SCARD_ATTR_VENDOR_IFD_VERSION"),
        (0x0001_0103, "SCARD_ATTR_VENDOR_IFD_SERIAL_NO"),
        (0x0007_A007, "SCARD_ATTR_MAXINPUT"),
        (0x0009_0300, "SCARD_ATTR_ICC_PRESENCE"),
        (0x0009_0301, "SCARD_ATTR_ICC_INTERFACE_STATUS"),
        (0x0009_0303, "SCARD_ATTR_ATR_STRING"),
        (0x7FFF_0003, "SCARD_ATTR_DEVICE_FRIENDLY_NAME"),
    ],
};

/// `dwCurrentState` / `dwEventState` of a reader state record.
pub static READER_STATES: BitTable = BitTable {
    zero: Some("SCARD_STATE_UNAWARE"),
    bits: &[
        (0x0001, "SCARD_STATE_IGNORE"),
        (0x0002, "SCARD_STATE_CHANGED"),
        (0x0004, "SCARD_STATE_UNKNOWN"),
        (0x0008, "SCARD_STATE_UNAVAILABLE"),
        (0x0010, "SCARD_STATE_EMPTY"),
        (0x0020, "SCARD_STATE_PRESENT"),
        (0x0040, "SCARD_STATE_ATRMATCH"),
        (0x0080, "SCARD_STATE_EXCLUSIVE"),
        (0x0100, "SCARD_STATE_INUSE"),
        (0x0200, "SCARD_STATE_MUTE"),
        (0x0400, "SCARD_STATE_UNPOWERED"),
    ],
};

/// `dwState` returned by `SCardStatus`.
pub static CARD_STATES: BitTable = BitTable {
    zero: None,
    bits: &[
        (0x0001, "SCARD_UNKNOWN"),
        (0x0002, "SCARD_ABSENT"),
        (0x0004, "SCARD_PRESENT"),
        (0x0008, "SCARD_SWALLOWED"),
        (0x0010, "SCARD_POWERED"),
        (0x0020, "SCARD_NEGOTIABLE"),
        (0x0040, "SCARD_SPECIFIC"),
    ],
};

/// Transport protocols; the order is the first-match order.
pub static PROTOCOLS: BitTable = BitTable {
    zero: None,
    bits: &[(0x0001, "T=0"), (0x0002, "T=1"), (0x0004, "RAW"), (0x0008, "T=15")],
};
