//! Per-function decoding plans.
//!
//! Each schema lists, in emission order, the fields the spy library writes
//! between a call header and its return record. Executing a schema must
//! consume exactly those tokens, so these tables are literal data and are
//! never altered at runtime.

use super::decoders::{Decoder, ProtocolPolicy};
use super::tables::{ATTRIBUTES, CARD_STATES, DISPOSITIONS, SCOPES, SHARE_MODES};
use crate::Direction::{self, In, Out};

#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub direction: Direction,
    pub label: &'static str,
    pub decoder: Decoder,
}

#[derive(Debug)]
pub struct CallSchema {
    pub function: &'static str,
    pub steps: &'static [Step],
}

const fn step(direction: Direction, label: &'static str, decoder: Decoder) -> Step {
    Step {
        direction,
        label,
        decoder,
    }
}

const fn opaque(direction: Direction, label: &'static str) -> Step {
    step(direction, label, Decoder::Opaque)
}

const IN_CONTEXT: Step = opaque(In, "hContext");
const IN_CARD: Step = opaque(In, "hCard");
const SHARE_MODE: Step = step(In, "dwShareMode", Decoder::Enum(&SHARE_MODES));
const PREFERRED_PROTOCOLS: Step = step(
    In,
    "dwPreferredProtocols",
    Decoder::Protocol(ProtocolPolicy::Multi),
);
const ACTIVE_PROTOCOL: Step = step(
    Out,
    "dwActiveProtocol",
    Decoder::Protocol(ProtocolPolicy::Single),
);
const DISPOSITION: Step = step(In, "dwDisposition", Decoder::Enum(&DISPOSITIONS));
const ATTRIBUTE: Step = step(In, "dwAttrId", Decoder::Enum(&ATTRIBUTES));

pub static SCHEMAS: &[CallSchema] = &[
    CallSchema {
        function: "SCardEstablishContext",
        steps: &[
            step(In, "dwScope", Decoder::Enum(&SCOPES)),
            opaque(Out, "hContext"),
        ],
    },
    CallSchema {
        function: "SCardIsValidContext",
        steps: &[IN_CONTEXT],
    },
    CallSchema {
        function: "SCardReleaseContext",
        steps: &[IN_CONTEXT],
    },
    CallSchema {
        function: "SCardListReaders",
        steps: &[
            IN_CONTEXT,
            opaque(In, "mszGroups"),
            step(
                Out,
                "pcchReaders",
                Decoder::Blob {
                    item_label: "mszReaders",
                },
            ),
        ],
    },
    CallSchema {
        function: "SCardListReaderGroups",
        steps: &[
            IN_CONTEXT,
            opaque(In, "pcchGroups"),
            step(
                Out,
                "pcchGroups",
                Decoder::Blob {
                    item_label: "mszGroups",
                },
            ),
        ],
    },
    CallSchema {
        function: "SCardFreeMemory",
        steps: &[IN_CONTEXT, opaque(In, "pvMem")],
    },
    CallSchema {
        function: "SCardGetStatusChange",
        steps: &[
            IN_CONTEXT,
            opaque(In, "dwTimeout"),
            step(In, "cReaders", Decoder::ReaderCount),
            step(In, "rgReaderStates", Decoder::ReaderStates),
            step(Out, "rgReaderStates", Decoder::ReaderStates),
        ],
    },
    CallSchema {
        function: "SCardCancel",
        steps: &[IN_CONTEXT],
    },
    CallSchema {
        function: "SCardConnect",
        steps: &[
            IN_CONTEXT,
            opaque(In, "szReader"),
            SHARE_MODE,
            PREFERRED_PROTOCOLS,
            opaque(In, "phCard"),
            opaque(In, "pdwActiveProtocol"),
            opaque(Out, "phCard"),
            ACTIVE_PROTOCOL,
        ],
    },
    CallSchema {
        function: "SCardReconnect",
        steps: &[
            IN_CARD,
            SHARE_MODE,
            PREFERRED_PROTOCOLS,
            step(In, "dwInitialization", Decoder::Enum(&DISPOSITIONS)),
            ACTIVE_PROTOCOL,
        ],
    },
    CallSchema {
        function: "SCardDisconnect",
        steps: &[IN_CARD, DISPOSITION],
    },
    CallSchema {
        function: "SCardBeginTransaction",
        steps: &[IN_CARD],
    },
    CallSchema {
        function: "SCardEndTransaction",
        steps: &[IN_CARD, DISPOSITION],
    },
    CallSchema {
        function: "SCardStatus",
        steps: &[
            IN_CARD,
            opaque(In, "pcchReaderLen"),
            opaque(In, "pcbAtrLen"),
            step(
                Out,
                "cchReaderLen",
                Decoder::Blob {
                    item_label: "mszReaderName",
                },
            ),
            step(Out, "dwState", Decoder::Bitmask(&CARD_STATES)),
            step(
                Out,
                "dwProtocol",
                Decoder::Protocol(ProtocolPolicy::Single),
            ),
            step(
                Out,
                "bAtrLen",
                Decoder::Buffer {
                    data_label: "bAtr",
                },
            ),
        ],
    },
    CallSchema {
        function: "SCardTransmit",
        steps: &[
            IN_CARD,
            opaque(In, "bSendLength"),
            opaque(In, "bSendBuffer"),
            opaque(Out, "bRecvLength"),
            opaque(Out, "bRecvBuffer"),
        ],
    },
    CallSchema {
        function: "SCardControl",
        steps: &[
            IN_CARD,
            opaque(In, "dwControlCode"),
            opaque(In, "bSendLength"),
            opaque(In, "bSendBuffer"),
            opaque(Out, "bRecvLength"),
            opaque(Out, "bRecvBuffer"),
        ],
    },
    CallSchema {
        function: "SCardGetAttrib",
        steps: &[
            IN_CARD,
            ATTRIBUTE,
            opaque(Out, "bAttrLen"),
            opaque(Out, "bAttr"),
        ],
    },
    CallSchema {
        function: "SCardSetAttrib",
        steps: &[
            IN_CARD,
            ATTRIBUTE,
            opaque(In, "bAttrLen"),
            opaque(In, "bAttr"),
        ],
    },
];

/// Look up a schema by exact function name.
///
/// # Examples
/// ```
/// use pcscspy_core::protocol::schema::lookup;
///
/// assert_eq!(lookup("SCardTransmit").map(|s| s.steps.len()), Some(5));
/// assert!(lookup("scardtransmit").is_none());
/// ```
pub fn lookup(function: &str) -> Option<&'static CallSchema> {
    SCHEMAS.iter().find(|schema| schema.function == function)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const REQUIRED: &[&str] = &[
        "SCardEstablishContext",
        "SCardIsValidContext",
        "SCardReleaseContext",
        "SCardListReaders",
        "SCardListReaderGroups",
        "SCardFreeMemory",
        "SCardGetStatusChange",
        "SCardConnect",
        "SCardTransmit",
        "SCardControl",
        "SCardGetAttrib",
        "SCardSetAttrib",
        "SCardStatus",
        "SCardReconnect",
        "SCardDisconnect",
        "SCardBeginTransaction",
        "SCardEndTransaction",
    ];

    #[test]
    fn every_required_function_has_a_schema() {
        for function in REQUIRED {
            assert!(lookup(function).is_some(), "missing schema for {function}");
        }
    }

    #[test]
    fn function_names_are_unique() {
        let names: HashSet<_> = SCHEMAS.iter().map(|schema| schema.function).collect();
        assert_eq!(names.len(), SCHEMAS.len());
    }

    #[test]
    fn reader_states_follow_a_reader_count() {
        for schema in SCHEMAS {
            let mut seen_count = false;
            for step in schema.steps {
                match step.decoder {
                    Decoder::ReaderCount => seen_count = true,
                    Decoder::ReaderStates => assert!(seen_count, "{}", schema.function),
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn protocol_policies_are_bound_per_field() {
        let connect = lookup("SCardConnect").unwrap();
        let policy_of = |label: &str| {
            connect
                .steps
                .iter()
                .find_map(|step| match step.decoder {
                    Decoder::Protocol(policy) if step.label == label => Some(policy),
                    _ => None,
                })
        };
        assert_eq!(policy_of("dwPreferredProtocols"), Some(ProtocolPolicy::Multi));
        assert_eq!(policy_of("dwActiveProtocol"), Some(ProtocolPolicy::Single));
    }
}
