//! Spy trace protocol decoding.
//!
//! The protocol follows a layered structure:
//! - `layout`: literal markers and separators (source of truth)
//! - `header`: call-header and return-record lines
//! - `tables`: symbolic names for enumerated values and bitmasks
//! - `decoders`: field decoders, each consuming a fixed shape of tokens
//! - `schema`: per-function ordered decoding plans
//! - `error`: explicit, actionable errors
//!
//! Decoders only touch the stream through [`crate::TokenSource`]; rendering
//! and output belong to the session layer.

pub mod decoders;
pub mod error;
pub mod header;
pub mod layout;
pub mod schema;
pub mod tables;
