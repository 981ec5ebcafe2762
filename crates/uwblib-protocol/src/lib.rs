//! uwblib-protocol: the line protocol spoken by the UWB module.
//!
//! Every message is a 3-byte prefix (class letter plus two-digit ID),
//! followed by zero or more comma-separated fields and a single `\r`.
//!
//! - [`types`] -- message keys, field types and values, decoded frames
//! - [`specifiers`] -- per-key field layouts and the stock module table
//! - [`codec`] -- encode a command, decode a received frame
//! - [`extractor`] -- cut frames out of an arbitrarily chunked byte stream

pub mod codec;
pub mod extractor;
pub mod specifiers;
pub mod types;

pub use codec::{decode, encode};
pub use extractor::FrameExtractor;
pub use specifiers::{SpecifierTable, SpecifierTableBuilder, uwb_module};
pub use types::{BlobEncoding, FieldType, FieldValue, Frame, MessageClass, MessageKey};
