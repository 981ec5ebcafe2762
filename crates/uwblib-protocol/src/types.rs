//! Message keys, field types, field values and decoded frames.

use std::fmt;
use std::str::FromStr;

use uwblib_core::{Error, Result};

/// The class of a protocol message, carried as the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// Host-to-module command (`C`).
    Command,
    /// Module reply to a command (`R`).
    Response,
    /// Unsolicited module message (`S`).
    Spontaneous,
}

impl MessageClass {
    /// The wire byte for this class.
    pub const fn as_byte(self) -> u8 {
        match self {
            MessageClass::Command => b'C',
            MessageClass::Response => b'R',
            MessageClass::Spontaneous => b'S',
        }
    }

    /// Parse a wire byte into a class.
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'C' => Some(MessageClass::Command),
            b'R' => Some(MessageClass::Response),
            b'S' => Some(MessageClass::Spontaneous),
            _ => None,
        }
    }
}

/// A message class plus a two-digit message ID, e.g. `C05` or `R01`.
///
/// IDs are decimal `0..=99`. Keys outside that range can be constructed but
/// are rejected by [`SpecifierTable`](crate::specifiers::SpecifierTable), so
/// they can never be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub class: MessageClass,
    pub id: u8,
}

impl MessageKey {
    pub const fn new(class: MessageClass, id: u8) -> Self {
        MessageKey { class, id }
    }

    pub const fn command(id: u8) -> Self {
        Self::new(MessageClass::Command, id)
    }

    pub const fn response(id: u8) -> Self {
        Self::new(MessageClass::Response, id)
    }

    pub const fn spontaneous(id: u8) -> Self {
        Self::new(MessageClass::Spontaneous, id)
    }

    /// The response key a command with this ID is answered with.
    pub const fn reply(self) -> Self {
        Self::response(self.id)
    }

    /// Whether the ID fits the two-digit wire form.
    pub const fn is_valid(self) -> bool {
        self.id < 100
    }

    /// The 3-byte wire prefix (`b"C05"`).
    pub const fn prefix(self) -> [u8; 3] {
        [self.class.as_byte(), b'0' + self.id / 10, b'0' + self.id % 10]
    }

    /// Parse a 3-byte wire prefix. Returns `None` unless `bytes` is exactly
    /// one class byte followed by two ASCII digits.
    pub fn from_prefix(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [c, d1, d0] if d1.is_ascii_digit() && d0.is_ascii_digit() => {
                let class = MessageClass::from_byte(*c)?;
                Some(Self::new(class, (d1 - b'0') * 10 + (d0 - b'0')))
            }
            _ => None,
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.class.as_byte() as char, self.id)
    }
}

impl FromStr for MessageKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MessageKey::from_prefix(s.as_bytes())
            .ok_or_else(|| Error::InvalidParameter(format!("invalid message key: {s:?}")))
    }
}

/// How a byte-blob field is rendered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobEncoding {
    /// Two hex digits per byte. Safe for arbitrary payloads.
    Hex,
    /// Raw bytes. The payload must not contain the delimiter or terminator.
    Literal,
}

/// The declared type of one field in a message specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// UTF-8 text without delimiter or terminator bytes.
    Text,
    /// Signed 64-bit integer in decimal.
    Int,
    /// Unsigned 64-bit integer in decimal.
    UInt,
    /// 32-bit float rendered with fixed precision.
    Float,
    /// `0` or `1`.
    Bool,
    /// Byte blob.
    Bytes(BlobEncoding),
}

impl FieldType {
    /// Short name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Int => "int",
            FieldType::UInt => "uint",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Bytes(BlobEncoding::Hex) => "hex bytes",
            FieldType::Bytes(BlobEncoding::Literal) => "bytes",
        }
    }
}

/// A single typed field value, either supplied to the encoder or produced
/// by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f32),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            FieldValue::Int(v) => Some(v),
            FieldValue::UInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::UInt(v) => Some(v),
            FieldValue::Int(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            FieldValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            FieldValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Human-readable description for error messages.
    pub fn describe(&self) -> String {
        match self {
            FieldValue::Text(s) => format!("text {s:?}"),
            FieldValue::Int(v) => format!("int {v}"),
            FieldValue::UInt(v) => format!("uint {v}"),
            FieldValue::Float(v) => format!("float {v}"),
            FieldValue::Bool(v) => format!("bool {v}"),
            FieldValue::Bytes(b) => format!("{} bytes", b.len()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::UInt(v.into())
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Bytes(b)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(b: &[u8]) -> Self {
        FieldValue::Bytes(b.to_vec())
    }
}

/// One complete decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub key: MessageKey,
    pub fields: Vec<FieldValue>,
}

impl Frame {
    pub fn new(key: MessageKey, fields: Vec<FieldValue>) -> Self {
        Frame { key, fields }
    }
}
