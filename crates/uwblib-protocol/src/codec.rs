//! Encode commands and decode frames.
//!
//! Wire form: `<class><id>[,<field>]*<CR>`, for example `C05,1\r` or `R05\r`.
//! Both directions are pure functions of a [`SpecifierTable`] and their
//! input. Neither escapes the delimiter or terminator inside a field; text
//! and literal byte fields that contain them are rejected by the encoder,
//! since the module firmware has no way to tell them apart from framing.

use uwblib_core::{Error, Result};

use crate::specifiers::SpecifierTable;
use crate::types::{BlobEncoding, FieldType, FieldValue, Frame, MessageKey};

/// Field separator.
pub const DELIMITER: u8 = b',';

/// Frame terminator.
pub const TERMINATOR: u8 = b'\r';

/// Digits after the decimal point for encoded floats.
///
/// Floats go over the wire in fixed-point form, so a decoded value equals the
/// encoded one rounded to this many decimals. Values that need more digits,
/// such as `0.1234567` or anything below `5e-7`, do not survive a round trip
/// unchanged.
pub const FLOAT_PRECISION: usize = 6;

/// Encode `values` as a `key` message.
///
/// # Errors
///
/// - [`Error::UnknownMessageId`] if `key` has no specifier.
/// - [`Error::FieldArityMismatch`] if the value count differs from the specifier.
/// - [`Error::FieldTypeMismatch`] if a value cannot be converted losslessly to
///   its declared type, or would corrupt the framing.
pub fn encode(table: &SpecifierTable, key: MessageKey, values: &[FieldValue]) -> Result<Vec<u8>> {
    let layout = table.lookup(key)?;
    if layout.len() != values.len() {
        return Err(Error::FieldArityMismatch {
            key: key.to_string(),
            expected: layout.len(),
            actual: values.len(),
        });
    }

    let mut out = Vec::with_capacity(4 + values.len() * 8);
    out.extend_from_slice(&key.prefix());
    for (index, (ty, value)) in layout.iter().zip(values).enumerate() {
        let value = coerce(*ty, value).ok_or_else(|| mismatch(key, index, *ty, value))?;
        out.push(DELIMITER);
        render(key, index, *ty, &value, &mut out)?;
    }
    out.push(TERMINATOR);
    Ok(out)
}

/// Decode one raw frame.
///
/// `raw` may or may not include the trailing terminator.
///
/// # Errors
///
/// - [`Error::MalformedFrame`] if the prefix is invalid, the field count does
///   not match the specifier, or a field fails to parse.
/// - [`Error::UnknownMessageId`] if the prefix is well formed but unregistered.
pub fn decode(table: &SpecifierTable, raw: &[u8]) -> Result<Frame> {
    let body = raw.strip_suffix(&[TERMINATOR]).unwrap_or(raw);
    if body.contains(&TERMINATOR) {
        return Err(Error::MalformedFrame("embedded terminator".into()));
    }
    if body.len() < 3 {
        return Err(Error::MalformedFrame(format!(
            "frame too short: {:?}",
            String::from_utf8_lossy(body)
        )));
    }

    let key = MessageKey::from_prefix(&body[..3]).ok_or_else(|| {
        Error::MalformedFrame(format!(
            "invalid prefix: {:?}",
            String::from_utf8_lossy(&body[..3])
        ))
    })?;
    let layout = table.lookup(key)?;

    let rest = &body[3..];
    let raw_fields: Vec<&[u8]> = match rest.split_first() {
        None => Vec::new(),
        Some((&DELIMITER, tail)) => tail.split(|&b| b == DELIMITER).collect(),
        Some(_) => {
            return Err(Error::MalformedFrame(format!(
                "{key}: expected delimiter after prefix"
            )));
        }
    };

    if raw_fields.len() != layout.len() {
        return Err(Error::MalformedFrame(format!(
            "{key}: expected {} fields, got {}",
            layout.len(),
            raw_fields.len()
        )));
    }

    let fields = layout
        .iter()
        .zip(raw_fields)
        .enumerate()
        .map(|(index, (ty, raw))| {
            parse_field(*ty, raw).ok_or_else(|| {
                Error::MalformedFrame(format!(
                    "{key}: field {index} is not a valid {}: {:?}",
                    ty.name(),
                    String::from_utf8_lossy(raw)
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Frame::new(key, fields))
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn mismatch(key: MessageKey, index: usize, ty: FieldType, value: &FieldValue) -> Error {
    Error::FieldTypeMismatch {
        key: key.to_string(),
        index,
        expected: ty.name(),
        found: value.describe(),
    }
}

/// Convert `value` to the variant matching `ty`, accepting only lossless
/// conversions.
fn coerce(ty: FieldType, value: &FieldValue) -> Option<FieldValue> {
    use FieldValue as V;

    match (ty, value) {
        (FieldType::Text, V::Text(s)) => Some(V::Text(s.clone())),

        (FieldType::Int, V::Int(v)) => Some(V::Int(*v)),
        (FieldType::Int, V::UInt(v)) => i64::try_from(*v).ok().map(V::Int),
        (FieldType::Int, V::Text(s)) => s.trim().parse().ok().map(V::Int),

        (FieldType::UInt, V::UInt(v)) => Some(V::UInt(*v)),
        (FieldType::UInt, V::Int(v)) => u64::try_from(*v).ok().map(V::UInt),
        (FieldType::UInt, V::Text(s)) => s.trim().parse().ok().map(V::UInt),

        (FieldType::Float, V::Float(v)) => Some(V::Float(*v)),
        // Compare in a wider type: `as i64` saturates, which would make
        // i64::MAX look exact.
        (FieldType::Float, V::Int(v)) => {
            let f = *v as f32;
            (f as i128 == i128::from(*v)).then_some(V::Float(f))
        }
        (FieldType::Float, V::UInt(v)) => {
            let f = *v as f32;
            (f as u128 == u128::from(*v)).then_some(V::Float(f))
        }
        (FieldType::Float, V::Text(s)) => s.trim().parse().ok().map(V::Float),

        (FieldType::Bool, V::Bool(b)) => Some(V::Bool(*b)),
        (FieldType::Bool, V::Int(0) | V::UInt(0)) => Some(V::Bool(false)),
        (FieldType::Bool, V::Int(1) | V::UInt(1)) => Some(V::Bool(true)),

        (FieldType::Bytes(_), V::Bytes(b)) => Some(V::Bytes(b.clone())),
        (FieldType::Bytes(_), V::Text(s)) => Some(V::Bytes(s.as_bytes().to_vec())),

        _ => None,
    }
}

/// Append the canonical wire form of an already-coerced value.
fn render(
    key: MessageKey,
    index: usize,
    ty: FieldType,
    value: &FieldValue,
    out: &mut Vec<u8>,
) -> Result<()> {
    match value {
        FieldValue::Text(s) => {
            check_unframed(key, index, ty, value, s.as_bytes())?;
            out.extend_from_slice(s.as_bytes());
        }
        FieldValue::Int(v) => out.extend_from_slice(v.to_string().as_bytes()),
        FieldValue::UInt(v) => out.extend_from_slice(v.to_string().as_bytes()),
        FieldValue::Float(v) => {
            if !v.is_finite() {
                return Err(mismatch(key, index, ty, value));
            }
            out.extend_from_slice(format!("{:.*}", FLOAT_PRECISION, v).as_bytes());
        }
        FieldValue::Bool(b) => out.push(if *b { b'1' } else { b'0' }),
        FieldValue::Bytes(bytes) => match ty {
            FieldType::Bytes(BlobEncoding::Hex) => out.extend_from_slice(to_hex(bytes).as_bytes()),
            _ => {
                check_unframed(key, index, ty, value, bytes)?;
                out.extend_from_slice(bytes);
            }
        },
    }
    Ok(())
}

fn check_unframed(
    key: MessageKey,
    index: usize,
    ty: FieldType,
    value: &FieldValue,
    bytes: &[u8],
) -> Result<()> {
    if bytes.iter().any(|&b| b == DELIMITER || b == TERMINATOR) {
        return Err(Error::FieldTypeMismatch {
            key: key.to_string(),
            index,
            expected: ty.name(),
            found: format!("{} containing a delimiter or terminator", value.describe()),
        });
    }
    Ok(())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Decoding helpers
// ---------------------------------------------------------------------------

fn parse_field(ty: FieldType, raw: &[u8]) -> Option<FieldValue> {
    match ty {
        FieldType::Bytes(BlobEncoding::Literal) => Some(FieldValue::Bytes(raw.to_vec())),
        FieldType::Bytes(BlobEncoding::Hex) => from_hex(raw).map(FieldValue::Bytes),
        _ => {
            let s = std::str::from_utf8(raw).ok()?;
            match ty {
                FieldType::Text => Some(FieldValue::Text(s.to_string())),
                FieldType::Int => s.parse().ok().map(FieldValue::Int),
                FieldType::UInt => s.parse().ok().map(FieldValue::UInt),
                FieldType::Float => s.parse().ok().map(FieldValue::Float),
                FieldType::Bool => match s {
                    "0" => Some(FieldValue::Bool(false)),
                    "1" => Some(FieldValue::Bool(true)),
                    _ => None,
                },
                FieldType::Bytes(_) => None,
            }
        }
    }
}

fn from_hex(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 {
        return None;
    }
    raw.chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}
