//! Bitmap-indexed message codec.
//!
//! Wire layout: 4 ASCII digits of MTI, an 8-byte primary bitmap, an optional
//! 8-byte secondary bitmap (flagged by bit 1 of the primary one), then each
//! flagged field in ascending order. Bitmaps are most-significant-bit first,
//! bit `n` of the combined map standing for field `n`.

mod error;
mod message;
mod spec;

pub use error::{DecodingError, EncodingError};
pub use message::{FieldValue, ProtocolMessage, hex};
pub use spec::{FieldClass, FieldSpec, FieldTable, field_name, standard_fields};

const MTI_LEN: usize = 4;
const BITMAP_LEN: usize = 8;
/// Highest field number addressable with both bitmaps.
pub const MAX_FIELD: u8 = 128;

/// Pack a message into its wire representation.
pub fn encode(message: &ProtocolMessage, table: &FieldTable) -> Result<Vec<u8>, EncodingError> {
    let mti = message.mti();
    if mti.len() != MTI_LEN || !mti.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EncodingError::InvalidMti(mti.to_string()));
    }

    let secondary = message.has_secondary_bitmap();
    let mut bitmap = [0u8; BITMAP_LEN * 2];
    if secondary {
        set_bit(&mut bitmap, 1);
    }

    let mut body = Vec::new();
    for (field, value) in message.fields() {
        if field == 1 {
            return Err(EncodingError::ReservedField);
        }
        let spec = match table.get(field) {
            Some(spec) if field <= MAX_FIELD => spec,
            _ => return Err(EncodingError::UnknownField(field)),
        };
        encode_field(field, value, spec, &mut body)?;
        set_bit(&mut bitmap, field);
    }

    let bitmap_len = if secondary { BITMAP_LEN * 2 } else { BITMAP_LEN };
    let mut out = Vec::with_capacity(MTI_LEN + bitmap_len + body.len());
    out.extend_from_slice(mti.as_bytes());
    out.extend_from_slice(&bitmap[..bitmap_len]);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Unpack a wire buffer into a fresh message.
pub fn decode(bytes: &[u8], table: &FieldTable) -> Result<ProtocolMessage, DecodingError> {
    let mut reader = Reader { bytes, pos: 0 };

    let mti = reader.take(MTI_LEN)?;
    if !mti.iter().all(u8::is_ascii_digit) {
        return Err(DecodingError::InvalidMti);
    }
    // all digits, so valid utf-8
    let mut message = ProtocolMessage::new(String::from_utf8_lossy(mti).into_owned());

    let mut bitmap = [0u8; BITMAP_LEN * 2];
    bitmap[..BITMAP_LEN].copy_from_slice(reader.take(BITMAP_LEN)?);
    let last_field = if is_set(&bitmap, 1) {
        bitmap[BITMAP_LEN..].copy_from_slice(reader.take(BITMAP_LEN)?);
        MAX_FIELD
    } else {
        64
    };

    for field in 2..=last_field {
        if !is_set(&bitmap, field) {
            continue;
        }
        let spec = table.get(field).ok_or(DecodingError::UnknownField(field))?;
        let value = decode_field(field, spec, &mut reader)?;
        message.set(field, value);
    }

    let remaining = reader.remaining();
    if remaining > 0 {
        return Err(DecodingError::TrailingBytes(remaining));
    }
    Ok(message)
}

/// Pad short fixed-length text fields the way [`encode`] would put them on
/// the wire, so that decoding the encoded message gives back `message`.
///
/// Fields without a spec, binary values and variable fields are left alone.
pub fn canonicalize(message: &mut ProtocolMessage, table: &FieldTable) {
    let padded: Vec<(u8, String)> = message
        .fields()
        .filter_map(|(field, value)| {
            let spec = table.get(field)?;
            let text = value.as_str()?;
            let missing = spec.length.checked_sub(text.len()).filter(|n| *n > 0)?;
            match spec.class {
                FieldClass::Numeric => Some((field, format!("{}{text}", "0".repeat(missing)))),
                FieldClass::Alphanumeric => Some((field, format!("{text}{}", " ".repeat(missing)))),
                FieldClass::LlVar | FieldClass::LllVar | FieldClass::Binary => None,
            }
        })
        .collect();
    for (field, text) in padded {
        message.set(field, text);
    }
}

fn encode_field(
    field: u8,
    value: &FieldValue,
    spec: &FieldSpec,
    out: &mut Vec<u8>,
) -> Result<(), EncodingError> {
    let too_long = |len: usize| EncodingError::FieldTooLong {
        field,
        len,
        max: spec.length,
    };

    if spec.class == FieldClass::Binary {
        let FieldValue::Binary(bytes) = value else {
            return Err(EncodingError::WrongValueKind(field));
        };
        if bytes.len() != spec.length {
            return Err(EncodingError::BinaryLength {
                field,
                len: bytes.len(),
                expected: spec.length,
            });
        }
        out.extend_from_slice(bytes);
        return Ok(());
    }

    let FieldValue::Text(text) = value else {
        return Err(EncodingError::WrongValueKind(field));
    };
    let len = text.len();
    if len > spec.length {
        return Err(too_long(len));
    }
    if spec.numeric && !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EncodingError::NonNumeric(field));
    }

    let width = spec.length;
    match spec.class {
        FieldClass::Numeric => out.extend_from_slice(format!("{text:0>width$}").as_bytes()),
        FieldClass::Alphanumeric => {
            // padded in bytes, so multi-byte text keeps the field width
            out.extend_from_slice(text.as_bytes());
            out.resize(out.len() + width - len, b' ');
        }
        FieldClass::LlVar | FieldClass::LllVar => {
            let prefix = spec.prefix_width().unwrap_or(2);
            out.extend_from_slice(format!("{len:0prefix$}").as_bytes());
            out.extend_from_slice(text.as_bytes());
        }
        FieldClass::Binary => unreachable!("binary fields return early"),
    }
    Ok(())
}

fn decode_field(
    field: u8,
    spec: &FieldSpec,
    reader: &mut Reader<'_>,
) -> Result<FieldValue, DecodingError> {
    if spec.class == FieldClass::Binary {
        return Ok(FieldValue::Binary(reader.take(spec.length)?.to_vec()));
    }

    let len = match spec.prefix_width() {
        None => spec.length,
        Some(width) => {
            let prefix = reader.take(width)?;
            if !prefix.iter().all(u8::is_ascii_digit) {
                return Err(DecodingError::InvalidLengthPrefix(field));
            }
            let len = prefix
                .iter()
                .fold(0usize, |acc, digit| acc * 10 + usize::from(digit - b'0'));
            if len > spec.length {
                return Err(DecodingError::FieldTooLong {
                    field,
                    len,
                    max: spec.length,
                });
            }
            len
        }
    };

    let raw = reader.take(len)?;
    if spec.numeric && !raw.iter().all(u8::is_ascii_digit) {
        return Err(DecodingError::NonNumeric(field));
    }
    let text = std::str::from_utf8(raw).map_err(|_| DecodingError::InvalidText(field))?;
    Ok(FieldValue::Text(text.to_string()))
}

fn set_bit(bitmap: &mut [u8; BITMAP_LEN * 2], field: u8) {
    let index = usize::from(field - 1);
    bitmap[index / 8] |= 0x80 >> (index % 8);
}

fn is_set(bitmap: &[u8; BITMAP_LEN * 2], field: u8) -> bool {
    let index = usize::from(field - 1);
    bitmap[index / 8] & (0x80 >> (index % 8)) != 0
}

/// Cursor over the input buffer that fails instead of reading past the end.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodingError> {
        let available = self.remaining();
        if n > available {
            return Err(DecodingError::Truncated {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}
