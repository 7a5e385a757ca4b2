//! Error types for the field codec.

use thiserror::Error;

/// Error raised while packing a [`ProtocolMessage`](super::ProtocolMessage).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("message type indicator '{0}' is not 4 decimal digits")]
    InvalidMti(String),

    #[error("field 1 is the secondary bitmap flag and cannot be set")]
    ReservedField,

    #[error("field {0} has no field spec")]
    UnknownField(u8),

    #[error("field {field}: value length {len} exceeds {max}")]
    FieldTooLong { field: u8, len: usize, max: usize },

    #[error("field {field}: binary value must be exactly {expected} bytes, got {len}")]
    BinaryLength { field: u8, len: usize, expected: usize },

    #[error("field {0}: numeric field contains non-digit characters")]
    NonNumeric(u8),

    #[error("field {0}: value kind does not match the field encoding")]
    WrongValueKind(u8),
}

/// Error raised while unpacking bytes into a [`ProtocolMessage`](super::ProtocolMessage).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodingError {
    #[error("message type indicator is not 4 decimal digits")]
    InvalidMti,

    #[error("buffer truncated: needed {needed} bytes at offset {offset}, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("field {0} is flagged in the bitmap but has no field spec")]
    UnknownField(u8),

    #[error("field {0}: length prefix is not decimal")]
    InvalidLengthPrefix(u8),

    #[error("field {field}: declared length {len} exceeds {max}")]
    FieldTooLong { field: u8, len: usize, max: usize },

    #[error("field {0}: value is not valid text")]
    InvalidText(u8),

    #[error("field {0}: numeric field contains non-digit characters")]
    NonNumeric(u8),

    #[error("{0} trailing bytes after the last field")]
    TrailingBytes(usize),
}
