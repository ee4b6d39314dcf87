//! Error types for characteristic decoding and encoding
//!
//! Decode-side errors never escape `decode_characteristic` — they are folded
//! into a failed [`CharacteristicData`](crate::types::CharacteristicData).
//! Encode-side errors are returned synchronously to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Decode Errors
// ----------------------------------------------------------------------------

/// Errors raised while extracting raw fields from a characteristic value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Insufficient data: needed {needed} bytes, {available} available")]
    InsufficientData { needed: usize, available: usize },

    #[error("Invalid length: expected {expected}, got {actual} bytes")]
    InvalidLength { expected: String, actual: usize },

    #[error("Field '{field}' at offset {offset}: {reason}")]
    Field {
        field: String,
        offset: usize,
        reason: String,
    },

    #[error("Value {value} out of range [{min}, {max}]")]
    ValueOutOfRange { value: f64, min: f64, max: f64 },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("Reserved IEEE-11073 mantissa coding 0x{0:06X}")]
    ReservedFloatCoding(u32),
}

impl CodecError {
    /// Convenience constructor for field-scoped errors
    pub fn field(field: impl Into<String>, offset: usize, reason: impl Into<String>) -> Self {
        CodecError::Field {
            field: field.into(),
            offset,
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Encode Errors
// ----------------------------------------------------------------------------

/// Errors raised while serializing a value back to the wire layout
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("Type mismatch: codec expects {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Value {value} out of range [{min}, {max}]")]
    ValueOutOfRange { value: f64, min: f64, max: f64 },

    #[error("Value {value} does not fit in {width} byte(s)")]
    WidthOverflow { value: i64, width: usize },

    #[error("Value {0} is not representable as IEEE-11073 {1}")]
    FloatUnrepresentable(f64, &'static str),

    #[error("Special values cannot be re-encoded: {0}")]
    UnencodableSpecial(String),

    #[error("String too long: {len} bytes (max {max})")]
    StringTooLong { len: usize, max: usize },
}

// ----------------------------------------------------------------------------
// Field Error Record
// ----------------------------------------------------------------------------

/// One field-scoped failure captured during a best-effort decode.
///
/// Several of these may accumulate in a single parse; the parse as a whole is
/// still reported failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub offset: usize,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, offset: usize, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            offset,
            reason: reason.into(),
        }
    }
}

impl From<&CodecError> for FieldError {
    fn from(err: &CodecError) -> Self {
        match err {
            CodecError::Field {
                field,
                offset,
                reason,
            } => FieldError::new(field.clone(), *offset, reason.clone()),
            other => FieldError::new("<value>", 0, other.to_string()),
        }
    }
}

pub type Result<T> = core::result::Result<T, CodecError>;
