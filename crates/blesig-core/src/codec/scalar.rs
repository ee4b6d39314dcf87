//! Fixed-width scaled integer codec
//!
//! Covers the bulk of the SIG characteristic table: Battery Level, the
//! environmental sensing values (Temperature, Humidity, Pressure), Tx Power
//! and friends. Raw extraction is a single little-endian integer; the sentinel
//! resolver is consulted on the raw coding before any scaling.

use crate::codec::{CharacteristicCodec, DecodeCtx, LengthConstraint};
use crate::errors::{CodecError, EncodeError};
use crate::fields::{write_int, write_uint, RawFrame};
use crate::types::Value;

/// Little-endian integer field with resolution multiplier and offset.
///
/// The decoded value is `raw * resolution + offset`; when both are the
/// identity the raw integer is surfaced unscaled.
#[derive(Debug, Clone)]
pub struct ScalarCodec {
    width: usize,
    signed: bool,
    resolution: f64,
    offset: f64,
    range: Option<(f64, f64)>,
}

impl ScalarCodec {
    pub fn uint(width: usize) -> Self {
        Self {
            width,
            signed: false,
            resolution: 1.0,
            offset: 0.0,
            range: None,
        }
    }

    pub fn sint(width: usize) -> Self {
        Self {
            signed: true,
            ..Self::uint(width)
        }
    }

    /// Resolution multiplier, e.g. 0.01 for centi-units
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Inclusive range of the decoded (scaled) value
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    fn is_identity(&self) -> bool {
        self.resolution == 1.0 && self.offset == 0.0
    }

    fn scale(&self, raw: i64) -> Value {
        if self.is_identity() {
            if self.signed {
                Value::Int(raw)
            } else {
                Value::UInt(raw as u64)
            }
        } else {
            Value::Float(raw as f64 * self.resolution + self.offset)
        }
    }

    /// Invert the scaling back to the raw wire integer
    fn unscale(&self, value: &Value) -> Result<i64, EncodeError> {
        match value {
            Value::UInt(v) if !self.signed && self.is_identity() => Ok(*v as i64),
            Value::Int(v) if self.signed && self.is_identity() => Ok(*v),
            Value::Float(v) if !self.is_identity() => {
                let raw = (v - self.offset) / self.resolution;
                let rounded = raw.round();
                if (raw - rounded).abs() > 1e-6 {
                    return Err(EncodeError::FloatUnrepresentable(*v, "scaled integer"));
                }
                Ok(rounded as i64)
            }
            other => Err(EncodeError::TypeMismatch {
                expected: if self.is_identity() {
                    if self.signed { "Int" } else { "UInt" }.to_string()
                } else {
                    "Float".to_string()
                },
                actual: format!("{other:?}"),
            }),
        }
    }
}

impl CharacteristicCodec for ScalarCodec {
    fn length(&self) -> LengthConstraint {
        LengthConstraint::Exact(self.width)
    }

    fn decode_fields(&self, frame: &mut RawFrame<'_>, ctx: &mut DecodeCtx<'_>) -> Option<Value> {
        let offset = frame.position();
        let raw = match frame.take(self.width) {
            Ok(bytes) => {
                let mut v = 0i64;
                for (i, b) in bytes.iter().enumerate() {
                    v |= (*b as i64) << (8 * i);
                }
                if self.signed {
                    let shift = 64 - 8 * self.width as u32;
                    v = (v << shift) >> shift;
                }
                v
            }
            Err(err) => {
                ctx.field_error("value", offset, err.to_string());
                return None;
            }
        };
        ctx.step(format!("value: raw 0x{raw:X}"));

        if let Some(special) = ctx.resolve_special(raw) {
            return Some(special);
        }
        Some(self.scale(raw))
    }

    fn validate(&self, value: &Value) -> Result<(), CodecError> {
        if let (Some((min, max)), Some(v)) = (self.range, value.as_f64()) {
            if v < min || v > max {
                return Err(CodecError::ValueOutOfRange { value: v, min, max });
            }
        }
        Ok(())
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        if let Value::Special(m) = value {
            return Err(EncodeError::UnencodableSpecial(m.rule.meaning.clone()));
        }
        if let (Some((min, max)), Some(v)) = (self.range, value.as_f64()) {
            if v < min || v > max {
                return Err(EncodeError::ValueOutOfRange { value: v, min, max });
            }
        }
        let raw = self.unscale(value)?;
        if self.signed {
            write_int(raw, self.width)
        } else {
            if raw < 0 {
                return Err(EncodeError::WidthOverflow {
                    value: raw,
                    width: self.width,
                });
            }
            write_uint(raw as u64, self.width)
        }
    }
}
