//! IEEE-11073 medical float codec
//!
//! Used by the health-device characteristics (Temperature Measurement and
//! relatives) that carry SFLOAT/FLOAT values instead of scaled integers.

use crate::codec::{CharacteristicCodec, DecodeCtx, LengthConstraint};
use crate::errors::EncodeError;
use crate::fields::{pack_float, pack_sfloat, parse_float, parse_sfloat, RawFrame};
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MedFloatFormat {
    /// 16-bit SFLOAT
    Sfloat,
    /// 32-bit FLOAT
    Float,
}

#[derive(Debug, Clone)]
pub struct MedFloatCodec {
    format: MedFloatFormat,
}

impl MedFloatCodec {
    pub fn new(format: MedFloatFormat) -> Self {
        Self { format }
    }

    fn width(&self) -> usize {
        match self.format {
            MedFloatFormat::Sfloat => 2,
            MedFloatFormat::Float => 4,
        }
    }
}

impl CharacteristicCodec for MedFloatCodec {
    fn length(&self) -> LengthConstraint {
        LengthConstraint::Exact(self.width())
    }

    fn decode_fields(&self, frame: &mut RawFrame<'_>, ctx: &mut DecodeCtx<'_>) -> Option<Value> {
        let offset = frame.position();
        let raw = match self.format {
            MedFloatFormat::Sfloat => frame.u16().map(|v| v as u32),
            MedFloatFormat::Float => frame.u32(),
        };
        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                ctx.field_error("value", offset, err.to_string());
                return None;
            }
        };
        ctx.step(format!("value: raw 0x{raw:X}"));

        // Sentinel rules (if registered) beat the IEEE reserved codings.
        if let Some(special) = ctx.resolve_special(raw as i64) {
            return Some(special);
        }

        let parsed = match self.format {
            MedFloatFormat::Sfloat => parse_sfloat(raw as u16),
            MedFloatFormat::Float => parse_float(raw),
        };
        match parsed {
            Ok(v) => Some(Value::Float(v)),
            Err(err) => {
                ctx.field_error("value", offset, err.to_string());
                None
            }
        }
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let v = match value {
            Value::Float(v) => *v,
            Value::Special(m) => {
                return Err(EncodeError::UnencodableSpecial(m.rule.meaning.clone()))
            }
            other => {
                return Err(EncodeError::TypeMismatch {
                    expected: "Float".to_string(),
                    actual: format!("{other:?}"),
                })
            }
        };
        match self.format {
            MedFloatFormat::Sfloat => Ok(pack_sfloat(v)?.to_le_bytes().to_vec()),
            MedFloatFormat::Float => Ok(pack_float(v)?.to_le_bytes().to_vec()),
        }
    }
}
