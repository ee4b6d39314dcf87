//! Named bit-flag field codec (Alert Status and similar flag registers)

use crate::codec::{CharacteristicCodec, DecodeCtx, LengthConstraint};
use crate::errors::EncodeError;
use crate::fields::{write_uint, RawFrame};
use crate::types::Value;

/// Fixed-width register whose bits carry named boolean flags.
///
/// Bit `i` of the little-endian register maps to `flag_names[i]`; bits past
/// the named set are reserved and must read zero on encode input.
#[derive(Debug, Clone)]
pub struct BitFlagCodec {
    width: usize,
    flag_names: Vec<String>,
}

impl BitFlagCodec {
    pub fn new(width: usize, flag_names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let flag_names: Vec<String> = flag_names.into_iter().map(Into::into).collect();
        debug_assert!(flag_names.len() <= width * 8);
        Self { width, flag_names }
    }
}

impl CharacteristicCodec for BitFlagCodec {
    fn length(&self) -> LengthConstraint {
        LengthConstraint::Exact(self.width)
    }

    fn decode_fields(&self, frame: &mut RawFrame<'_>, ctx: &mut DecodeCtx<'_>) -> Option<Value> {
        let offset = frame.position();
        let register = match frame.take(self.width) {
            Ok(bytes) => {
                let mut v = 0u64;
                for (i, b) in bytes.iter().enumerate() {
                    v |= (*b as u64) << (8 * i);
                }
                v
            }
            Err(err) => {
                ctx.field_error("flags", offset, err.to_string());
                return None;
            }
        };
        ctx.step(format!("flags: raw 0x{register:X}"));

        if let Some(special) = ctx.resolve_special(register as i64) {
            return Some(special);
        }

        let flags = self
            .flag_names
            .iter()
            .enumerate()
            .map(|(bit, name)| (name.clone(), register & (1 << bit) != 0))
            .collect();
        Some(Value::Flags(flags))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let flags = match value {
            Value::Flags(flags) => flags,
            Value::Special(m) => {
                return Err(EncodeError::UnencodableSpecial(m.rule.meaning.clone()))
            }
            other => {
                return Err(EncodeError::TypeMismatch {
                    expected: "Flags".to_string(),
                    actual: format!("{other:?}"),
                })
            }
        };
        let mut register = 0u64;
        for (name, set) in flags {
            let bit = self
                .flag_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| EncodeError::TypeMismatch {
                    expected: format!("one of {:?}", self.flag_names),
                    actual: name.clone(),
                })?;
            if *set {
                register |= 1 << bit;
            }
        }
        write_uint(register, self.width)
    }
}
