//! UTF-8 string codec (Device Name, Manufacturer Name String, ...)

use crate::codec::{CharacteristicCodec, DecodeCtx, LengthConstraint};
use crate::errors::{CodecError, EncodeError};
use crate::fields::RawFrame;
use crate::types::Value;

#[derive(Debug, Clone)]
pub struct TextCodec {
    max_len: usize,
}

impl TextCodec {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for TextCodec {
    fn default() -> Self {
        // GATT attribute values cap at 512 bytes.
        Self::new(512)
    }
}

impl CharacteristicCodec for TextCodec {
    fn length(&self) -> LengthConstraint {
        LengthConstraint::Range(0, self.max_len)
    }

    fn decode_fields(&self, frame: &mut RawFrame<'_>, ctx: &mut DecodeCtx<'_>) -> Option<Value> {
        let offset = frame.position();
        let bytes = frame.rest();
        match core::str::from_utf8(bytes) {
            Ok(s) => {
                ctx.step(format!("text: {} bytes", s.len()));
                Some(Value::Text(s.to_string()))
            }
            Err(_) => {
                ctx.field_error("text", offset, CodecError::InvalidUtf8.to_string());
                None
            }
        }
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        match value {
            Value::Text(s) => {
                if s.len() > self.max_len {
                    return Err(EncodeError::StringTooLong {
                        len: s.len(),
                        max: self.max_len,
                    });
                }
                Ok(s.as_bytes().to_vec())
            }
            other => Err(EncodeError::TypeMismatch {
                expected: "Text".to_string(),
                actual: format!("{other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::special::SpecialValueResolver;

    #[test]
    fn test_utf8_roundtrip() {
        let codec = TextCodec::default();
        let resolver = SpecialValueResolver::new();
        let mut ctx = DecodeCtx::new(&resolver);
        let mut frame = RawFrame::new(b"Thermo Beacon");
        assert_eq!(
            codec.decode_fields(&mut frame, &mut ctx),
            Some(Value::Text("Thermo Beacon".to_string()))
        );
        assert_eq!(
            codec.encode(&Value::Text("Thermo Beacon".into())).unwrap(),
            b"Thermo Beacon"
        );
    }

    #[test]
    fn test_invalid_utf8_is_field_error() {
        let codec = TextCodec::default();
        let resolver = SpecialValueResolver::new();
        let mut ctx = DecodeCtx::new(&resolver);
        let mut frame = RawFrame::new(&[0xFF, 0xFE]);
        assert!(codec.decode_fields(&mut frame, &mut ctx).is_none());
        assert_eq!(ctx.field_errors[0].field, "text");
    }

    #[test]
    fn test_encode_caps_length() {
        let codec = TextCodec::new(4);
        assert!(matches!(
            codec.encode(&Value::Text("too long".into())),
            Err(EncodeError::StringTooLong { len: 8, max: 4 })
        ));
    }
}
