//! Variable-length structure codec
//!
//! Handles the "flags byte gates optional trailing fields in fixed order"
//! layout used by Heart Rate Measurement and most measurement-style
//! characteristics. The flags register is decoded first; every subsequent
//! field is read in declared order only when its presence bit is set.
//!
//! On a field failure the walker keeps decoding later fields for diagnostic
//! completeness, but only while the declared schema still fits the remaining
//! buffer: a field that failed never contributes an offset, and an
//! insufficient-data failure stops the walk outright.

use crate::codec::{CharacteristicCodec, DecodeCtx, LengthConstraint};
use crate::errors::EncodeError;
use crate::fields::{parse_float, parse_sfloat, RawFrame};
use crate::types::Value;

// ----------------------------------------------------------------------------
// Schema Types
// ----------------------------------------------------------------------------

/// Wire format of one composite sub-field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    UInt(usize),
    Int(usize),
    Sfloat,
    /// 32-bit IEEE-11073 FLOAT
    Float32,
    /// One byte normally; the given flag bit widens the field to two bytes
    UIntSelect { wide_bit: u8 },
    /// The rest of the buffer as little-endian u16 entries
    U16List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Always,
    /// Present only when this bit of the flags register is set
    FlagBit(u8),
}

#[derive(Debug, Clone)]
pub struct CompositeField {
    pub name: String,
    pub kind: FieldKind,
    pub presence: Presence,
    /// Resolution multiplier applied to each decoded integer (1.0 = none)
    pub resolution: f64,
}

impl CompositeField {
    pub fn new(name: impl Into<String>, kind: FieldKind, presence: Presence) -> Self {
        Self {
            name: name.into(),
            kind,
            presence,
            resolution: 1.0,
        }
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    fn scale(&self, raw: i64) -> Value {
        if self.resolution == 1.0 {
            if matches!(self.kind, FieldKind::Int(_)) {
                Value::Int(raw)
            } else {
                Value::UInt(raw as u64)
            }
        } else {
            Value::Float(raw as f64 * self.resolution)
        }
    }
}

// ----------------------------------------------------------------------------
// Codec
// ----------------------------------------------------------------------------

/// Flags-register-driven structure of optional fields in fixed wire order
#[derive(Debug, Clone)]
pub struct CompositeCodec {
    fields: Vec<CompositeField>,
}

impl CompositeCodec {
    pub fn new(fields: Vec<CompositeField>) -> Self {
        Self { fields }
    }

    /// Heart Rate Measurement (0x2A37) schema
    pub fn heart_rate_measurement() -> Self {
        Self::new(vec![
            CompositeField::new(
                "heart_rate",
                FieldKind::UIntSelect { wide_bit: 0 },
                Presence::Always,
            ),
            CompositeField::new("energy_expended", FieldKind::UInt(2), Presence::FlagBit(3)),
            CompositeField::new("rr_intervals", FieldKind::U16List, Presence::FlagBit(4))
                .with_resolution(1.0 / 1024.0),
        ])
    }

    fn min_len(&self) -> usize {
        // Flags register plus every always-present field at its narrow width.
        1 + self
            .fields
            .iter()
            .filter(|f| f.presence == Presence::Always)
            .map(|f| match f.kind {
                FieldKind::UInt(w) | FieldKind::Int(w) => w,
                FieldKind::Sfloat => 2,
                FieldKind::Float32 => 4,
                FieldKind::UIntSelect { .. } => 1,
                FieldKind::U16List => 0,
            })
            .sum::<usize>()
    }

    fn field_width(&self, field: &CompositeField, flags: u8) -> Option<usize> {
        match field.kind {
            FieldKind::UInt(w) | FieldKind::Int(w) => Some(w),
            FieldKind::Sfloat => Some(2),
            FieldKind::Float32 => Some(4),
            FieldKind::UIntSelect { wide_bit } => {
                Some(if flags & (1 << wide_bit) != 0 { 2 } else { 1 })
            }
            FieldKind::U16List => None,
        }
    }
}

impl CharacteristicCodec for CompositeCodec {
    fn length(&self) -> LengthConstraint {
        LengthConstraint::Min(self.min_len())
    }

    fn decode_fields(&self, frame: &mut RawFrame<'_>, ctx: &mut DecodeCtx<'_>) -> Option<Value> {
        let flags = match frame.u8() {
            Ok(f) => f,
            Err(err) => {
                ctx.field_error("flags", 0, err.to_string());
                return None;
            }
        };
        ctx.step(format!("flags: 0x{flags:02X}"));

        let mut out: Vec<(String, Value)> = vec![("flags".to_string(), Value::UInt(flags as u64))];
        let mut failed = false;

        for field in &self.fields {
            if let Presence::FlagBit(bit) = field.presence {
                if flags & (1 << bit) == 0 {
                    continue;
                }
            }
            let offset = frame.position();

            match field.kind {
                FieldKind::U16List => {
                    if frame.remaining() % 2 != 0 {
                        ctx.field_error(
                            &field.name,
                            offset,
                            format!("odd trailing length {}", frame.remaining()),
                        );
                        failed = true;
                        break;
                    }
                    let mut entries = Vec::new();
                    while let Ok(raw) = frame.u16() {
                        entries.push(field.scale(raw as i64));
                    }
                    ctx.step(format!("{}: {} entries", field.name, entries.len()));
                    out.push((field.name.clone(), Value::List(entries)));
                }
                FieldKind::Sfloat | FieldKind::Float32 => {
                    let parsed = if field.kind == FieldKind::Sfloat {
                        frame.u16().map(|raw| parse_sfloat(raw))
                    } else {
                        frame.u32().map(|raw| parse_float(raw))
                    };
                    let parsed = match parsed {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            ctx.field_error(&field.name, offset, err.to_string());
                            failed = true;
                            // Truncated input invalidates every later offset.
                            break;
                        }
                    };
                    match parsed {
                        Ok(v) => {
                            ctx.step(format!("{}: {v}", field.name));
                            out.push((field.name.clone(), Value::Float(v)));
                        }
                        Err(err) => {
                            // Width was consumed, so the schema still holds:
                            // keep walking later fields for diagnostics.
                            ctx.field_error(&field.name, offset, err.to_string());
                            failed = true;
                        }
                    }
                }
                _ => {
                    let width = self
                        .field_width(field, flags)
                        .expect("list handled above");
                    let raw = match frame.take(width) {
                        Ok(bytes) => {
                            let mut v = 0i64;
                            for (i, b) in bytes.iter().enumerate() {
                                v |= (*b as i64) << (8 * i);
                            }
                            if matches!(field.kind, FieldKind::Int(_)) {
                                let shift = 64 - 8 * width as u32;
                                v = (v << shift) >> shift;
                            }
                            v
                        }
                        Err(err) => {
                            ctx.field_error(&field.name, offset, err.to_string());
                            failed = true;
                            break;
                        }
                    };
                    ctx.step(format!("{}: raw 0x{raw:X}", field.name));
                    if let Some(special) = ctx.resolve_special(raw) {
                        out.push((field.name.clone(), special));
                    } else {
                        out.push((field.name.clone(), field.scale(raw)));
                    }
                }
            }
        }

        if failed {
            None
        } else {
            Some(Value::Composite(out))
        }
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let entries = match value {
            Value::Composite(entries) => entries,
            other => {
                return Err(EncodeError::TypeMismatch {
                    expected: "Composite".to_string(),
                    actual: format!("{other:?}"),
                })
            }
        };
        let lookup = |name: &str| entries.iter().find(|(n, _)| n == name).map(|(_, v)| v);

        // Recompute the flags register from which optional fields are present.
        let mut flags = 0u8;
        for field in &self.fields {
            let present = lookup(&field.name).is_some();
            match field.presence {
                Presence::Always => {
                    if !present {
                        return Err(EncodeError::TypeMismatch {
                            expected: format!("field '{}'", field.name),
                            actual: "missing".to_string(),
                        });
                    }
                }
                Presence::FlagBit(bit) => {
                    if present {
                        flags |= 1 << bit;
                    }
                }
            }
            if let (FieldKind::UIntSelect { wide_bit }, Some(Value::UInt(v))) =
                (field.kind, lookup(&field.name))
            {
                if *v > u8::MAX as u64 {
                    flags |= 1 << wide_bit;
                }
            }
        }

        let mut bytes = vec![flags];
        for field in &self.fields {
            let Some(v) = lookup(&field.name) else { continue };
            let unscale = |v: &Value| -> Result<i64, EncodeError> {
                match (field.resolution, v) {
                    (r, Value::Float(f)) if r != 1.0 => Ok((f / r).round() as i64),
                    (_, Value::UInt(u)) => Ok(*u as i64),
                    (_, Value::Int(i)) => Ok(*i),
                    (_, other) => Err(EncodeError::TypeMismatch {
                        expected: "numeric".to_string(),
                        actual: format!("{other:?}"),
                    }),
                }
            };
            match field.kind {
                FieldKind::UInt(w) => {
                    let raw = unscale(v)?;
                    if raw < 0 {
                        return Err(EncodeError::WidthOverflow { value: raw, width: w });
                    }
                    bytes.extend_from_slice(&crate::fields::write_uint(raw as u64, w)?);
                }
                FieldKind::Int(w) => {
                    bytes.extend_from_slice(&crate::fields::write_int(unscale(v)?, w)?);
                }
                FieldKind::Sfloat | FieldKind::Float32 => {
                    let f = v.as_f64().ok_or_else(|| EncodeError::TypeMismatch {
                        expected: "Float".to_string(),
                        actual: format!("{v:?}"),
                    })?;
                    if field.kind == FieldKind::Sfloat {
                        bytes.extend_from_slice(&crate::fields::pack_sfloat(f)?.to_le_bytes());
                    } else {
                        bytes.extend_from_slice(&crate::fields::pack_float(f)?.to_le_bytes());
                    }
                }
                FieldKind::UIntSelect { .. } => {
                    let raw = unscale(v)?;
                    if raw < 0 || raw > u16::MAX as i64 {
                        return Err(EncodeError::WidthOverflow {
                            value: raw,
                            width: 2,
                        });
                    }
                    if raw > u8::MAX as i64 {
                        bytes.extend_from_slice(&(raw as u16).to_le_bytes());
                    } else {
                        bytes.push(raw as u8);
                    }
                }
                FieldKind::U16List => {
                    let Value::List(items) = v else {
                        return Err(EncodeError::TypeMismatch {
                            expected: "List".to_string(),
                            actual: format!("{v:?}"),
                        });
                    };
                    for item in items {
                        let raw = unscale(item)?;
                        if raw < 0 || raw > u16::MAX as i64 {
                            return Err(EncodeError::WidthOverflow {
                                value: raw,
                                width: 2,
                            });
                        }
                        bytes.extend_from_slice(&(raw as u16).to_le_bytes());
                    }
                }
            }
        }
        Ok(bytes)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::special::SpecialValueResolver;

    fn decode(codec: &CompositeCodec, raw: &[u8]) -> (Option<Value>, Vec<crate::errors::FieldError>) {
        let resolver = SpecialValueResolver::new();
        let mut ctx = DecodeCtx::new(&resolver);
        let mut frame = RawFrame::new(raw);
        let value = codec.decode_fields(&mut frame, &mut ctx);
        (value, ctx.field_errors)
    }

    #[test]
    fn test_heart_rate_narrow() {
        let codec = CompositeCodec::heart_rate_measurement();
        let (value, errors) = decode(&codec, &[0x00, 72]);
        assert!(errors.is_empty());
        let value = value.unwrap();
        assert_eq!(value.field("heart_rate"), Some(&Value::UInt(72)));
        assert_eq!(value.field("energy_expended"), None);
    }

    #[test]
    fn test_heart_rate_wide_with_energy_and_rr() {
        let codec = CompositeCodec::heart_rate_measurement();
        // bit0 wide, bit3 energy, bit4 rr
        let raw = [0x19, 0x2C, 0x01, 0x0A, 0x00, 0x00, 0x04];
        let (value, errors) = decode(&codec, &raw);
        assert!(errors.is_empty());
        let value = value.unwrap();
        assert_eq!(value.field("heart_rate"), Some(&Value::UInt(300)));
        assert_eq!(value.field("energy_expended"), Some(&Value::UInt(10)));
        match value.field("rr_intervals").unwrap() {
            Value::List(items) => {
                assert_eq!(items.len(), 1);
                // 0x0400 = 1024 -> exactly 1 second
                assert_eq!(items[0], Value::Float(1.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_truncated_optional_field_stops_walk() {
        let codec = CompositeCodec::heart_rate_measurement();
        // Energy-expended flag set but only one of its two bytes present.
        let (value, errors) = decode(&codec, &[0x08, 72, 0x0A]);
        assert!(value.is_none());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "energy_expended");
    }

    #[test]
    fn test_encode_roundtrip() {
        let codec = CompositeCodec::heart_rate_measurement();
        let raw = [0x19, 0x2C, 0x01, 0x0A, 0x00, 0x00, 0x04];
        let (value, _) = decode(&codec, &raw);
        let encoded = codec.encode(&value.unwrap()).unwrap();
        assert_eq!(encoded, raw);
    }
}
