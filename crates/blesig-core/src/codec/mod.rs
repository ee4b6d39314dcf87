//! Characteristic codec contract
//!
//! One [`CharacteristicCodec`] implementation exists per wire format. A shared
//! wrapper, [`decode_characteristic`], drives every decode through the same
//! state machine:
//!
//! ```text
//! START -> LENGTH_CHECK -> { FAIL | FIELD_DECODE* -> POST_VALIDATE -> { FAIL | SUCCESS } }
//! ```
//!
//! No state persists across calls. Decode failures never escape the wrapper;
//! they become a `parse_success == false` result so batch reads survive one
//! bad characteristic. Encoding validates symmetrically and returns errors
//! synchronously, since encode input is caller-controlled.

mod bitflag;
mod composite;
mod medfloat;
mod scalar;
mod text;

pub use bitflag::BitFlagCodec;
pub use composite::{CompositeCodec, CompositeField, FieldKind, Presence};
pub use medfloat::{MedFloatCodec, MedFloatFormat};
pub use scalar::ScalarCodec;
pub use text::TextCodec;

use crate::errors::{CodecError, EncodeError, FieldError};
use crate::fields::RawFrame;
use crate::special::SpecialValueResolver;
use crate::types::{CharacteristicData, CharacteristicInfo, Value, ValueType};

// ----------------------------------------------------------------------------
// Length Constraints
// ----------------------------------------------------------------------------

/// Declared byte-length constraint of a characteristic's wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthConstraint {
    Exact(usize),
    Min(usize),
    Range(usize, usize),
}

impl LengthConstraint {
    pub fn check(&self, actual: usize) -> Result<(), CodecError> {
        let ok = match *self {
            LengthConstraint::Exact(n) => actual == n,
            LengthConstraint::Min(n) => actual >= n,
            LengthConstraint::Range(lo, hi) => actual >= lo && actual <= hi,
        };
        if ok {
            Ok(())
        } else {
            Err(CodecError::InvalidLength {
                expected: self.describe(),
                actual,
            })
        }
    }

    /// Declared minimum, for insufficient-data classification
    pub fn min(&self) -> usize {
        match *self {
            LengthConstraint::Exact(n) | LengthConstraint::Min(n) => n,
            LengthConstraint::Range(lo, _) => lo,
        }
    }

    fn describe(&self) -> String {
        match *self {
            LengthConstraint::Exact(n) => format!("{n}"),
            LengthConstraint::Min(n) => format!(">= {n}"),
            LengthConstraint::Range(lo, hi) => format!("{lo}..={hi}"),
        }
    }
}

// ----------------------------------------------------------------------------
// Decode Context
// ----------------------------------------------------------------------------

/// Per-call scratch state handed to a codec's field decode.
///
/// Collects field errors and the ordered parse trace; exposes the resolver so
/// codecs consult sentinel rules immediately after raw extraction.
pub struct DecodeCtx<'a> {
    resolver: &'a SpecialValueResolver,
    pub(crate) field_errors: Vec<FieldError>,
    pub(crate) trace: Vec<String>,
}

impl<'a> DecodeCtx<'a> {
    pub fn new(resolver: &'a SpecialValueResolver) -> Self {
        Self {
            resolver,
            field_errors: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Record one step of the parse, in order
    pub fn step(&mut self, msg: impl Into<String>) {
        self.trace.push(msg.into());
    }

    /// Record a field-scoped failure without aborting the decode
    pub fn field_error(&mut self, field: &str, offset: usize, reason: impl Into<String>) {
        self.field_errors
            .push(FieldError::new(field, offset, reason));
    }

    /// Consult sentinel rules for a freshly extracted raw value.
    ///
    /// A match short-circuits semantic translation: the caller returns the
    /// special meaning instead of a scaled value.
    pub fn resolve_special(&mut self, raw: i64) -> Option<Value> {
        let matched = self.resolver.resolve(raw)?;
        self.step(format!(
            "raw 0x{raw:X} matched special value '{}'",
            matched.rule.meaning
        ));
        Some(Value::Special(matched))
    }
}

// ----------------------------------------------------------------------------
// Codec Trait
// ----------------------------------------------------------------------------

/// One wire-format handler: field decode plus symmetric encode.
///
/// Implementations are stateless and shared across threads; all per-call
/// state lives in the [`DecodeCtx`].
pub trait CharacteristicCodec: Send + Sync {
    /// Declared byte-length constraint, checked before any field read
    fn length(&self) -> LengthConstraint;

    /// Extract fields from the frame.
    ///
    /// Returns `None` when the decode failed fatally; field errors pushed to
    /// the context roll up into the failure either way. Implementations may
    /// keep decoding later fields after one fails for diagnostic completeness,
    /// but only while the declared schema still fits the remaining buffer.
    fn decode_fields(&self, frame: &mut RawFrame<'_>, ctx: &mut DecodeCtx<'_>) -> Option<Value>;

    /// Post-decode range validation against static constraints
    fn validate(&self, _value: &Value) -> Result<(), CodecError> {
        Ok(())
    }

    /// Serialize a value back to the exact wire layout
    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError>;
}

// ----------------------------------------------------------------------------
// Decode Wrapper
// ----------------------------------------------------------------------------

/// Run one characteristic decode through the shared state machine.
pub fn decode_characteristic(
    info: &CharacteristicInfo,
    codec: &dyn CharacteristicCodec,
    resolver: &SpecialValueResolver,
    raw: &[u8],
) -> CharacteristicData {
    let mut ctx = DecodeCtx::new(resolver);
    ctx.step(format!("start: {} [{}]", info.name, hex::encode(raw)));

    // LENGTH_CHECK: fatal, short-circuits field decode entirely.
    if let Err(err) = codec.length().check(raw.len()) {
        ctx.step("length check failed".to_string());
        let message = if raw.len() < codec.length().min() {
            CodecError::InsufficientData {
                needed: codec.length().min(),
                available: raw.len(),
            }
            .to_string()
        } else {
            err.to_string()
        };
        return CharacteristicData::failure(info, message, raw, ctx.field_errors, ctx.trace);
    }
    ctx.step("length ok".to_string());

    // FIELD_DECODE*
    let mut frame = RawFrame::new(raw);
    let value = codec.decode_fields(&mut frame, &mut ctx);

    let value = match value {
        Some(v) if ctx.field_errors.is_empty() => v,
        _ => {
            let message = ctx
                .field_errors
                .first()
                .map(|e| format!("field '{}' at offset {}: {}", e.field, e.offset, e.reason))
                .unwrap_or_else(|| "decode failed".to_string());
            return CharacteristicData::failure(info, message, raw, ctx.field_errors, ctx.trace);
        }
    };

    // POST_VALIDATE: declared type, then codec-specific range constraints.
    if !matches!(value, Value::Special(_)) {
        let actual = value.value_type();
        if !type_compatible(info.value_type, actual) {
            ctx.step("type validation failed".to_string());
            let err = CodecError::TypeMismatch {
                expected: format!("{:?}", info.value_type),
                actual: format!("{actual:?}"),
            };
            return CharacteristicData::failure(info, err.to_string(), raw, ctx.field_errors, ctx.trace);
        }
        if let Err(err) = codec.validate(&value) {
            ctx.step("range validation failed".to_string());
            return CharacteristicData::failure(info, err.to_string(), raw, ctx.field_errors, ctx.trace);
        }
    }

    ctx.step("success".to_string());
    CharacteristicData::success(info, value, raw, ctx.trace)
}

fn type_compatible(declared: ValueType, actual: ValueType) -> bool {
    declared == actual
        // Scaled integers surface as floats once a resolution multiplier applies.
        || (declared == ValueType::Float
            && matches!(actual, ValueType::Unsigned | ValueType::Signed))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::special::{SpecialValueCategory, SpecialValueRule};
    use crate::types::Uuid16;

    fn battery_info() -> CharacteristicInfo {
        CharacteristicInfo::new(Uuid16(0x2A19), "Battery Level", "%", ValueType::Unsigned)
    }

    #[test]
    fn test_battery_level_decodes() {
        let info = battery_info();
        let codec = ScalarCodec::uint(1).with_range(0.0, 100.0);
        let resolver = SpecialValueResolver::new();

        let data = decode_characteristic(&info, &codec, &resolver, &[0x64]);
        assert!(data.parse_success);
        assert_eq!(data.value, Some(Value::UInt(100)));
        assert!(data.error_message.is_none());
    }

    #[test]
    fn test_short_buffer_reports_insufficient_data() {
        let info = CharacteristicInfo::new(Uuid16(0x2A6E), "Temperature", "°C", ValueType::Float);
        let codec = ScalarCodec::sint(2).with_resolution(0.01);
        let resolver = SpecialValueResolver::new();

        let data = decode_characteristic(&info, &codec, &resolver, &[0x90]);
        assert!(!data.parse_success);
        assert!(data.value.is_none());
        let msg = data.error_message.unwrap();
        assert!(msg.contains("needed 2"), "{msg}");
        assert!(msg.contains("1 available"), "{msg}");
    }

    #[test]
    fn test_range_violation_fails_post_validate() {
        let info = battery_info();
        let codec = ScalarCodec::uint(1).with_range(0.0, 100.0);
        let resolver = SpecialValueResolver::new();

        let data = decode_characteristic(&info, &codec, &resolver, &[0x65]);
        assert!(!data.parse_success);
        assert!(data.error_message.unwrap().contains("out of range"));
    }

    #[test]
    fn test_special_value_short_circuits_translation() {
        let info = CharacteristicInfo::new(Uuid16(0x2A6E), "Temperature", "°C", ValueType::Float);
        let codec = ScalarCodec::sint(2).with_resolution(0.01);
        let resolver = SpecialValueResolver::from_spec_rules([SpecialValueRule::new(
            i16::MIN as i64,
            "Value is not known",
            SpecialValueCategory::Unknown,
        )]);

        let data = decode_characteristic(&info, &codec, &resolver, &[0x00, 0x80]);
        assert!(data.parse_success);
        match data.value.unwrap() {
            Value::Special(m) => assert_eq!(m.rule.meaning, "Value is not known"),
            other => panic!("expected special, got {other:?}"),
        }
    }

    #[test]
    fn test_trace_records_ordered_steps() {
        let info = battery_info();
        let codec = ScalarCodec::uint(1);
        let resolver = SpecialValueResolver::new();

        let data = decode_characteristic(&info, &codec, &resolver, &[0x2A]);
        assert!(data.trace.first().unwrap().starts_with("start"));
        assert_eq!(data.trace.last().unwrap(), "success");
    }
}
