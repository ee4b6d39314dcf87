//! Core domain types shared across the characteristic codec layer

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::FieldError;
use crate::special::SpecialValueMatch;

// ----------------------------------------------------------------------------
// UUIDs
// ----------------------------------------------------------------------------

/// The Bluetooth SIG base UUID; 16- and 32-bit assigned IDs expand into it.
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x00000000_0000_1000_8000_00805F9B34FB);

/// A 16-bit SIG-assigned UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uuid16(pub u16);

impl Uuid16 {
    /// Expand to the full 128-bit UUID using the SIG base
    pub fn to_uuid(self) -> Uuid {
        expand_sig_uuid(self.0 as u32)
    }
}

impl fmt::Display for Uuid16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Expand a 16- or 32-bit assigned number into the SIG base UUID
pub fn expand_sig_uuid(short: u32) -> Uuid {
    let base = BLUETOOTH_BASE_UUID.as_u128();
    Uuid::from_u128(base | ((short as u128) << 96))
}

// ----------------------------------------------------------------------------
// Values
// ----------------------------------------------------------------------------

/// Declared semantic type of a characteristic's decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Unsigned,
    Signed,
    Float,
    Text,
    Flags,
    Composite,
    Bytes,
}

/// A decoded characteristic value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Named bit flags in declared bit order
    Flags(Vec<(String, bool)>),
    /// Repeated homogeneous entries (e.g. RR intervals)
    List(Vec<Value>),
    /// A sentinel raw coding resolved to its semantic meaning
    Special(SpecialValueMatch),
    /// Named sub-fields of a variable-length structure, in wire order
    Composite(Vec<(String, Value)>),
}

impl Value {
    /// Look up a sub-field of a composite value by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Composite(fields) => {
                fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// The semantic type this value satisfies
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::UInt(_) => ValueType::Unsigned,
            Value::Int(_) => ValueType::Signed,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Flags(_) => ValueType::Flags,
            // Lists only occur inside composite structures.
            Value::List(_) => ValueType::Composite,
            // Specials stand in for whatever type the codec declares.
            Value::Special(_) => ValueType::Unsigned,
            Value::Composite(_) => ValueType::Composite,
        }
    }
}

// ----------------------------------------------------------------------------
// Characteristic Metadata & Results
// ----------------------------------------------------------------------------

/// Static descriptor of a characteristic, process-lifetime and read-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicInfo {
    pub uuid: Uuid16,
    pub name: String,
    /// Unit symbol, e.g. "°C" or "%" (empty when unitless)
    pub unit: String,
    pub value_type: ValueType,
}

impl CharacteristicInfo {
    pub fn new(
        uuid: Uuid16,
        name: impl Into<String>,
        unit: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        Self {
            uuid,
            name: name.into(),
            unit: unit.into(),
            value_type,
        }
    }
}

/// Result of decoding one characteristic value.
///
/// Immutable once constructed. `parse_success == false` guarantees
/// `value.is_none()`; the constructors enforce this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicData {
    pub uuid: Uuid16,
    pub name: String,
    pub value: Option<Value>,
    pub parse_success: bool,
    /// First fatal error, when the parse failed
    pub error_message: Option<String>,
    pub raw_data: Vec<u8>,
    /// Every field-scoped failure captured during best-effort decode
    pub field_errors: Vec<FieldError>,
    /// Ordered record of decode steps, for debugging tools
    pub trace: Vec<String>,
}

impl CharacteristicData {
    pub fn success(
        info: &CharacteristicInfo,
        value: Value,
        raw_data: &[u8],
        trace: Vec<String>,
    ) -> Self {
        Self {
            uuid: info.uuid,
            name: info.name.clone(),
            value: Some(value),
            parse_success: true,
            error_message: None,
            raw_data: raw_data.to_vec(),
            field_errors: Vec::new(),
            trace,
        }
    }

    pub fn failure(
        info: &CharacteristicInfo,
        error_message: impl Into<String>,
        raw_data: &[u8],
        field_errors: Vec<FieldError>,
        trace: Vec<String>,
    ) -> Self {
        Self {
            uuid: info.uuid,
            name: info.name.clone(),
            value: None,
            parse_success: false,
            error_message: Some(error_message.into()),
            raw_data: raw_data.to_vec(),
            field_errors,
            trace,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
