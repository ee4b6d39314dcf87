//! Characteristic codec registry
//!
//! Maps 16-bit characteristic UUIDs to their static descriptor, wire-format
//! codec, and shared sentinel resolver. The registry is the mutation point
//! for user sentinel overrides: changes through [`CodecRegistry::set_user_override`]
//! are visible to every subsequent decode immediately.
//!
//! Construction order: build (or take the lazy global) registry first, then
//! apply user overrides, then decode. Registration is expected at startup;
//! the entry map itself is not built for concurrent mutation.

use std::sync::{Arc, OnceLock, RwLock};

use hashbrown::HashMap;

use crate::codec::{
    decode_characteristic, BitFlagCodec, CharacteristicCodec, CompositeCodec, CompositeField,
    FieldKind, Presence, ScalarCodec, TextCodec,
};
use crate::errors::EncodeError;
use crate::special::{SpecialValueCategory, SpecialValueResolver, SpecialValueRule};
use crate::types::{CharacteristicData, CharacteristicInfo, Uuid16, Value, ValueType};

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

struct CodecEntry {
    info: CharacteristicInfo,
    codec: Arc<dyn CharacteristicCodec>,
    resolver: Arc<RwLock<SpecialValueResolver>>,
}

/// Registry of per-characteristic codecs, keyed by 16-bit UUID
#[derive(Default)]
pub struct CodecRegistry {
    entries: HashMap<Uuid16, CodecEntry>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in SIG characteristic table
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        builtin_table(&mut registry);
        registry
    }

    /// Process-wide lazily-initialized default registry.
    ///
    /// Concurrent first access from many threads converges to a single load.
    pub fn global() -> &'static CodecRegistry {
        static GLOBAL: OnceLock<CodecRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            tracing::debug!("loading built-in characteristic codec table");
            CodecRegistry::with_builtin()
        })
    }

    pub fn register(
        &mut self,
        info: CharacteristicInfo,
        codec: impl CharacteristicCodec + 'static,
        spec_rules: impl IntoIterator<Item = SpecialValueRule>,
    ) {
        let uuid = info.uuid;
        self.entries.insert(
            uuid,
            CodecEntry {
                info,
                codec: Arc::new(codec),
                resolver: Arc::new(RwLock::new(SpecialValueResolver::from_spec_rules(
                    spec_rules,
                ))),
            },
        );
    }

    pub fn contains(&self, uuid: Uuid16) -> bool {
        self.entries.contains_key(&uuid)
    }

    pub fn info(&self, uuid: Uuid16) -> Option<&CharacteristicInfo> {
        self.entries.get(&uuid).map(|e| &e.info)
    }

    /// Shared sentinel resolver for a characteristic class
    pub fn resolver(&self, uuid: Uuid16) -> Option<Arc<RwLock<SpecialValueResolver>>> {
        self.entries.get(&uuid).map(|e| Arc::clone(&e.resolver))
    }

    /// Decode one raw characteristic value.
    ///
    /// Returns `None` for an unknown UUID — no handler is not an error.
    /// Per-value failures surface as `parse_success == false` results.
    pub fn decode(&self, uuid: Uuid16, raw: &[u8]) -> Option<CharacteristicData> {
        let entry = self.entries.get(&uuid)?;
        let resolver = read_lock(&entry.resolver);
        Some(decode_characteristic(
            &entry.info,
            entry.codec.as_ref(),
            &resolver,
            raw,
        ))
    }

    /// Encode a value back to the exact wire layout of `uuid`.
    ///
    /// `None` for an unknown UUID; encode errors are returned to the caller.
    pub fn encode(&self, uuid: Uuid16, value: &Value) -> Option<Result<Vec<u8>, EncodeError>> {
        self.entries.get(&uuid).map(|e| e.codec.encode(value))
    }

    /// Install a user sentinel override, effective for all subsequent decodes
    pub fn set_user_override(&self, uuid: Uuid16, rule: SpecialValueRule) -> bool {
        match self.entries.get(&uuid) {
            Some(entry) => {
                write_lock(&entry.resolver).set_user_override(rule);
                true
            }
            None => false,
        }
    }

    /// Suppress a lower-tier sentinel rule for all subsequent decodes
    pub fn disable_special_value(&self, uuid: Uuid16, raw_value: i64) -> bool {
        match self.entries.get(&uuid) {
            Some(entry) => {
                write_lock(&entry.resolver).disable(raw_value);
                true
            }
            None => false,
        }
    }

    pub fn uuids(&self) -> impl Iterator<Item = Uuid16> + '_ {
        self.entries.keys().copied()
    }
}

fn read_lock(
    resolver: &RwLock<SpecialValueResolver>,
) -> std::sync::RwLockReadGuard<'_, SpecialValueResolver> {
    resolver.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock(
    resolver: &RwLock<SpecialValueResolver>,
) -> std::sync::RwLockWriteGuard<'_, SpecialValueResolver> {
    resolver.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// Built-in SIG Characteristic Table
// ----------------------------------------------------------------------------

fn unknown(raw: i64) -> SpecialValueRule {
    SpecialValueRule::new(raw, "Value is not known", SpecialValueCategory::Unknown)
}

fn builtin_table(registry: &mut CodecRegistry) {
    // Battery Level: one unsigned byte, 0..=100 percent.
    registry.register(
        CharacteristicInfo::new(Uuid16(0x2A19), "Battery Level", "%", ValueType::Unsigned),
        ScalarCodec::uint(1).with_range(0.0, 100.0),
        [],
    );

    // Environmental Sensing values.
    registry.register(
        CharacteristicInfo::new(Uuid16(0x2A6E), "Temperature", "°C", ValueType::Float),
        ScalarCodec::sint(2).with_resolution(0.01),
        [unknown(i16::MIN as i64)],
    );
    registry.register(
        CharacteristicInfo::new(Uuid16(0x2A6F), "Humidity", "%", ValueType::Float),
        ScalarCodec::uint(2)
            .with_resolution(0.01)
            .with_range(0.0, 100.0),
        [unknown(0xFFFF)],
    );
    registry.register(
        CharacteristicInfo::new(Uuid16(0x2A6D), "Pressure", "Pa", ValueType::Float),
        ScalarCodec::uint(4).with_resolution(0.1),
        [unknown(0xFFFF_FFFF)],
    );
    registry.register(
        CharacteristicInfo::new(Uuid16(0x2A6C), "Elevation", "m", ValueType::Float),
        ScalarCodec::sint(3).with_resolution(0.01),
        [unknown(-(1i64 << 23))],
    );

    registry.register(
        CharacteristicInfo::new(Uuid16(0x2A07), "Tx Power Level", "dBm", ValueType::Signed),
        ScalarCodec::sint(1).with_range(-100.0, 20.0),
        [],
    );
    registry.register(
        CharacteristicInfo::new(Uuid16(0x2A01), "Appearance", "", ValueType::Unsigned),
        ScalarCodec::uint(2),
        [],
    );

    // Strings.
    registry.register(
        CharacteristicInfo::new(Uuid16(0x2A00), "Device Name", "", ValueType::Text),
        TextCodec::default(),
        [],
    );
    registry.register(
        CharacteristicInfo::new(
            Uuid16(0x2A29),
            "Manufacturer Name String",
            "",
            ValueType::Text,
        ),
        TextCodec::default(),
        [],
    );

    // Flag registers.
    registry.register(
        CharacteristicInfo::new(Uuid16(0x2A3F), "Alert Status", "", ValueType::Flags),
        BitFlagCodec::new(1, ["ringer_active", "vibrate_active", "display_alert"]),
        [],
    );

    // Variable-length structures.
    registry.register(
        CharacteristicInfo::new(
            Uuid16(0x2A37),
            "Heart Rate Measurement",
            "bpm",
            ValueType::Composite,
        ),
        CompositeCodec::heart_rate_measurement(),
        [],
    );
    registry.register(
        CharacteristicInfo::new(
            Uuid16(0x2A1C),
            "Temperature Measurement",
            "°C",
            ValueType::Composite,
        ),
        CompositeCodec::new(vec![
            CompositeField::new("temperature", FieldKind::Float32, Presence::Always),
            CompositeField::new("timestamp", FieldKind::UInt(7), Presence::FlagBit(1)),
            CompositeField::new("temperature_type", FieldKind::UInt(1), Presence::FlagBit(2)),
        ]),
        [],
    );
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
