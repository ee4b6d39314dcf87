//! Built-in advertisement interpreters.

use blesig_core::Value;

use crate::interpreter::InterpreterRegistry;
use crate::structures::AdStructure;

pub mod ead;
pub mod generic;
pub mod sensor;

pub use ead::EadInterpreter;
pub use generic::GenericInterpreter;
pub use sensor::SensorBeaconInterpreter;

/// One named reading extracted from an advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub name: &'static str,
    pub value: Value,
}

/// Structured result of one interpreter run.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Telemetry beacon readings, decrypted if the payload required it.
    SensorBeacon {
        encrypted: bool,
        readings: Vec<SensorReading>,
    },
    /// Decrypted Encrypted Advertising Data, re-parsed into AD structures.
    Ead { structures: Vec<AdStructure> },
    /// Best-effort summary from the catch-all interpreter.
    Generic {
        name: String,
        details: Vec<(String, String)>,
    },
}

/// Registers the built-in interpreters in dispatch-priority order.
pub fn register_builtin(registry: &mut InterpreterRegistry) {
    sensor::register(registry);
    ead::register(registry);
    generic::register(registry);
}
