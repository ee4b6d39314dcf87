//! BLE advertising payload parsing and interpretation
//!
//! This crate turns raw advertisement PDUs into typed readings: it parses
//! legacy and extended headers, walks the length-prefixed AD structure
//! stream, routes the resulting snapshot to protocol interpreters, and
//! handles AES-CCM decryption of encrypted payloads with per-device
//! replay protection. Like [`blesig_core`], it owns no transport.
//!
//! ## Architecture
//!
//! - [`pdu`] - legacy and extended advertising PDU headers
//! - [`structures`] - the AD structure walker and typed structures
//! - [`data`] - per-advertisement snapshot used for routing
//! - [`interpreter`] - interpreter trait and routing registry
//! - [`interpreters`] - the built-in interpreters
//! - [`state`] - per-device counters and key lookup
//! - [`ead`] - Encrypted Advertising Data primitives
//! - [`batch`] - async batch surface over the synchronous paths
//!
//! ## Usage
//!
//! ```rust
//! use blesig_adv::interpreter::InterpreterRegistry;
//! use blesig_adv::pdu::AdvertisingPdu;
//! use blesig_adv::data::AdvertisingData;
//! use blesig_adv::state::DeviceAdvertisingState;
//! use blesig_core::AssignedNumbers;
//!
//! // ADV_IND carrying flags and a complete local name
//! let raw = [
//!     0x00, 0x0D,
//!     0xA4, 0xC1, 0x38, 0x01, 0x02, 0x03,
//!     0x02, 0x01, 0x06,
//!     0x03, 0x09, b'h', b'i',
//! ];
//! let pdu = AdvertisingPdu::parse(&raw).unwrap();
//! let advertiser = pdu.advertiser.unwrap();
//! let data = AdvertisingData::from_structures(
//!     &pdu.structures,
//!     AssignedNumbers::global(),
//!     Some(-60),
//!     0,
//! );
//!
//! let registry = InterpreterRegistry::with_builtin();
//! let mut state = DeviceAdvertisingState::new(advertiser);
//! let results = registry.all_matches(&data, &mut state);
//! assert!(!results.is_empty());
//! ```
//!
//! Structure parsing is lenient (malformed structures degrade or drop),
//! but interpretation raises typed [`error::AdvError`]s: a missing key,
//! a replayed counter, and an unsupported version each demand different
//! remediation from the caller.

pub mod batch;
pub mod data;
pub mod ead;
pub mod error;
pub mod interpreter;
pub mod interpreters;
pub mod pdu;
pub mod state;
pub mod structures;
pub mod types;

pub use data::{AdvertisingData, ManufacturerData};
pub use error::AdvError;
pub use interpreter::{AdvertisingInterpreter, InterpreterInfo, InterpreterRegistry, Routing};
pub use interpreters::Interpretation;
pub use pdu::{AdvertisingPdu, ExtendedHeader, PduType};
pub use state::{DeviceAdvertisingState, KeyProvider, StaticKeyProvider};
pub use structures::{AdCategory, AdStructure, AdvertisingDataStructures};
pub use types::{AddressType, BdAddr};
