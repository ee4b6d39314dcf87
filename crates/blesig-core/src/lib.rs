//! Typed codecs for Bluetooth SIG GATT characteristic values
//!
//! This crate translates raw GATT characteristic bytes into typed, validated
//! domain values and performs the inverse encoding, per Bluetooth SIG
//! specifications. It owns no transport: callers hand it byte buffers they
//! obtained elsewhere.
//!
//! ## Architecture
//!
//! - [`fields`] - little-endian integer and IEEE-11073 float primitives
//! - [`special`] - three-tier sentinel ("special value") resolution
//! - [`codec`] - the per-characteristic codec contract and built-in codecs
//! - [`registry`] - UUID-keyed codec registry with shared resolvers
//! - [`assigned`] - read-only assigned-numbers lookup tables
//!
//! ## Usage
//!
//! ```rust
//! use blesig_core::registry::CodecRegistry;
//! use blesig_core::types::{Uuid16, Value};
//!
//! let registry = CodecRegistry::with_builtin();
//! let data = registry.decode(Uuid16(0x2A19), &[0x64]).unwrap();
//! assert!(data.parse_success);
//! assert_eq!(data.value, Some(Value::UInt(100)));
//! ```
//!
//! Decoding never panics and never returns an error past its own boundary:
//! failures become `parse_success == false` results carrying the field
//! errors and an ordered parse trace. Encoding validates its input and
//! returns typed errors synchronously.

pub mod assigned;
pub mod codec;
pub mod errors;
pub mod fields;
pub mod registry;
pub mod special;
pub mod types;

pub use assigned::{AssignedNumbers, CompanyInfo};
pub use codec::{CharacteristicCodec, DecodeCtx, LengthConstraint};
pub use errors::{CodecError, EncodeError, FieldError};
pub use registry::CodecRegistry;
pub use special::{SpecialValueCategory, SpecialValueMatch, SpecialValueResolver, SpecialValueRule};
pub use types::{CharacteristicData, CharacteristicInfo, Uuid16, Value, ValueType};
