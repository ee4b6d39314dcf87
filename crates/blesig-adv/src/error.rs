//! Error types for advertising interpretation
//!
//! Unlike characteristic decoding, advertising interpretation returns typed
//! errors to the caller: a missing key, a replayed packet, and an unsupported
//! protocol version each demand a different remediation, so callers
//! pattern-match on the variant. Pipelines running several interpreters per
//! advertisement catch-and-continue per interpreter.

use blesig_core::CodecError;
use thiserror::Error;

use crate::types::BdAddr;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by PDU parsing and payload interpretation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdvError {
    #[error("Truncated PDU: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Unknown PDU type 0x{0:X}")]
    UnknownPduType(u8),

    /// The payload is encrypted and no key is provisioned for the device.
    /// Callers can prompt for a key and retry.
    #[error("Encryption key required for {address}")]
    EncryptionRequired { address: BdAddr },

    #[error("Decryption failed for {address}: {reason}")]
    DecryptionFailed { address: BdAddr, reason: String },

    /// Payload counter did not advance past the stored counter.
    #[error("Replay detected for {address}: received counter {received}, last seen {last}")]
    ReplayDetected {
        address: BdAddr,
        received: u32,
        last: u32,
    },

    /// Same packet id as the previous advertisement from this device.
    #[error("Duplicate packet 0x{packet_id:X} from {address}")]
    DuplicatePacket { address: BdAddr, packet_id: u64 },

    #[error("Unsupported protocol version {found}")]
    UnsupportedVersion { found: u8 },

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Field codec error: {0}")]
    Codec(#[from] CodecError),

    /// Generic interpreter-level failure with no more specific variant
    #[error("Interpreter error: {0}")]
    Interpreter(String),
}

pub type Result<T> = core::result::Result<T, AdvError>;
