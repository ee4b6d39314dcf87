//! Shared advertising-layer types

use std::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Device Address
// ----------------------------------------------------------------------------

/// A 6-byte Bluetooth device address.
///
/// Stored in display order (most significant byte first); the wire carries
/// addresses least-significant-byte first, so use [`BdAddr::from_le_bytes`]
/// when parsing PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Build from wire order (least significant byte first)
    pub fn from_le_bytes(bytes: [u8; 6]) -> Self {
        let mut reversed = bytes;
        reversed.reverse();
        Self(reversed)
    }

    /// Wire order (least significant byte first), as used in nonces
    pub fn to_le_bytes(self) -> [u8; 6] {
        let mut reversed = self.0;
        reversed.reverse();
        reversed
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Address type bits carried in the PDU header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType {
    Public,
    Random,
}

impl AddressType {
    pub fn from_bit(set: bool) -> Self {
        if set {
            AddressType::Random
        } else {
            AddressType::Public
        }
    }
}
