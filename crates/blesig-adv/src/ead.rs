//! Encrypted Advertising Data (Core Spec Supplement)
//!
//! Wire layout is fixed: `[5B randomizer][variable ciphertext][4B MIC]`,
//! minimum 9 bytes. Decryption is AES-128-CCM with a 4-byte tag and a
//! 13-byte nonce of `randomizer || device address || zero padding`.

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit, Payload};
use ccm::consts::{U13, U4};
use ccm::Ccm;
use smallvec::SmallVec;

use crate::error::{AdvError, Result};
use crate::types::BdAddr;

/// AES-128-CCM with 4-byte MIC and 13-byte nonce
pub(crate) type Aes128Ccm4 = Ccm<Aes128, U4, U13>;

pub const EAD_RANDOMIZER_LEN: usize = 5;
pub const EAD_MIC_LEN: usize = 4;
pub const EAD_MIN_LEN: usize = EAD_RANDOMIZER_LEN + EAD_MIC_LEN;

// ----------------------------------------------------------------------------
// Key Material
// ----------------------------------------------------------------------------

/// Session key material for EAD: 16-byte AES-128 key plus 8-byte IV.
///
/// Lengths are validated here, at construction, not at decrypt time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EadKeyMaterial {
    key: [u8; 16],
    iv: [u8; 8],
}

impl EadKeyMaterial {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        let key: [u8; 16] = key
            .try_into()
            .map_err(|_| AdvError::InvalidKeyMaterial(format!("key must be 16 bytes, got {}", key.len())))?;
        let iv: [u8; 8] = iv
            .try_into()
            .map_err(|_| AdvError::InvalidKeyMaterial(format!("iv must be 8 bytes, got {}", iv.len())))?;
        Ok(Self { key, iv })
    }

    pub fn key(&self) -> &[u8; 16] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; 8] {
        &self.iv
    }
}

// ----------------------------------------------------------------------------
// Payload
// ----------------------------------------------------------------------------

/// A structurally valid EAD payload, split into its fixed sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EadPayload<'a> {
    pub randomizer: [u8; EAD_RANDOMIZER_LEN],
    pub ciphertext: &'a [u8],
    pub mic: [u8; EAD_MIC_LEN],
}

impl<'a> EadPayload<'a> {
    /// Validate the fixed layout. Fails before any decryption attempt.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < EAD_MIN_LEN {
            return Err(AdvError::Truncated {
                needed: EAD_MIN_LEN,
                available: bytes.len(),
            });
        }
        let mut randomizer = [0u8; EAD_RANDOMIZER_LEN];
        randomizer.copy_from_slice(&bytes[..EAD_RANDOMIZER_LEN]);
        let mut mic = [0u8; EAD_MIC_LEN];
        mic.copy_from_slice(&bytes[bytes.len() - EAD_MIC_LEN..]);
        Ok(Self {
            randomizer,
            ciphertext: &bytes[EAD_RANDOMIZER_LEN..bytes.len() - EAD_MIC_LEN],
            mic,
        })
    }

    /// The randomizer reinterpreted as a packet id for duplicate detection
    pub fn packet_id(&self) -> u64 {
        self.randomizer
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64)
    }
}

// ----------------------------------------------------------------------------
// Decryption
// ----------------------------------------------------------------------------

fn nonce(randomizer: &[u8; EAD_RANDOMIZER_LEN], address: BdAddr) -> SmallVec<[u8; 13]> {
    let mut nonce = SmallVec::new();
    nonce.extend_from_slice(randomizer);
    nonce.extend_from_slice(&address.to_le_bytes());
    nonce.extend_from_slice(&[0u8; 2]);
    nonce
}

/// Decrypt an EAD payload. Tag mismatch or malformed ciphertext reports a
/// decryption failure carrying the device address.
pub fn decrypt(payload: &EadPayload<'_>, material: &EadKeyMaterial, address: BdAddr) -> Result<Vec<u8>> {
    let cipher = Aes128Ccm4::new(material.key().into());

    // RustCrypto AEADs take ciphertext || tag.
    let mut msg = payload.ciphertext.to_vec();
    msg.extend_from_slice(&payload.mic);

    cipher
        .decrypt(
            GenericArray::from_slice(&nonce(&payload.randomizer, address)),
            Payload {
                msg: &msg,
                aad: &[],
            },
        )
        .map_err(|_| AdvError::DecryptionFailed {
            address,
            reason: "authentication tag mismatch".to_string(),
        })
}

/// Produce a complete EAD payload. The inverse of [`decrypt`]; used by
/// devices emitting encrypted advertisements and by tests.
pub fn encrypt(
    plaintext: &[u8],
    material: &EadKeyMaterial,
    address: BdAddr,
    randomizer: [u8; EAD_RANDOMIZER_LEN],
) -> Result<Vec<u8>> {
    let cipher = Aes128Ccm4::new(material.key().into());
    let sealed = cipher
        .encrypt(
            GenericArray::from_slice(&nonce(&randomizer, address)),
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|_| AdvError::DecryptionFailed {
            address,
            reason: "encryption failed".to_string(),
        })?;

    let mut out = Vec::with_capacity(EAD_RANDOMIZER_LEN + sealed.len());
    out.extend_from_slice(&randomizer);
    out.extend_from_slice(&sealed);
    Ok(out)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
