//! Per-device decryption state and key lookup.
//!
//! Interpreters that handle encrypted payloads carry monotonic counters
//! and last-seen packet ids per advertiser. Both live here, keyed by the
//! device address, so that replay and duplicate rejection survive across
//! packets without the interpreters holding their own bookkeeping.

use std::sync::Mutex;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::ead::EadKeyMaterial;
use crate::error::{AdvError, Result};
use crate::types::BdAddr;

/// Encryption bookkeeping for one advertiser.
#[derive(Debug, Clone, Default)]
pub struct EncryptionState {
    /// 16-byte bindkey for counter-based encrypted beacons.
    pub bindkey: Option<[u8; 16]>,
    /// Key material for EAD (AD type 0x31) payloads.
    pub ead: Option<EadKeyMaterial>,
    /// Highest counter accepted so far; `None` until the first accept.
    pub counter: Option<u32>,
}

/// Mutable per-device state threaded through interpretation.
///
/// One instance exists per advertiser address; interpreters receive it
/// mutably and advance counters only after successful decryption.
#[derive(Debug, Clone)]
pub struct DeviceAdvertisingState {
    pub address: BdAddr,
    pub encryption: EncryptionState,
    last_packet_id: Option<u64>,
}

impl DeviceAdvertisingState {
    pub fn new(address: BdAddr) -> Self {
        Self {
            address,
            encryption: EncryptionState::default(),
            last_packet_id: None,
        }
    }

    /// State with key material pre-loaded from `keys`.
    ///
    /// Interpreters never see the provider; they read
    /// [`EncryptionState`] and report [`AdvError::EncryptionRequired`]
    /// when the slot they need is empty.
    pub fn with_keys(address: BdAddr, keys: &dyn KeyProvider) -> Self {
        let mut state = Self::new(address);
        state.encryption.bindkey = keys.get_key(address);
        state.encryption.ead = keys.get_ead_key(address);
        state
    }

    /// Rejects counters at or below the last accepted value.
    ///
    /// The very first packet from a device is accepted at any counter,
    /// zero included; once one has been accepted via [`accept_counter`],
    /// every counter at or below it is a replay. Call before decryption;
    /// a failed decrypt must leave the counter untouched so a garbled
    /// packet cannot burn the window.
    ///
    /// [`accept_counter`]: Self::accept_counter
    pub fn check_counter(&self, received: u32) -> Result<()> {
        if let Some(last) = self.encryption.counter {
            if received <= last {
                return Err(AdvError::ReplayDetected {
                    address: self.address,
                    received,
                    last,
                });
            }
        }
        Ok(())
    }

    pub fn accept_counter(&mut self, received: u32) {
        self.encryption.counter = Some(received);
    }

    /// Rejects a packet id equal to the last one seen, without recording.
    ///
    /// Packet ids are advertiser-chosen dedup tokens (a counter byte, an
    /// EAD randomizer) and may wrap, so only exact repetition is rejected.
    /// Commit an accepted id with [`record_packet_id`] once the packet has
    /// fully decoded; a packet that fails later must not consume its id.
    ///
    /// [`record_packet_id`]: Self::record_packet_id
    pub fn check_packet_id(&self, packet_id: u64) -> Result<()> {
        if self.last_packet_id == Some(packet_id) {
            return Err(AdvError::DuplicatePacket {
                address: self.address,
                packet_id,
            });
        }
        Ok(())
    }

    pub fn record_packet_id(&mut self, packet_id: u64) {
        self.last_packet_id = Some(packet_id);
    }

    pub fn last_packet_id(&self) -> Option<u64> {
        self.last_packet_id
    }
}

/// Source of keys for encrypted advertisements.
///
/// Implementations typically front a config file or a pairing database.
/// A `None` return means the device is known to advertise encrypted data
/// but no key has been provisioned; interpreters surface that as
/// [`AdvError::EncryptionRequired`].
pub trait KeyProvider: Send + Sync {
    /// Bindkey for counter-based encrypted beacons.
    fn get_key(&self, address: BdAddr) -> Option<[u8; 16]>;

    /// Session key material for EAD payloads.
    fn get_ead_key(&self, address: BdAddr) -> Option<EadKeyMaterial>;
}

/// Wraps a [`KeyProvider`] and logs each missing key once per address.
///
/// Encrypted advertisers broadcast continuously; without throttling, a
/// single unprovisioned device floods the log at the advertising interval.
pub struct LoggedKeyProvider<P> {
    inner: P,
    missing: Mutex<HashSet<BdAddr>>,
}

impl<P: KeyProvider> LoggedKeyProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            missing: Mutex::new(HashSet::new()),
        }
    }

    fn note_missing(&self, address: BdAddr, kind: &str) {
        let mut missing = self
            .missing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if missing.insert(address) {
            debug!(%address, kind, "no key provisioned for encrypted advertiser");
        }
    }
}

impl<P: KeyProvider> KeyProvider for LoggedKeyProvider<P> {
    fn get_key(&self, address: BdAddr) -> Option<[u8; 16]> {
        let key = self.inner.get_key(address);
        if key.is_none() {
            self.note_missing(address, "bindkey");
        }
        key
    }

    fn get_ead_key(&self, address: BdAddr) -> Option<EadKeyMaterial> {
        let key = self.inner.get_ead_key(address);
        if key.is_none() {
            self.note_missing(address, "ead");
        }
        key
    }
}

/// In-memory key store backed by hash maps.
#[derive(Default)]
pub struct StaticKeyProvider {
    bindkeys: HashMap<BdAddr, [u8; 16]>,
    ead_keys: HashMap<BdAddr, EadKeyMaterial>,
}

impl StaticKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bindkey(&mut self, address: BdAddr, key: [u8; 16]) {
        self.bindkeys.insert(address, key);
    }

    pub fn add_ead_key(&mut self, address: BdAddr, material: EadKeyMaterial) {
        self.ead_keys.insert(address, material);
    }
}

impl KeyProvider for StaticKeyProvider {
    fn get_key(&self, address: BdAddr) -> Option<[u8; 16]> {
        self.bindkeys.get(&address).copied()
    }

    fn get_ead_key(&self, address: BdAddr) -> Option<EadKeyMaterial> {
        self.ead_keys.get(&address).cloned()
    }
}
