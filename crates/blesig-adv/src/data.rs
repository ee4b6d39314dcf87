//! Per-advertisement data snapshot
//!
//! [`AdvertisingData`] is built fresh for each advertisement from the parsed
//! structure tree and never mutated afterwards. It is the routing input for
//! the interpreter registry.

use blesig_core::assigned::{AssignedNumbers, CompanyInfo};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::structures::{AdStructure, AdvertisingDataStructures};

/// Manufacturer-specific payload with its resolved company identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturerData {
    pub company: CompanyInfo,
    pub payload: Vec<u8>,
}

/// Immutable snapshot of one advertisement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvertisingData {
    pub manufacturer_data: HashMap<u16, ManufacturerData>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub service_uuids: Vec<Uuid>,
    pub local_name: Option<String>,
    /// Encrypted Advertising Data payloads, opaque until an interpreter
    /// decrypts them
    pub encrypted_data: Vec<Vec<u8>>,
    pub rssi: Option<i8>,
    /// Reception time in milliseconds, supplied by the transport (0 unknown)
    pub timestamp_ms: u64,
}

impl AdvertisingData {
    /// Build a snapshot from a parsed structure tree.
    ///
    /// `rssi` and `timestamp_ms` come from the transport; this layer performs
    /// no clock reads.
    pub fn from_structures(
        structures: &AdvertisingDataStructures,
        assigned: &AssignedNumbers,
        rssi: Option<i8>,
        timestamp_ms: u64,
    ) -> Self {
        let mut data = AdvertisingData {
            rssi,
            timestamp_ms,
            ..AdvertisingData::default()
        };

        for structure in structures.iter() {
            match structure {
                AdStructure::ManufacturerData {
                    company_id,
                    payload,
                } => {
                    data.manufacturer_data.insert(
                        *company_id,
                        ManufacturerData {
                            company: assigned.company(*company_id),
                            payload: payload.clone(),
                        },
                    );
                }
                AdStructure::ServiceData { uuid, data: bytes } => {
                    data.service_data.insert(*uuid, bytes.clone());
                }
                AdStructure::ServiceUuids { uuids, .. } => {
                    data.service_uuids.extend_from_slice(uuids);
                }
                AdStructure::LocalName { name, complete } => {
                    // A complete name wins over a shortened one.
                    if *complete || data.local_name.is_none() {
                        data.local_name = Some(name.clone());
                    }
                }
                AdStructure::EncryptedData(payload) => {
                    data.encrypted_data.push(payload.clone());
                }
                _ => {}
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::parse_ad_stream;

    #[test]
    fn test_snapshot_from_manufacturer_ad() {
        // Scenario: 04 FF 34 12 56
        let tree = parse_ad_stream(&[0x04, 0xFF, 0x34, 0x12, 0x56]);
        let data =
            AdvertisingData::from_structures(&tree, AssignedNumbers::global(), Some(-60), 1234);

        let entry = &data.manufacturer_data[&0x1234];
        assert_eq!(entry.payload, vec![0x56]);
        assert_eq!(entry.company.id, 0x1234);
        assert_eq!(data.rssi, Some(-60));
        assert_eq!(data.timestamp_ms, 1234);
    }

    #[test]
    fn test_complete_name_beats_shortened() {
        let mut packet = vec![0x04, 0x08];
        packet.extend(b"Tag");
        packet.extend([0x07, 0x09]);
        packet.extend(b"Tag#42");
        let tree = parse_ad_stream(&packet);
        let data = AdvertisingData::from_structures(&tree, AssignedNumbers::global(), None, 0);
        assert_eq!(data.local_name.as_deref(), Some("Tag#42"));
    }

    #[test]
    fn test_company_name_resolution() {
        let tree = parse_ad_stream(&[0x04, 0xFF, 0x4C, 0x00, 0x02]);
        let data = AdvertisingData::from_structures(&tree, AssignedNumbers::global(), None, 0);
        assert_eq!(
            data.manufacturer_data[&0x004C].company.name.as_deref(),
            Some("Apple, Inc.")
        );
    }
}
