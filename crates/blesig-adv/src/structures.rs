//! AD structure extraction and categorization
//!
//! An advertisement payload is a stream of length-prefixed AD structures:
//! `[len][ad_type][len-1 payload bytes]`. The walker extracts every structure
//! it can; a structure whose declared length overruns the remaining buffer is
//! dropped with a debug log, never fatal, so one malformed vendor structure
//! does not block the rest of the packet.
//!
//! Numeric payloads are little-endian; 128-bit UUIDs arrive byte-reversed on
//! the wire.

use blesig_core::fields::RawFrame;
use blesig_core::types::expand_sig_uuid;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AddressType, BdAddr};

// ----------------------------------------------------------------------------
// AD Type Constants
// ----------------------------------------------------------------------------

pub const AD_FLAGS: u8 = 0x01;
pub const AD_INCOMPLETE_UUID16: u8 = 0x02;
pub const AD_COMPLETE_UUID16: u8 = 0x03;
pub const AD_INCOMPLETE_UUID32: u8 = 0x04;
pub const AD_COMPLETE_UUID32: u8 = 0x05;
pub const AD_INCOMPLETE_UUID128: u8 = 0x06;
pub const AD_COMPLETE_UUID128: u8 = 0x07;
pub const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
pub const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const AD_TX_POWER: u8 = 0x0A;
pub const AD_OOB_PAIRING_HASH: u8 = 0x0E;
pub const AD_OOB_PAIRING_RANDOMIZER: u8 = 0x0F;
pub const AD_SECURITY_MANAGER_TK: u8 = 0x10;
pub const AD_SECURITY_MANAGER_OOB_FLAGS: u8 = 0x11;
pub const AD_SERVICE_DATA_UUID16: u8 = 0x16;
pub const AD_PUBLIC_TARGET_ADDRESS: u8 = 0x17;
pub const AD_RANDOM_TARGET_ADDRESS: u8 = 0x18;
pub const AD_APPEARANCE: u8 = 0x19;
pub const AD_ADVERTISING_INTERVAL: u8 = 0x1A;
pub const AD_LE_DEVICE_ADDRESS: u8 = 0x1B;
pub const AD_LE_ROLE: u8 = 0x1C;
pub const AD_SERVICE_DATA_UUID32: u8 = 0x20;
pub const AD_SERVICE_DATA_UUID128: u8 = 0x21;
pub const AD_LESC_CONFIRMATION: u8 = 0x22;
pub const AD_LESC_RANDOM: u8 = 0x23;
pub const AD_URI: u8 = 0x24;
pub const AD_INDOOR_POSITIONING: u8 = 0x25;
pub const AD_CHANNEL_MAP_UPDATE: u8 = 0x28;
pub const AD_PB_ADV: u8 = 0x29;
pub const AD_MESH_MESSAGE: u8 = 0x2A;
pub const AD_MESH_BEACON: u8 = 0x2B;
pub const AD_BIG_INFO: u8 = 0x2C;
pub const AD_BROADCAST_CODE: u8 = 0x2D;
pub const AD_BROADCAST_NAME: u8 = 0x30;
pub const AD_ENCRYPTED_DATA: u8 = 0x31;
pub const AD_3D_INFORMATION: u8 = 0x3D;
pub const AD_MANUFACTURER_DATA: u8 = 0xFF;

// ----------------------------------------------------------------------------
// Typed Structures
// ----------------------------------------------------------------------------

/// One parsed AD structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdStructure {
    Flags(u8),
    /// Service UUID list, expanded to full 128-bit form
    ServiceUuids {
        uuids: Vec<Uuid>,
        complete: bool,
    },
    LocalName {
        name: String,
        complete: bool,
    },
    TxPower(i8),
    Appearance(u16),
    /// Advertising interval in 0.625 ms units
    AdvertisingInterval(u16),
    ServiceData {
        uuid: Uuid,
        data: Vec<u8>,
    },
    ManufacturerData {
        company_id: u16,
        payload: Vec<u8>,
    },
    PublicTargetAddress(Vec<BdAddr>),
    RandomTargetAddress(Vec<BdAddr>),
    LeDeviceAddress {
        address: BdAddr,
        address_type: AddressType,
    },
    LeRole(u8),
    Uri(String),
    IndoorPositioning(IndoorPositioning),
    ChannelMapUpdate {
        channel_map: [u8; 5],
        instant: u16,
    },
    ThreeDInformation {
        flags: u8,
        path_loss_threshold: u8,
    },
    MeshMessage(Vec<u8>),
    MeshBeacon(Vec<u8>),
    PbAdv(Vec<u8>),
    BigInfo(Vec<u8>),
    BroadcastCode(Vec<u8>),
    BroadcastName(String),
    /// Encrypted Advertising Data payload, opaque until decrypted
    EncryptedData(Vec<u8>),
    /// Raw OOB security material (hash, randomizer, TK, confirmation, ...)
    SecurityPayload {
        ad_type: u8,
        data: Vec<u8>,
    },
    Unknown {
        ad_type: u8,
        data: Vec<u8>,
    },
}

/// Indoor Positioning AD structure: a presence mask selects which optional
/// fields follow, in fixed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndoorPositioning {
    pub flags: u8,
    /// Local north/east coordinates in decimeters
    pub coordinates: Option<(i16, i16)>,
    pub tx_power: Option<i8>,
    pub altitude: Option<u16>,
    pub floor_number: Option<u8>,
    pub uncertainty: Option<u8>,
}

// ----------------------------------------------------------------------------
// Categories
// ----------------------------------------------------------------------------

/// Fixed grouping of AD types for downstream consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdCategory {
    CoreIdentity,
    DeviceProperties,
    DirectedAdvertising,
    OobSecurity,
    LocationSensing,
    MeshBroadcast,
    Security,
}

impl AdStructure {
    pub fn category(&self) -> AdCategory {
        match self {
            AdStructure::Flags(_)
            | AdStructure::ServiceUuids { .. }
            | AdStructure::LocalName { .. }
            | AdStructure::Appearance(_)
            | AdStructure::ServiceData { .. }
            | AdStructure::ManufacturerData { .. } => AdCategory::CoreIdentity,

            AdStructure::TxPower(_)
            | AdStructure::AdvertisingInterval(_)
            | AdStructure::LeRole(_)
            | AdStructure::Uri(_)
            | AdStructure::Unknown { .. } => AdCategory::DeviceProperties,

            AdStructure::PublicTargetAddress(_)
            | AdStructure::RandomTargetAddress(_)
            | AdStructure::LeDeviceAddress { .. } => AdCategory::DirectedAdvertising,

            AdStructure::SecurityPayload { .. } => AdCategory::OobSecurity,

            AdStructure::IndoorPositioning(_)
            | AdStructure::ChannelMapUpdate { .. }
            | AdStructure::ThreeDInformation { .. } => AdCategory::LocationSensing,

            AdStructure::MeshMessage(_)
            | AdStructure::MeshBeacon(_)
            | AdStructure::PbAdv(_)
            | AdStructure::BigInfo(_)
            | AdStructure::BroadcastCode(_)
            | AdStructure::BroadcastName(_) => AdCategory::MeshBroadcast,

            AdStructure::EncryptedData(_) => AdCategory::Security,
        }
    }
}

/// Every AD structure of one advertisement, grouped into the seven fixed
/// categories (wire order preserved within each category).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvertisingDataStructures {
    pub core_identity: Vec<AdStructure>,
    pub device_properties: Vec<AdStructure>,
    pub directed_advertising: Vec<AdStructure>,
    pub oob_security: Vec<AdStructure>,
    pub location_sensing: Vec<AdStructure>,
    pub mesh_broadcast: Vec<AdStructure>,
    pub security: Vec<AdStructure>,
}

impl AdvertisingDataStructures {
    pub fn push(&mut self, structure: AdStructure) {
        let bucket = match structure.category() {
            AdCategory::CoreIdentity => &mut self.core_identity,
            AdCategory::DeviceProperties => &mut self.device_properties,
            AdCategory::DirectedAdvertising => &mut self.directed_advertising,
            AdCategory::OobSecurity => &mut self.oob_security,
            AdCategory::LocationSensing => &mut self.location_sensing,
            AdCategory::MeshBroadcast => &mut self.mesh_broadcast,
            AdCategory::Security => &mut self.security,
        };
        bucket.push(structure);
    }

    /// All structures in category order
    pub fn iter(&self) -> impl Iterator<Item = &AdStructure> {
        self.core_identity
            .iter()
            .chain(&self.device_properties)
            .chain(&self.directed_advertising)
            .chain(&self.oob_security)
            .chain(&self.location_sensing)
            .chain(&self.mesh_broadcast)
            .chain(&self.security)
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

// ----------------------------------------------------------------------------
// Walker
// ----------------------------------------------------------------------------

/// Walk the length-prefixed AD stream, returning every structure that parses.
pub fn parse_ad_stream(payload: &[u8]) -> AdvertisingDataStructures {
    let mut out = AdvertisingDataStructures::default();
    let mut offset = 0usize;

    while offset < payload.len() {
        let len = payload[offset] as usize;
        if len == 0 {
            // Early-terminator byte: the rest of the payload is padding.
            break;
        }
        let body_start = offset + 1;
        let body_end = body_start + len;
        if body_end > payload.len() {
            tracing::debug!(
                declared = len,
                remaining = payload.len() - body_start,
                payload = hex::encode(&payload[offset..]),
                "dropping AD structure overrunning the buffer"
            );
            break;
        }
        let ad_type = payload[body_start];
        let data = &payload[body_start + 1..body_end];
        out.push(parse_ad_structure(ad_type, data));
        offset = body_end;
    }
    out
}

/// Parse one AD structure body into its typed form.
///
/// Malformed bodies degrade to `Unknown` rather than failing: extraction of
/// the other structures in the packet must not be blocked.
pub fn parse_ad_structure(ad_type: u8, data: &[u8]) -> AdStructure {
    match ad_type {
        AD_FLAGS if !data.is_empty() => AdStructure::Flags(data[0]),

        AD_INCOMPLETE_UUID16 | AD_COMPLETE_UUID16 => AdStructure::ServiceUuids {
            uuids: data
                .chunks_exact(2)
                .map(|c| expand_sig_uuid(u16::from_le_bytes([c[0], c[1]]) as u32))
                .collect(),
            complete: ad_type == AD_COMPLETE_UUID16,
        },
        AD_INCOMPLETE_UUID32 | AD_COMPLETE_UUID32 => AdStructure::ServiceUuids {
            uuids: data
                .chunks_exact(4)
                .map(|c| expand_sig_uuid(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect(),
            complete: ad_type == AD_COMPLETE_UUID32,
        },
        AD_INCOMPLETE_UUID128 | AD_COMPLETE_UUID128 => AdStructure::ServiceUuids {
            uuids: data.chunks_exact(16).map(uuid_from_wire).collect(),
            complete: ad_type == AD_COMPLETE_UUID128,
        },

        AD_SHORTENED_LOCAL_NAME | AD_COMPLETE_LOCAL_NAME => {
            match core::str::from_utf8(data) {
                Ok(name) => AdStructure::LocalName {
                    name: name.to_string(),
                    complete: ad_type == AD_COMPLETE_LOCAL_NAME,
                },
                Err(_) => AdStructure::Unknown {
                    ad_type,
                    data: data.to_vec(),
                },
            }
        }

        AD_TX_POWER if data.len() == 1 => AdStructure::TxPower(data[0] as i8),
        AD_APPEARANCE if data.len() == 2 => {
            AdStructure::Appearance(u16::from_le_bytes([data[0], data[1]]))
        }
        AD_ADVERTISING_INTERVAL if data.len() == 2 => {
            AdStructure::AdvertisingInterval(u16::from_le_bytes([data[0], data[1]]))
        }

        AD_SERVICE_DATA_UUID16 if data.len() >= 2 => AdStructure::ServiceData {
            uuid: expand_sig_uuid(u16::from_le_bytes([data[0], data[1]]) as u32),
            data: data[2..].to_vec(),
        },
        AD_SERVICE_DATA_UUID32 if data.len() >= 4 => AdStructure::ServiceData {
            uuid: expand_sig_uuid(u32::from_le_bytes([data[0], data[1], data[2], data[3]])),
            data: data[4..].to_vec(),
        },
        AD_SERVICE_DATA_UUID128 if data.len() >= 16 => AdStructure::ServiceData {
            uuid: uuid_from_wire(&data[..16]),
            data: data[16..].to_vec(),
        },

        AD_MANUFACTURER_DATA if data.len() >= 2 => AdStructure::ManufacturerData {
            company_id: u16::from_le_bytes([data[0], data[1]]),
            payload: data[2..].to_vec(),
        },

        AD_PUBLIC_TARGET_ADDRESS => {
            AdStructure::PublicTargetAddress(parse_address_list(data))
        }
        AD_RANDOM_TARGET_ADDRESS => {
            AdStructure::RandomTargetAddress(parse_address_list(data))
        }
        AD_LE_DEVICE_ADDRESS if data.len() == 7 => {
            let mut addr = [0u8; 6];
            addr.copy_from_slice(&data[..6]);
            AdStructure::LeDeviceAddress {
                address: BdAddr::from_le_bytes(addr),
                address_type: AddressType::from_bit(data[6] & 0x01 != 0),
            }
        }
        AD_LE_ROLE if data.len() == 1 => AdStructure::LeRole(data[0]),

        AD_URI => match core::str::from_utf8(data) {
            Ok(uri) => AdStructure::Uri(uri.to_string()),
            Err(_) => AdStructure::Unknown {
                ad_type,
                data: data.to_vec(),
            },
        },

        AD_INDOOR_POSITIONING if !data.is_empty() => {
            match parse_indoor_positioning(data) {
                Some(ip) => AdStructure::IndoorPositioning(ip),
                None => AdStructure::Unknown {
                    ad_type,
                    data: data.to_vec(),
                },
            }
        }
        AD_CHANNEL_MAP_UPDATE if data.len() == 7 => AdStructure::ChannelMapUpdate {
            channel_map: [data[0], data[1], data[2], data[3], data[4]],
            instant: u16::from_le_bytes([data[5], data[6]]),
        },
        AD_3D_INFORMATION if data.len() == 2 => AdStructure::ThreeDInformation {
            flags: data[0],
            path_loss_threshold: data[1],
        },

        AD_MESH_MESSAGE => AdStructure::MeshMessage(data.to_vec()),
        AD_MESH_BEACON => AdStructure::MeshBeacon(data.to_vec()),
        AD_PB_ADV => AdStructure::PbAdv(data.to_vec()),
        AD_BIG_INFO => AdStructure::BigInfo(data.to_vec()),
        AD_BROADCAST_CODE => AdStructure::BroadcastCode(data.to_vec()),
        AD_BROADCAST_NAME => match core::str::from_utf8(data) {
            Ok(name) => AdStructure::BroadcastName(name.to_string()),
            Err(_) => AdStructure::Unknown {
                ad_type,
                data: data.to_vec(),
            },
        },

        AD_ENCRYPTED_DATA => AdStructure::EncryptedData(data.to_vec()),

        AD_OOB_PAIRING_HASH
        | AD_OOB_PAIRING_RANDOMIZER
        | AD_SECURITY_MANAGER_TK
        | AD_SECURITY_MANAGER_OOB_FLAGS
        | AD_LESC_CONFIRMATION
        | AD_LESC_RANDOM => AdStructure::SecurityPayload {
            ad_type,
            data: data.to_vec(),
        },

        _ => AdStructure::Unknown {
            ad_type,
            data: data.to_vec(),
        },
    }
}

/// 128-bit UUIDs are byte-reversed on the wire.
fn uuid_from_wire(wire: &[u8]) -> Uuid {
    let mut bytes = [0u8; 16];
    for (i, b) in wire.iter().enumerate() {
        bytes[15 - i] = *b;
    }
    Uuid::from_bytes(bytes)
}

fn parse_address_list(data: &[u8]) -> Vec<BdAddr> {
    data.chunks_exact(6)
        .map(|c| {
            let mut addr = [0u8; 6];
            addr.copy_from_slice(c);
            BdAddr::from_le_bytes(addr)
        })
        .collect()
}

/// Presence-mask-driven optional fields in fixed order, the same rule the
/// extended PDU header follows.
fn parse_indoor_positioning(data: &[u8]) -> Option<IndoorPositioning> {
    let mut frame = RawFrame::new(data);
    let flags = frame.u8().ok()?;
    let mut ip = IndoorPositioning {
        flags,
        ..IndoorPositioning::default()
    };
    if flags & 0x01 != 0 {
        ip.coordinates = Some((frame.i16().ok()?, frame.i16().ok()?));
    }
    if flags & 0x04 != 0 {
        ip.tx_power = Some(frame.i8().ok()?);
    }
    if flags & 0x08 != 0 {
        ip.altitude = Some(frame.u16().ok()?);
    }
    if flags & 0x10 != 0 {
        ip.floor_number = Some(frame.u8().ok()?);
    }
    if flags & 0x20 != 0 {
        ip.uncertainty = Some(frame.u8().ok()?);
    }
    Some(ip)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
