//! Advertising PDU parsing
//!
//! Parses one raw advertisement — legacy or extended (5.0+) — into its header
//! fields and the categorized AD-structure tree. Extended headers carry a
//! presence bit-mask; the flagged sub-fields are decoded in the fixed order
//! the air interface defines: AdvA, TargetA, CTEInfo, ADI, AuxPtr, SyncInfo,
//! TxPower, ACAD.

use serde::{Deserialize, Serialize};

use crate::error::{AdvError, Result};
use crate::structures::{parse_ad_stream, AdvertisingDataStructures};
use crate::types::{AddressType, BdAddr};

// ----------------------------------------------------------------------------
// PDU Types
// ----------------------------------------------------------------------------

/// Advertising channel PDU types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PduType {
    AdvInd = 0x0,
    AdvDirectInd = 0x1,
    AdvNonconnInd = 0x2,
    ScanReq = 0x3,
    ScanRsp = 0x4,
    ConnectInd = 0x5,
    AdvScanInd = 0x6,
    AdvExtInd = 0x7,
}

impl PduType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(PduType::AdvInd),
            0x1 => Ok(PduType::AdvDirectInd),
            0x2 => Ok(PduType::AdvNonconnInd),
            0x3 => Ok(PduType::ScanReq),
            0x4 => Ok(PduType::ScanRsp),
            0x5 => Ok(PduType::ConnectInd),
            0x6 => Ok(PduType::AdvScanInd),
            0x7 => Ok(PduType::AdvExtInd),
            other => Err(AdvError::UnknownPduType(other)),
        }
    }

    /// Legacy PDU types carrying a TargetA after AdvA
    pub fn is_directed(self) -> bool {
        matches!(self, PduType::AdvDirectInd)
    }
}

// ----------------------------------------------------------------------------
// Extended Header
// ----------------------------------------------------------------------------

/// ADI sub-field: advertising data id plus set id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adi {
    pub data_id: u16,
    pub set_id: u8,
}

/// AuxPtr sub-field pointing at the auxiliary packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxPtr {
    pub channel_index: u8,
    pub clock_accuracy: u8,
    pub offset_units_300us: bool,
    pub aux_offset: u16,
    pub aux_phy: u8,
}

/// Extended header sub-fields, present only where the mask flags them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedHeader {
    pub adv_mode: u8,
    pub advertiser: Option<BdAddr>,
    pub target: Option<BdAddr>,
    pub cte_info: Option<u8>,
    pub adi: Option<Adi>,
    pub aux_ptr: Option<AuxPtr>,
    pub sync_info: Option<[u8; 18]>,
    pub tx_power: Option<i8>,
    pub acad: Vec<u8>,
}

// ----------------------------------------------------------------------------
// Parsed PDU
// ----------------------------------------------------------------------------

/// One parsed advertisement PDU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertisingPdu {
    pub pdu_type: PduType,
    pub tx_address_type: AddressType,
    pub rx_address_type: AddressType,
    pub advertiser: Option<BdAddr>,
    pub target: Option<BdAddr>,
    pub extended: Option<ExtendedHeader>,
    pub structures: AdvertisingDataStructures,
}

impl AdvertisingPdu {
    /// Parse one raw advertisement: 2-byte header, then the type-specific
    /// payload.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(AdvError::Truncated {
                needed: 2,
                available: bytes.len(),
            });
        }
        let header = bytes[0];
        let pdu_type = PduType::from_u8(header & 0x0F)?;
        let tx_address_type = AddressType::from_bit(header & 0x40 != 0);
        let rx_address_type = AddressType::from_bit(header & 0x80 != 0);

        let declared_len = bytes[1] as usize;
        let payload = &bytes[2..];
        if payload.len() < declared_len {
            return Err(AdvError::Truncated {
                needed: declared_len,
                available: payload.len(),
            });
        }
        let payload = &payload[..declared_len];

        if pdu_type == PduType::AdvExtInd {
            return Self::parse_extended(pdu_type, tx_address_type, rx_address_type, payload);
        }
        Self::parse_legacy(pdu_type, tx_address_type, rx_address_type, payload)
    }

    fn parse_legacy(
        pdu_type: PduType,
        tx_address_type: AddressType,
        rx_address_type: AddressType,
        payload: &[u8],
    ) -> Result<Self> {
        let mut offset = 0usize;
        let advertiser = Some(require_address(payload, &mut offset)?);
        let target = if pdu_type.is_directed() {
            Some(require_address(payload, &mut offset)?)
        } else {
            None
        };
        let structures = parse_ad_stream(&payload[offset..]);
        Ok(Self {
            pdu_type,
            tx_address_type,
            rx_address_type,
            advertiser,
            target,
            extended: None,
            structures,
        })
    }

    /// Extended PDU: `[ext_header_len:6 | adv_mode:2][mask][flagged fields][AD data]`
    fn parse_extended(
        pdu_type: PduType,
        tx_address_type: AddressType,
        rx_address_type: AddressType,
        payload: &[u8],
    ) -> Result<Self> {
        if payload.is_empty() {
            return Err(AdvError::Truncated {
                needed: 1,
                available: 0,
            });
        }
        let ext_len = (payload[0] & 0x3F) as usize;
        let adv_mode = payload[0] >> 6;
        if payload.len() < 1 + ext_len {
            return Err(AdvError::Truncated {
                needed: 1 + ext_len,
                available: payload.len(),
            });
        }
        let ext = &payload[1..1 + ext_len];
        let ad_payload = &payload[1 + ext_len..];

        let mut header = ExtendedHeader {
            adv_mode,
            ..ExtendedHeader::default()
        };

        if ext_len > 0 {
            let mask = ext[0];
            let mut offset = 1usize;

            // Fixed sub-field order; each is present only when flagged.
            if mask & 0x01 != 0 {
                header.advertiser = Some(require_address(ext, &mut offset)?);
            }
            if mask & 0x02 != 0 {
                header.target = Some(require_address(ext, &mut offset)?);
            }
            if mask & 0x04 != 0 {
                header.cte_info = Some(take(ext, &mut offset, 1)?[0]);
            }
            if mask & 0x08 != 0 {
                let b = take(ext, &mut offset, 2)?;
                let raw = u16::from_le_bytes([b[0], b[1]]);
                header.adi = Some(Adi {
                    data_id: raw & 0x0FFF,
                    set_id: (raw >> 12) as u8,
                });
            }
            if mask & 0x10 != 0 {
                let b = take(ext, &mut offset, 3)?;
                let raw = u32::from_le_bytes([b[0], b[1], b[2], 0]);
                header.aux_ptr = Some(AuxPtr {
                    channel_index: (raw & 0x3F) as u8,
                    clock_accuracy: ((raw >> 6) & 0x01) as u8,
                    offset_units_300us: raw & 0x80 != 0,
                    aux_offset: ((raw >> 8) & 0x1FFF) as u16,
                    aux_phy: ((raw >> 21) & 0x07) as u8,
                });
            }
            if mask & 0x20 != 0 {
                let b = take(ext, &mut offset, 18)?;
                let mut sync_info = [0u8; 18];
                sync_info.copy_from_slice(b);
                header.sync_info = Some(sync_info);
            }
            if mask & 0x40 != 0 {
                header.tx_power = Some(take(ext, &mut offset, 1)?[0] as i8);
            }
            // Whatever remains of the extended header is ACAD.
            header.acad = ext[offset..].to_vec();
        }

        let advertiser = header.advertiser;
        let target = header.target;
        Ok(Self {
            pdu_type,
            tx_address_type,
            rx_address_type,
            advertiser,
            target,
            extended: Some(header),
            structures: parse_ad_stream(ad_payload),
        })
    }
}

fn take<'a>(buf: &'a [u8], offset: &mut usize, n: usize) -> Result<&'a [u8]> {
    if buf.len() < *offset + n {
        return Err(AdvError::Truncated {
            needed: *offset + n,
            available: buf.len(),
        });
    }
    let slice = &buf[*offset..*offset + n];
    *offset += n;
    Ok(slice)
}

fn require_address(buf: &[u8], offset: &mut usize) -> Result<BdAddr> {
    let b = take(buf, offset, 6)?;
    let mut addr = [0u8; 6];
    addr.copy_from_slice(b);
    Ok(BdAddr::from_le_bytes(addr))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::AdStructure;

    fn legacy_adv_ind(ad_payload: &[u8]) -> Vec<u8> {
        let mut pdu = vec![0x40]; // ADV_IND, TxAdd = random
        let advertiser = [0x01, 0x02, 0x03, 0x04, 0x05, 0xC0];
        pdu.push((6 + ad_payload.len()) as u8);
        pdu.extend(advertiser);
        pdu.extend(ad_payload);
        pdu
    }

    #[test]
    fn test_legacy_adv_ind() {
        let pdu = AdvertisingPdu::parse(&legacy_adv_ind(&[0x02, 0x01, 0x06])).unwrap();
        assert_eq!(pdu.pdu_type, PduType::AdvInd);
        assert_eq!(pdu.tx_address_type, AddressType::Random);
        assert_eq!(pdu.advertiser.unwrap().to_string(), "C0:05:04:03:02:01");
        assert_eq!(pdu.structures.core_identity[0], AdStructure::Flags(0x06));
        assert!(pdu.target.is_none());
    }

    #[test]
    fn test_directed_pdu_has_target() {
        let mut pdu = vec![0x01, 12]; // ADV_DIRECT_IND
        pdu.extend([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        pdu.extend([0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F]);
        let parsed = AdvertisingPdu::parse(&pdu).unwrap();
        assert_eq!(parsed.target.unwrap().to_string(), "0F:0E:0D:0C:0B:0A");
    }

    #[test]
    fn test_truncated_pdu() {
        let err = AdvertisingPdu::parse(&[0x00, 0x10, 0x01]).unwrap_err();
        assert_eq!(
            err,
            AdvError::Truncated {
                needed: 16,
                available: 1
            }
        );
    }

    #[test]
    fn test_unknown_pdu_type() {
        assert_eq!(
            AdvertisingPdu::parse(&[0x09, 0x00]).unwrap_err(),
            AdvError::UnknownPduType(0x9)
        );
    }

    #[test]
    fn test_extended_header_mask_fields() {
        // ext header: mask(AdvA | TxPower), AdvA, tx power, one ACAD byte
        let ext: Vec<u8> = {
            let mut v = vec![0x41];
            v.extend([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
            v.push(0xF9); // -7 dBm
            v.push(0xAB);
            v
        };
        let mut payload = vec![((ext.len() as u8) & 0x3F) | 0x40]; // adv_mode 1
        payload.extend(&ext);
        payload.extend([0x02, 0x01, 0x06]); // AD data after the header

        let mut pdu = vec![0x07, payload.len() as u8];
        pdu.extend(&payload);

        let parsed = AdvertisingPdu::parse(&pdu).unwrap();
        let header = parsed.extended.unwrap();
        assert_eq!(header.adv_mode, 1);
        assert_eq!(
            header.advertiser.unwrap().to_string(),
            "66:55:44:33:22:11"
        );
        assert_eq!(header.tx_power, Some(-7));
        assert_eq!(header.acad, vec![0xAB]);
        assert!(header.adi.is_none());
        assert_eq!(
            parsed.structures.core_identity[0],
            AdStructure::Flags(0x06)
        );
    }

    #[test]
    fn test_extended_adi_and_aux_ptr() {
        // mask = ADI | AuxPtr
        let mut ext = vec![0x18];
        ext.extend(0x5123u16.to_le_bytes()); // ADI: DID 0x123, SID 5
        ext.extend([0xA5, 0x83, 0x00]); // AuxPtr raw, offset-units bit set
        let mut payload = vec![(ext.len() as u8) & 0x3F];
        payload.extend(&ext);

        let mut pdu = vec![0x07, payload.len() as u8];
        pdu.extend(&payload);

        let parsed = AdvertisingPdu::parse(&pdu).unwrap();
        let header = parsed.extended.unwrap();
        let adi = header.adi.unwrap();
        assert_eq!(adi.data_id, 0x123);
        assert_eq!(adi.set_id, 5);
        let aux = header.aux_ptr.unwrap();
        assert_eq!(aux.channel_index, 0x25);
        assert!(aux.offset_units_300us);
        assert_eq!(aux.aux_offset, 0x83);
    }
}
