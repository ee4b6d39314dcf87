//! Interpreter for TLV telemetry beacons (company id 0xFFFF).
//!
//! Payload layout after the company id:
//!
//! ```text
//! [device_info: 1] then either
//!   plaintext:  TLV measurements
//!   encrypted:  [counter: u32 LE][ciphertext][MIC: 4]
//! ```
//!
//! `device_info` bits 0-4 carry the protocol version (currently 1) and
//! bit 5 flags encryption. Encrypted payloads use AES-CCM with a 4-byte
//! MIC and a nonce of MAC ‖ company id ‖ device_info ‖ counter, all
//! little-endian. The counter doubles as the replay guard.

use std::sync::Arc;

use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit, Payload};
use smallvec::SmallVec;
use tracing::debug;

use blesig_core::fields::RawFrame;
use blesig_core::Value;

use crate::data::AdvertisingData;
use crate::ead::Aes128Ccm4;
use crate::error::{AdvError, Result};
use crate::interpreter::{
    AdvertisingInterpreter, InterpreterInfo, InterpreterRegistry, Routing,
};
use crate::interpreters::{Interpretation, SensorReading};
use crate::state::DeviceAdvertisingState;
use crate::types::BdAddr;

/// Prototype/test company identifier used by these beacons.
pub const SENSOR_COMPANY_ID: u16 = 0xFFFF;

const VERSION_MASK: u8 = 0x1F;
const ENCRYPTED_BIT: u8 = 0x20;
const SUPPORTED_VERSION: u8 = 1;
const MIC_LEN: usize = 4;

const INFO: InterpreterInfo = InterpreterInfo {
    name: "sensor-beacon",
    routing: Routing::CompanyId(SENSOR_COMPANY_ID),
};

pub fn register(registry: &mut InterpreterRegistry) {
    registry.register(INFO, Arc::new(|address| Box::new(SensorBeaconInterpreter { address })));
}

pub struct SensorBeaconInterpreter {
    address: BdAddr,
}

impl SensorBeaconInterpreter {
    pub fn new(address: BdAddr) -> Self {
        Self { address }
    }

    fn decrypt(
        &self,
        device_info: u8,
        counter: u32,
        ciphertext_and_mic: &[u8],
        state: &DeviceAdvertisingState,
    ) -> Result<Vec<u8>> {
        let key = state
            .encryption
            .bindkey
            .ok_or(AdvError::EncryptionRequired {
                address: self.address,
            })?;

        let mut nonce: SmallVec<[u8; 13]> = SmallVec::new();
        nonce.extend_from_slice(&self.address.to_le_bytes());
        nonce.extend_from_slice(&SENSOR_COMPANY_ID.to_le_bytes());
        nonce.push(device_info);
        nonce.extend_from_slice(&counter.to_le_bytes());

        Aes128Ccm4::new((&key).into())
            .decrypt(
                GenericArray::from_slice(&nonce),
                Payload {
                    msg: ciphertext_and_mic,
                    aad: &[],
                },
            )
            .map_err(|_| AdvError::DecryptionFailed {
                address: self.address,
                reason: "authentication tag mismatch".to_string(),
            })
    }

    fn parse_measurements(
        &self,
        bytes: &[u8],
        state: &mut DeviceAdvertisingState,
    ) -> Result<Vec<SensorReading>> {
        let mut frame = RawFrame::new(bytes);
        let mut readings = Vec::new();
        let mut packet_id = None;

        while !frame.is_empty() {
            let tag = frame.u8()?;
            match tag {
                0x00 => {
                    let id = u64::from(frame.u8()?);
                    state.check_packet_id(id)?;
                    packet_id = Some(id);
                }
                0x01 => {
                    let battery = frame.u8()?;
                    readings.push(SensorReading {
                        name: "battery",
                        value: Value::UInt(u64::from(battery)),
                    });
                }
                0x02 => {
                    let raw = frame.i16()?;
                    readings.push(SensorReading {
                        name: "temperature",
                        value: Value::Float(f64::from(raw) * 0.01),
                    });
                }
                0x03 => {
                    let raw = frame.u16()?;
                    readings.push(SensorReading {
                        name: "humidity",
                        value: Value::Float(f64::from(raw) * 0.01),
                    });
                }
                0x0C => {
                    let raw = frame.u16()?;
                    readings.push(SensorReading {
                        name: "voltage",
                        value: Value::Float(f64::from(raw) * 0.001),
                    });
                }
                unknown => {
                    // Unknown tags have unknown widths; nothing past this
                    // point can be framed.
                    debug!(
                        address = %self.address,
                        tag = format!("0x{unknown:02X}"),
                        "unknown measurement tag, stopping"
                    );
                    break;
                }
            }
        }

        // The id is committed only once every measurement framed; a
        // truncated packet must not consume it.
        if let Some(id) = packet_id {
            state.record_packet_id(id);
        }
        Ok(readings)
    }
}

impl AdvertisingInterpreter for SensorBeaconInterpreter {
    fn info(&self) -> InterpreterInfo {
        INFO
    }

    fn supports(&self, data: &AdvertisingData) -> bool {
        data.manufacturer_data
            .get(&SENSOR_COMPANY_ID)
            .is_some_and(|m| !m.payload.is_empty())
    }

    fn interpret(
        &self,
        data: &AdvertisingData,
        state: &mut DeviceAdvertisingState,
    ) -> Result<Interpretation> {
        let payload = &data
            .manufacturer_data
            .get(&SENSOR_COMPANY_ID)
            .ok_or_else(|| AdvError::Interpreter("manufacturer data missing".to_string()))?
            .payload;

        let mut frame = RawFrame::new(payload);
        let device_info = frame.u8()?;

        let version = device_info & VERSION_MASK;
        if version != SUPPORTED_VERSION {
            return Err(AdvError::UnsupportedVersion { found: version });
        }

        if device_info & ENCRYPTED_BIT == 0 {
            let readings = self.parse_measurements(frame.rest(), state)?;
            return Ok(Interpretation::SensorBeacon {
                encrypted: false,
                readings,
            });
        }

        let counter = frame.u32()?;
        let ciphertext_and_mic = frame.rest();
        if ciphertext_and_mic.len() < MIC_LEN {
            return Err(AdvError::Truncated {
                needed: MIC_LEN,
                available: ciphertext_and_mic.len(),
            });
        }

        // Replay gate sits in front of the (comparatively costly) decrypt,
        // and the counter only advances once the MIC checks out.
        state.check_counter(counter)?;
        let plaintext = self.decrypt(device_info, counter, ciphertext_and_mic, state)?;
        state.accept_counter(counter);

        let readings = self.parse_measurements(&plaintext, state)?;
        Ok(Interpretation::SensorBeacon {
            encrypted: true,
            readings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ManufacturerData;
    use blesig_core::CompanyInfo;

    fn addr() -> BdAddr {
        BdAddr::new([0xA4, 0xC1, 0x38, 0xAA, 0xBB, 0xCC])
    }

    fn beacon(payload: Vec<u8>) -> AdvertisingData {
        let mut data = AdvertisingData::default();
        data.manufacturer_data.insert(
            SENSOR_COMPANY_ID,
            ManufacturerData {
                company: CompanyInfo {
                    id: SENSOR_COMPANY_ID,
                    name: None,
                },
                payload,
            },
        );
        data
    }

    fn encrypt_measurements(
        key: &[u8; 16],
        address: BdAddr,
        device_info: u8,
        counter: u32,
        plaintext: &[u8],
    ) -> Vec<u8> {
        let mut nonce: SmallVec<[u8; 13]> = SmallVec::new();
        nonce.extend_from_slice(&address.to_le_bytes());
        nonce.extend_from_slice(&SENSOR_COMPANY_ID.to_le_bytes());
        nonce.push(device_info);
        nonce.extend_from_slice(&counter.to_le_bytes());

        let sealed = Aes128Ccm4::new(key.into())
            .encrypt(
                GenericArray::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &[],
                },
            )
            .unwrap();

        let mut payload = vec![device_info];
        payload.extend_from_slice(&counter.to_le_bytes());
        payload.extend_from_slice(&sealed);
        payload
    }

    #[test]
    fn test_plaintext_measurements() {
        let interpreter = SensorBeaconInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());

        // version 1, plaintext; temp 23.45 C, humidity 60.00 %, battery 87 %
        let data = beacon(vec![
            0x01, // device info
            0x02, 0x29, 0x09, // temperature 0x0929 = 2345
            0x03, 0x70, 0x17, // humidity 0x1770 = 6000
            0x01, 0x57, // battery 87
        ]);

        let result = interpreter.interpret(&data, &mut state).unwrap();
        let Interpretation::SensorBeacon {
            encrypted,
            readings,
        } = result
        else {
            panic!("wrong interpretation kind");
        };
        assert!(!encrypted);
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].name, "temperature");
        assert_eq!(readings[0].value, Value::Float(23.45));
        assert_eq!(readings[1].value, Value::Float(60.0));
        assert_eq!(readings[2].value, Value::UInt(87));
    }

    #[test]
    fn test_unsupported_version() {
        let interpreter = SensorBeaconInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());

        let data = beacon(vec![0x02, 0x01, 0x64]);
        assert!(matches!(
            interpreter.interpret(&data, &mut state),
            Err(AdvError::UnsupportedVersion { found: 2 })
        ));
    }

    #[test]
    fn test_duplicate_packet_id_rejected() {
        let interpreter = SensorBeaconInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());

        let data = beacon(vec![0x01, 0x00, 0x2A, 0x01, 0x64]);
        assert!(interpreter.interpret(&data, &mut state).is_ok());
        assert!(matches!(
            interpreter.interpret(&data, &mut state),
            Err(AdvError::DuplicatePacket { packet_id: 0x2A, .. })
        ));
    }

    #[test]
    fn test_encrypted_roundtrip_and_replay() {
        let key = [0x42u8; 16];
        let device_info = 0x21; // version 1, encrypted
        let plaintext = [0x02, 0x29, 0x09]; // temperature 23.45

        let interpreter = SensorBeaconInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());
        state.encryption.bindkey = Some(key);

        let data = beacon(encrypt_measurements(&key, addr(), device_info, 7, &plaintext));
        let result = interpreter.interpret(&data, &mut state).unwrap();
        let Interpretation::SensorBeacon {
            encrypted,
            readings,
        } = result
        else {
            panic!("wrong interpretation kind");
        };
        assert!(encrypted);
        assert_eq!(readings[0].value, Value::Float(23.45));
        assert_eq!(state.encryption.counter, Some(7));

        // Same counter again is a replay.
        assert!(matches!(
            interpreter.interpret(&data, &mut state),
            Err(AdvError::ReplayDetected {
                received: 7,
                last: 7,
                ..
            })
        ));

        // The next counter value is accepted.
        let next = beacon(encrypt_measurements(&key, addr(), device_info, 8, &plaintext));
        assert!(interpreter.interpret(&next, &mut state).is_ok());
        assert_eq!(state.encryption.counter, Some(8));
    }

    #[test]
    fn test_counter_zero_beacon_not_replayable() {
        let key = [0x42u8; 16];
        let interpreter = SensorBeaconInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());
        state.encryption.bindkey = Some(key);

        let data = beacon(encrypt_measurements(&key, addr(), 0x21, 0, &[0x01, 0x64]));
        assert!(interpreter.interpret(&data, &mut state).is_ok());
        assert_eq!(state.encryption.counter, Some(0));

        // The identical capture a second time is a replay, counter 0 or not.
        assert!(matches!(
            interpreter.interpret(&data, &mut state),
            Err(AdvError::ReplayDetected {
                received: 0,
                last: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_truncated_packet_does_not_consume_id() {
        let interpreter = SensorBeaconInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());

        // Packet id 0x2A followed by a temperature missing its second byte.
        let bad = beacon(vec![0x01, 0x00, 0x2A, 0x02, 0x29]);
        assert!(interpreter.interpret(&bad, &mut state).is_err());
        assert!(state.last_packet_id().is_none());

        // The well-formed packet carrying the same id still goes through.
        let good = beacon(vec![0x01, 0x00, 0x2A, 0x01, 0x64]);
        assert!(interpreter.interpret(&good, &mut state).is_ok());
        assert_eq!(state.last_packet_id(), Some(0x2A));
    }

    #[test]
    fn test_missing_key() {
        let interpreter = SensorBeaconInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());

        let data = beacon(encrypt_measurements(
            &[0x42; 16],
            addr(),
            0x21,
            1,
            &[0x01, 0x64],
        ));
        assert!(matches!(
            interpreter.interpret(&data, &mut state),
            Err(AdvError::EncryptionRequired { .. })
        ));
        // Failed lookup must not advance the counter.
        assert!(state.encryption.counter.is_none());
    }

    #[test]
    fn test_garbled_ciphertext_leaves_counter() {
        let key = [0x42u8; 16];
        let interpreter = SensorBeaconInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());
        state.encryption.bindkey = Some(key);

        let mut payload = encrypt_measurements(&key, addr(), 0x21, 3, &[0x01, 0x64]);
        *payload.last_mut().unwrap() ^= 0xFF;
        let data = beacon(payload);

        assert!(matches!(
            interpreter.interpret(&data, &mut state),
            Err(AdvError::DecryptionFailed { .. })
        ));
        assert!(state.encryption.counter.is_none());

        // The untampered packet with the same counter still goes through.
        let good = beacon(encrypt_measurements(&key, addr(), 0x21, 3, &[0x01, 0x64]));
        assert!(interpreter.interpret(&good, &mut state).is_ok());
        assert_eq!(state.encryption.counter, Some(3));
    }
}
