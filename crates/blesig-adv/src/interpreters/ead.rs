//! Interpreter for Encrypted Advertising Data (AD type 0x31).
//!
//! EAD payloads are self-describing: any advertiser may carry them, so
//! this interpreter routes as a fallback and matches on the presence of
//! encrypted blobs in the snapshot. Decrypted plaintext is itself a
//! stream of AD structures and is re-parsed with the normal walker.

use std::sync::Arc;

use crate::data::AdvertisingData;
use crate::ead::{self, EadPayload};
use crate::error::{AdvError, Result};
use crate::interpreter::{
    AdvertisingInterpreter, InterpreterInfo, InterpreterRegistry, Routing,
};
use crate::interpreters::Interpretation;
use crate::state::DeviceAdvertisingState;
use crate::types::BdAddr;

const INFO: InterpreterInfo = InterpreterInfo {
    name: "encrypted-advertising-data",
    routing: Routing::Fallback,
};

pub fn register(registry: &mut InterpreterRegistry) {
    registry.register(INFO, Arc::new(|address| Box::new(EadInterpreter { address })));
}

pub struct EadInterpreter {
    address: BdAddr,
}

impl EadInterpreter {
    pub fn new(address: BdAddr) -> Self {
        Self { address }
    }
}

impl AdvertisingInterpreter for EadInterpreter {
    fn info(&self) -> InterpreterInfo {
        INFO
    }

    fn supports(&self, data: &AdvertisingData) -> bool {
        !data.encrypted_data.is_empty()
    }

    fn interpret(
        &self,
        data: &AdvertisingData,
        state: &mut DeviceAdvertisingState,
    ) -> Result<Interpretation> {
        let material = state
            .encryption
            .ead
            .clone()
            .ok_or(AdvError::EncryptionRequired {
                address: self.address,
            })?;

        let mut structures = Vec::new();
        let mut accepted: Vec<u64> = Vec::new();
        for blob in &data.encrypted_data {
            let payload = EadPayload::parse(blob)?;
            let packet_id = payload.packet_id();
            // The randomizer changes with every fresh encryption, so a
            // repeat means a retransmitted or replayed packet.
            if accepted.contains(&packet_id) {
                return Err(AdvError::DuplicatePacket {
                    address: self.address,
                    packet_id,
                });
            }
            state.check_packet_id(packet_id)?;
            let plaintext = ead::decrypt(&payload, &material, self.address)?;
            structures.extend(crate::structures::parse_ad_stream(&plaintext).iter().cloned());
            accepted.push(packet_id);
        }

        // Ids are committed only once every blob authenticated; a forged
        // payload must not block the genuine one behind it.
        if let Some(packet_id) = accepted.last() {
            state.record_packet_id(*packet_id);
        }

        Ok(Interpretation::Ead { structures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ead::EadKeyMaterial;
    use crate::structures::AdStructure;

    fn addr() -> BdAddr {
        BdAddr::new([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01])
    }

    fn material() -> EadKeyMaterial {
        EadKeyMaterial::new(&[0x11; 16], &[0x22; 8]).unwrap()
    }

    fn data_with(blobs: Vec<Vec<u8>>) -> AdvertisingData {
        AdvertisingData {
            encrypted_data: blobs,
            ..AdvertisingData::default()
        }
    }

    #[test]
    fn test_decrypts_and_reparses() {
        // Inner plaintext: shortened local name "hi"
        let inner = [0x03, 0x08, b'h', b'i'];
        let blob = ead::encrypt(&inner, &material(), addr(), [0x01, 0x02, 0x03, 0x04, 0x05])
            .unwrap();

        let interpreter = EadInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());
        state.encryption.ead = Some(material());

        let result = interpreter.interpret(&data_with(vec![blob]), &mut state).unwrap();
        let Interpretation::Ead { structures } = result else {
            panic!("wrong interpretation kind");
        };
        assert_eq!(structures.len(), 1);
        assert!(matches!(
            &structures[0],
            AdStructure::LocalName { name, complete: false } if name == "hi"
        ));
    }

    #[test]
    fn test_missing_key() {
        let interpreter = EadInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());

        let data = data_with(vec![vec![0u8; 12]]);
        assert!(matches!(
            interpreter.interpret(&data, &mut state),
            Err(AdvError::EncryptionRequired { .. })
        ));
    }

    #[test]
    fn test_failed_decrypt_leaves_randomizer_unrecorded() {
        let inner = [0x02, 0x0A, 0x04];
        let randomizer = [0x01, 0x01, 0x02, 0x03, 0x05];
        let blob = ead::encrypt(&inner, &material(), addr(), randomizer).unwrap();

        let interpreter = EadInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());
        state.encryption.ead = Some(material());

        // An attacker-garbled copy fails authentication and must not
        // consume the randomizer.
        let mut tampered = blob.clone();
        *tampered.last_mut().unwrap() ^= 0xFF;
        assert!(matches!(
            interpreter.interpret(&data_with(vec![tampered]), &mut state),
            Err(AdvError::DecryptionFailed { .. })
        ));
        assert!(state.last_packet_id().is_none());

        // The genuine packet with that randomizer still decrypts.
        assert!(interpreter.interpret(&data_with(vec![blob]), &mut state).is_ok());
    }

    #[test]
    fn test_repeated_randomizer_is_duplicate() {
        let inner = [0x02, 0x0A, 0x04];
        let randomizer = [0x09, 0x08, 0x07, 0x06, 0x05];
        let blob = ead::encrypt(&inner, &material(), addr(), randomizer).unwrap();

        let interpreter = EadInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());
        state.encryption.ead = Some(material());

        assert!(interpreter.interpret(&data_with(vec![blob.clone()]), &mut state).is_ok());
        assert!(matches!(
            interpreter.interpret(&data_with(vec![blob]), &mut state),
            Err(AdvError::DuplicatePacket { .. })
        ));
    }
}
