//! Catch-all interpreter run after every protocol-specific one.
//!
//! Produces a human-readable summary from the generic AD structures so
//! that a device with no dedicated interpreter still shows up with its
//! name, vendor, and advertised services.

use std::sync::Arc;

use crate::data::AdvertisingData;
use crate::error::Result;
use crate::interpreter::{
    AdvertisingInterpreter, InterpreterInfo, InterpreterRegistry, Routing,
};
use crate::interpreters::Interpretation;
use crate::state::DeviceAdvertisingState;
use crate::types::BdAddr;

const INFO: InterpreterInfo = InterpreterInfo {
    name: "generic",
    routing: Routing::Fallback,
};

pub fn register(registry: &mut InterpreterRegistry) {
    registry.register(INFO, Arc::new(|address| Box::new(GenericInterpreter { address })));
}

pub struct GenericInterpreter {
    address: BdAddr,
}

impl GenericInterpreter {
    pub fn new(address: BdAddr) -> Self {
        Self { address }
    }
}

impl AdvertisingInterpreter for GenericInterpreter {
    fn info(&self) -> InterpreterInfo {
        INFO
    }

    fn supports(&self, _data: &AdvertisingData) -> bool {
        true
    }

    fn interpret(
        &self,
        data: &AdvertisingData,
        _state: &mut DeviceAdvertisingState,
    ) -> Result<Interpretation> {
        let mut details = Vec::new();

        let name = data
            .local_name
            .clone()
            .unwrap_or_else(|| self.address.to_string());

        for manufacturer in data.manufacturer_data.values() {
            let vendor = manufacturer
                .company
                .name
                .clone()
                .unwrap_or_else(|| format!("company 0x{:04X}", manufacturer.company.id));
            details.push(("vendor".to_string(), vendor));
        }
        for uuid in &data.service_uuids {
            details.push(("service".to_string(), uuid.to_string()));
        }
        if let Some(rssi) = data.rssi {
            details.push(("rssi".to_string(), format!("{rssi} dBm")));
        }
        if !data.encrypted_data.is_empty() {
            details.push((
                "encrypted".to_string(),
                format!("{} undecrypted payload(s)", data.encrypted_data.len()),
            ));
        }

        Ok(Interpretation::Generic { name, details })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ManufacturerData;
    use blesig_core::CompanyInfo;

    fn addr() -> BdAddr {
        BdAddr::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06])
    }

    #[test]
    fn test_summarizes_known_fields() {
        let mut data = AdvertisingData {
            local_name: Some("Kitchen Sensor".to_string()),
            rssi: Some(-67),
            ..AdvertisingData::default()
        };
        data.manufacturer_data.insert(
            0x0499,
            ManufacturerData {
                company: CompanyInfo {
                    id: 0x0499,
                    name: Some("Ruuvi Innovations Ltd.".to_string()),
                },
                payload: vec![0x05],
            },
        );

        let interpreter = GenericInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());
        let Interpretation::Generic { name, details } =
            interpreter.interpret(&data, &mut state).unwrap()
        else {
            panic!("wrong interpretation kind");
        };

        assert_eq!(name, "Kitchen Sensor");
        assert!(details
            .iter()
            .any(|(k, v)| k == "vendor" && v == "Ruuvi Innovations Ltd."));
        assert!(details.iter().any(|(k, v)| k == "rssi" && v == "-67 dBm"));
    }

    #[test]
    fn test_falls_back_to_address() {
        let interpreter = GenericInterpreter::new(addr());
        let mut state = DeviceAdvertisingState::new(addr());

        let Interpretation::Generic { name, details } = interpreter
            .interpret(&AdvertisingData::default(), &mut state)
            .unwrap()
        else {
            panic!("wrong interpretation kind");
        };
        assert_eq!(name, "01:02:03:04:05:06");
        assert!(details.is_empty());
    }
}
