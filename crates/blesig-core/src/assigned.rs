//! Assigned-numbers lookup tables
//!
//! Read-only dictionaries mapping SIG-assigned integers to display
//! information: characteristic UUID to name/unit, company identifier to
//! vendor name, appearance value to category. The tables are supplied
//! pre-loaded by the application; a small built-in subset backs the lazy
//! process-wide default so decoding works out of the box.
//!
//! Construction order: build tables before first lookup; the global default
//! is populated exactly once behind `OnceLock` and read-only afterwards.

use std::sync::OnceLock;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Types
// ----------------------------------------------------------------------------

/// Resolved company identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub id: u16,
    /// `None` when the identifier is not in the loaded table
    pub name: Option<String>,
}

/// Pre-loaded, process-lifetime lookup tables
#[derive(Debug, Clone, Default)]
pub struct AssignedNumbers {
    characteristic_names: HashMap<u16, &'static str>,
    company_names: HashMap<u16, &'static str>,
    appearance_categories: HashMap<u16, &'static str>,
}

impl AssignedNumbers {
    /// Build from caller-supplied tables
    pub fn from_tables(
        characteristic_names: HashMap<u16, &'static str>,
        company_names: HashMap<u16, &'static str>,
        appearance_categories: HashMap<u16, &'static str>,
    ) -> Self {
        Self {
            characteristic_names,
            company_names,
            appearance_categories,
        }
    }

    /// Process-wide default, loaded exactly once on first access
    pub fn global() -> &'static AssignedNumbers {
        static GLOBAL: OnceLock<AssignedNumbers> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            tracing::debug!("loading built-in assigned-numbers tables");
            AssignedNumbers::builtin()
        })
    }

    pub fn characteristic_name(&self, uuid: u16) -> Option<&'static str> {
        self.characteristic_names.get(&uuid).copied()
    }

    pub fn company_name(&self, company_id: u16) -> Option<&'static str> {
        self.company_names.get(&company_id).copied()
    }

    /// Resolve a company identifier, preserving the id when the name is unknown
    pub fn company(&self, company_id: u16) -> CompanyInfo {
        CompanyInfo {
            id: company_id,
            name: self.company_name(company_id).map(str::to_string),
        }
    }

    /// Appearance values encode the category in bits 6..=15.
    pub fn appearance_category(&self, appearance: u16) -> Option<&'static str> {
        self.appearance_categories.get(&(appearance >> 6)).copied()
    }

    fn builtin() -> Self {
        let characteristic_names = [
            (0x2A00, "Device Name"),
            (0x2A01, "Appearance"),
            (0x2A07, "Tx Power Level"),
            (0x2A19, "Battery Level"),
            (0x2A1C, "Temperature Measurement"),
            (0x2A29, "Manufacturer Name String"),
            (0x2A37, "Heart Rate Measurement"),
            (0x2A3F, "Alert Status"),
            (0x2A6C, "Elevation"),
            (0x2A6D, "Pressure"),
            (0x2A6E, "Temperature"),
            (0x2A6F, "Humidity"),
        ]
        .into_iter()
        .collect();

        let company_names = [
            (0x0006u16, "Microsoft"),
            (0x004C, "Apple, Inc."),
            (0x0059, "Nordic Semiconductor ASA"),
            (0x00E0, "Google"),
            (0x038F, "Xiaomi Inc."),
            (0x0499, "Ruuvi Innovations Ltd."),
            (0x06E8, "Shelly Group"),
        ]
        .into_iter()
        .collect();

        let appearance_categories = [
            (0x000u16, "Unknown"),
            (0x001, "Phone"),
            (0x002, "Computer"),
            (0x003, "Watch"),
            (0x004, "Clock"),
            (0x005, "Display"),
            (0x006, "Remote Control"),
            (0x008, "Tag"),
            (0x00A, "Media Player"),
            (0x015, "Sensor"),
        ]
        .into_iter()
        .collect();

        Self::from_tables(characteristic_names, company_names, appearance_categories)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
