//! Interpreter trait and routing registry.
//!
//! Interpreters turn an [`AdvertisingData`] snapshot into structured
//! readings. Each one declares a routing key at registration time: a
//! manufacturer company id, a service UUID, or fallback. Dispatch consults
//! the indexed interpreters first, fallbacks after, and runs `supports()`
//! on every candidate before instantiating per-device handlers.

use std::sync::Arc;

use hashbrown::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::data::AdvertisingData;
use crate::error::Result;
use crate::interpreters::Interpretation;
use crate::state::DeviceAdvertisingState;
use crate::types::BdAddr;

// ----------------------------------------------------------------------------
// Trait
// ----------------------------------------------------------------------------

/// How an interpreter is indexed for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Matched when the advertisement carries manufacturer data for this id.
    CompanyId(u16),
    /// Matched when the advertisement carries service data under this UUID.
    ServiceUuid(Uuid),
    /// Consulted for every advertisement, after indexed interpreters.
    Fallback,
}

/// Static identity of an interpreter implementation.
#[derive(Debug, Clone, Copy)]
pub struct InterpreterInfo {
    pub name: &'static str,
    pub routing: Routing,
}

/// A protocol handler for one family of advertisements.
///
/// Instances are created per device and hold no cross-device state; the
/// per-device counters live in [`DeviceAdvertisingState`] which the
/// dispatcher threads through `interpret`.
pub trait AdvertisingInterpreter: Send + Sync {
    fn info(&self) -> InterpreterInfo;

    /// Cheap payload-shape check run after routing. Routing narrows by
    /// index key; this rejects payloads the interpreter cannot parse.
    fn supports(&self, data: &AdvertisingData) -> bool;

    fn interpret(
        &self,
        data: &AdvertisingData,
        state: &mut DeviceAdvertisingState,
    ) -> Result<Interpretation>;
}

/// Creates a per-device interpreter instance.
pub type InterpreterFactory =
    Arc<dyn Fn(BdAddr) -> Box<dyn AdvertisingInterpreter> + Send + Sync>;

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Dispatch table mapping routing keys to interpreter factories.
///
/// Built once at startup via [`register`] and then treated as immutable,
/// so lookups take no lock. Registration order is preserved within each
/// index and fallbacks always run after indexed matches.
///
/// [`register`]: Self::register
#[derive(Default)]
pub struct InterpreterRegistry {
    factories: Vec<(InterpreterInfo, InterpreterFactory)>,
    by_company: HashMap<u16, Vec<usize>>,
    by_service: HashMap<Uuid, Vec<usize>>,
    fallback: Vec<usize>,
}

impl InterpreterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in interpreters.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::interpreters::register_builtin(&mut registry);
        registry
    }

    pub fn register(&mut self, info: InterpreterInfo, factory: InterpreterFactory) {
        let index = self.factories.len();
        match info.routing {
            Routing::CompanyId(id) => self.by_company.entry(id).or_default().push(index),
            Routing::ServiceUuid(uuid) => self.by_service.entry(uuid).or_default().push(index),
            Routing::Fallback => self.fallback.push(index),
        }
        debug!(name = info.name, routing = ?info.routing, "registered interpreter");
        self.factories.push((info, factory));
    }

    /// Remove every interpreter registered under `name` and rebuild the
    /// indices. Teardown-only, like [`register`].
    ///
    /// [`register`]: Self::register
    pub fn unregister(&mut self, name: &str) {
        let retained: Vec<_> = std::mem::take(&mut self.factories)
            .into_iter()
            .filter(|(info, _)| info.name != name)
            .collect();
        self.by_company.clear();
        self.by_service.clear();
        self.fallback.clear();
        for (info, factory) in retained {
            self.register(info, factory);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Interpreters whose routing key appears in `data`, indexed first,
    /// fallbacks after, each deduplicated in registration order.
    fn candidates(&self, data: &AdvertisingData) -> Vec<usize> {
        let mut ordered = Vec::new();
        for company_id in data.manufacturer_data.keys() {
            if let Some(indices) = self.by_company.get(company_id) {
                ordered.extend_from_slice(indices);
            }
        }
        for uuid in data.service_data.keys() {
            if let Some(indices) = self.by_service.get(uuid) {
                ordered.extend_from_slice(indices);
            }
        }
        ordered.sort_unstable();
        ordered.dedup();
        ordered.extend_from_slice(&self.fallback);
        ordered
    }

    /// Instantiates candidates for `address` and keeps those whose
    /// `supports()` accepts the payload.
    pub fn matching(
        &self,
        data: &AdvertisingData,
        address: BdAddr,
    ) -> Vec<Box<dyn AdvertisingInterpreter>> {
        self.candidates(data)
            .into_iter()
            .map(|index| (self.factories[index].1)(address))
            .filter(|interpreter| interpreter.supports(data))
            .collect()
    }

    /// Runs the first supporting interpreter. `None` when nothing matches.
    pub fn first_match(
        &self,
        data: &AdvertisingData,
        state: &mut DeviceAdvertisingState,
    ) -> Option<Result<Interpretation>> {
        let interpreter = self.matching(data, state.address).into_iter().next()?;
        Some(interpreter.interpret(data, state))
    }

    /// Runs every supporting interpreter, collecting successes and logging
    /// failures. One interpreter erroring never stops the rest.
    pub fn all_matches(
        &self,
        data: &AdvertisingData,
        state: &mut DeviceAdvertisingState,
    ) -> Vec<Interpretation> {
        let mut results = Vec::new();
        for interpreter in self.matching(data, state.address) {
            match interpreter.interpret(data, state) {
                Ok(interpretation) => results.push(interpretation),
                Err(err) => {
                    warn!(
                        interpreter = interpreter.info().name,
                        address = %state.address,
                        %err,
                        "interpreter failed, continuing"
                    );
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ManufacturerData;
    use crate::error::AdvError;
    use blesig_core::CompanyInfo;

    struct FixedInterpreter {
        info: InterpreterInfo,
        accepts: bool,
        fails: bool,
    }

    impl AdvertisingInterpreter for FixedInterpreter {
        fn info(&self) -> InterpreterInfo {
            self.info
        }

        fn supports(&self, _data: &AdvertisingData) -> bool {
            self.accepts
        }

        fn interpret(
            &self,
            _data: &AdvertisingData,
            _state: &mut DeviceAdvertisingState,
        ) -> Result<Interpretation> {
            if self.fails {
                Err(AdvError::Interpreter("forced failure".into()))
            } else {
                Ok(Interpretation::Generic {
                    name: self.info.name.to_string(),
                    details: Vec::new(),
                })
            }
        }
    }

    fn register_fixed(
        registry: &mut InterpreterRegistry,
        name: &'static str,
        routing: Routing,
        accepts: bool,
        fails: bool,
    ) {
        let info = InterpreterInfo { name, routing };
        registry.register(
            info,
            Arc::new(move |_addr| {
                Box::new(FixedInterpreter {
                    info,
                    accepts,
                    fails,
                })
            }),
        );
    }

    fn data_with_company(company_id: u16) -> AdvertisingData {
        let mut data = AdvertisingData::default();
        data.manufacturer_data.insert(
            company_id,
            ManufacturerData {
                company: CompanyInfo {
                    id: company_id,
                    name: None,
                },
                payload: vec![0x01],
            },
        );
        data
    }

    fn state() -> DeviceAdvertisingState {
        DeviceAdvertisingState::new(BdAddr::new([0xA4, 0xC1, 0x38, 0, 0, 1]))
    }

    #[test]
    fn test_indexed_before_fallback() {
        let mut registry = InterpreterRegistry::new();
        register_fixed(&mut registry, "fallback", Routing::Fallback, true, false);
        register_fixed(
            &mut registry,
            "vendor",
            Routing::CompanyId(0x1234),
            true,
            false,
        );

        let data = data_with_company(0x1234);
        let results = registry.all_matches(&data, &mut state());
        let names: Vec<_> = results
            .iter()
            .map(|r| match r {
                Interpretation::Generic { name, .. } => name.as_str(),
                _ => panic!("unexpected interpretation"),
            })
            .collect();
        // Company-indexed runs first even though the fallback registered first.
        assert_eq!(names, ["vendor", "fallback"]);
    }

    #[test]
    fn test_supports_filters_candidates() {
        let mut registry = InterpreterRegistry::new();
        register_fixed(
            &mut registry,
            "picky",
            Routing::CompanyId(0x1234),
            false,
            false,
        );

        let data = data_with_company(0x1234);
        assert!(registry.first_match(&data, &mut state()).is_none());
    }

    #[test]
    fn test_routing_key_mismatch_skips() {
        let mut registry = InterpreterRegistry::new();
        register_fixed(
            &mut registry,
            "other-vendor",
            Routing::CompanyId(0x9999),
            true,
            false,
        );

        let data = data_with_company(0x1234);
        assert!(registry.all_matches(&data, &mut state()).is_empty());
    }

    #[test]
    fn test_unregister_rebuilds_indices() {
        let mut registry = InterpreterRegistry::new();
        register_fixed(
            &mut registry,
            "vendor",
            Routing::CompanyId(0x1234),
            true,
            false,
        );
        register_fixed(&mut registry, "fallback", Routing::Fallback, true, false);

        registry.unregister("vendor");
        assert_eq!(registry.len(), 1);

        let data = data_with_company(0x1234);
        let results = registry.all_matches(&data, &mut state());
        assert_eq!(results.len(), 1);
        assert!(matches!(
            &results[0],
            Interpretation::Generic { name, .. } if name == "fallback"
        ));
    }

    #[test]
    fn test_failure_does_not_stop_pipeline() {
        let mut registry = InterpreterRegistry::new();
        register_fixed(
            &mut registry,
            "broken",
            Routing::CompanyId(0x1234),
            true,
            true,
        );
        register_fixed(&mut registry, "fallback", Routing::Fallback, true, false);

        let data = data_with_company(0x1234);
        let results = registry.all_matches(&data, &mut state());
        assert_eq!(results.len(), 1);
        assert!(matches!(
            &results[0],
            Interpretation::Generic { name, .. } if name == "fallback"
        ));
    }
}
