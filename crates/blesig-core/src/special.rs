//! Special sentinel value resolution
//!
//! Bluetooth SIG characteristics reserve raw codings to mean "value unknown",
//! "reserved for future use", or measurement overflow/underflow rather than
//! data. Resolution is layered: user overrides beat class rules beat
//! spec rules, and a user entry may explicitly disable a lower-tier rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Rule Types
// ----------------------------------------------------------------------------

/// Why a raw coding is special rather than measured data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialValueCategory {
    Unknown,
    Reserved,
    Overflow,
    Underflow,
}

/// One sentinel mapping: a raw wire value to its semantic meaning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialValueRule {
    pub raw_value: i64,
    pub meaning: String,
    pub category: SpecialValueCategory,
    /// Measurement limit implied by an overflow/underflow sentinel, if any
    pub threshold: Option<f64>,
}

impl SpecialValueRule {
    pub fn new(
        raw_value: i64,
        meaning: impl Into<String>,
        category: SpecialValueCategory,
    ) -> Self {
        Self {
            raw_value,
            meaning: meaning.into(),
            category,
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// A successful resolution, tagged with the tier that supplied the rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialValueMatch {
    pub rule: SpecialValueRule,
    pub tier: RuleTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleTier {
    Spec,
    Class,
    User,
}

// ----------------------------------------------------------------------------
// Resolver
// ----------------------------------------------------------------------------

/// Three-tier sentinel lookup for one characteristic class.
///
/// Spec rules are fixed at construction; class and user tiers may be mutated
/// at runtime. The user tier stores `Option<rule>` so an explicit `None`
/// suppresses a lower-tier match — a deliberate disable, not a miss.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecialValueResolver {
    spec: BTreeMap<i64, SpecialValueRule>,
    class: BTreeMap<i64, SpecialValueRule>,
    user: BTreeMap<i64, Option<SpecialValueRule>>,
}

impl SpecialValueResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resolver from the spec-level rules for a characteristic
    pub fn from_spec_rules(rules: impl IntoIterator<Item = SpecialValueRule>) -> Self {
        let mut resolver = Self::new();
        for rule in rules {
            resolver.spec.insert(rule.raw_value, rule);
        }
        resolver
    }

    /// Add a class-level rule (shared by every characteristic of the class)
    pub fn add_class_rule(&mut self, rule: SpecialValueRule) {
        self.class.insert(rule.raw_value, rule);
    }

    /// Install a user override, beating any class or spec rule for `raw_value`
    pub fn set_user_override(&mut self, rule: SpecialValueRule) {
        self.user.insert(rule.raw_value, Some(rule));
    }

    /// Suppress any lower-tier rule for `raw_value`
    pub fn disable(&mut self, raw_value: i64) {
        self.user.insert(raw_value, None);
    }

    /// Remove a user entry, restoring lower-tier behavior
    pub fn remove_user_override(&mut self, raw_value: i64) {
        self.user.remove(&raw_value);
    }

    pub fn clear_user_overrides(&mut self) {
        self.user.clear();
    }

    /// Resolve a raw value, consulting user, class, then spec tiers.
    ///
    /// Returns `None` both for plain data values and for values whose rule a
    /// user override has disabled.
    pub fn resolve(&self, raw: i64) -> Option<SpecialValueMatch> {
        if let Some(entry) = self.user.get(&raw) {
            return entry.as_ref().map(|rule| SpecialValueMatch {
                rule: rule.clone(),
                tier: RuleTier::User,
            });
        }
        if let Some(rule) = self.class.get(&raw) {
            return Some(SpecialValueMatch {
                rule: rule.clone(),
                tier: RuleTier::Class,
            });
        }
        self.spec.get(&raw).map(|rule| SpecialValueMatch {
            rule: rule.clone(),
            tier: RuleTier::Spec,
        })
    }

    pub fn is_special(&self, raw: i64) -> bool {
        self.resolve(raw).is_some()
    }

    /// All effective rules of a category, in raw-value order
    pub fn find_by_category(&self, category: SpecialValueCategory) -> Vec<SpecialValueRule> {
        self.effective_rules()
            .into_iter()
            .filter(|r| r.category == category)
            .collect()
    }

    /// All effective rules whose meaning contains `substr` (case-insensitive)
    pub fn find_by_meaning(&self, substr: &str) -> Vec<SpecialValueRule> {
        let needle = substr.to_lowercase();
        self.effective_rules()
            .into_iter()
            .filter(|r| r.meaning.to_lowercase().contains(&needle))
            .collect()
    }

    /// The rules `resolve` would actually return, after overlaying all tiers
    fn effective_rules(&self) -> Vec<SpecialValueRule> {
        let mut merged: BTreeMap<i64, Option<SpecialValueRule>> = BTreeMap::new();
        for (raw, rule) in &self.spec {
            merged.insert(*raw, Some(rule.clone()));
        }
        for (raw, rule) in &self.class {
            merged.insert(*raw, Some(rule.clone()));
        }
        for (raw, entry) in &self.user {
            merged.insert(*raw, entry.clone());
        }
        merged.into_values().flatten().collect()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with_spec_rule() -> SpecialValueResolver {
        SpecialValueResolver::from_spec_rules([SpecialValueRule::new(
            0x8000,
            "Value is not known",
            SpecialValueCategory::Unknown,
        )])
    }

    #[test]
    fn test_spec_rule_resolves() {
        let resolver = resolver_with_spec_rule();
        let matched = resolver.resolve(0x8000).unwrap();
        assert_eq!(matched.tier, RuleTier::Spec);
        assert_eq!(matched.rule.meaning, "Value is not known");
        assert!(resolver.resolve(0x1234).is_none());
    }

    #[test]
    fn test_user_override_beats_spec() {
        let mut resolver = resolver_with_spec_rule();
        resolver.set_user_override(SpecialValueRule::new(
            0x8000,
            "Sensor detached",
            SpecialValueCategory::Unknown,
        ));
        let matched = resolver.resolve(0x8000).unwrap();
        assert_eq!(matched.tier, RuleTier::User);
        assert_eq!(matched.rule.meaning, "Sensor detached");
    }

    #[test]
    fn test_disable_suppresses_spec_rule() {
        let mut resolver = resolver_with_spec_rule();
        resolver.disable(0x8000);
        assert!(resolver.resolve(0x8000).is_none());
        assert!(!resolver.is_special(0x8000));

        resolver.remove_user_override(0x8000);
        assert!(resolver.is_special(0x8000));
    }

    #[test]
    fn test_class_tier_between_user_and_spec() {
        let mut resolver = resolver_with_spec_rule();
        resolver.add_class_rule(SpecialValueRule::new(
            0x8000,
            "Class meaning",
            SpecialValueCategory::Reserved,
        ));
        assert_eq!(resolver.resolve(0x8000).unwrap().tier, RuleTier::Class);

        resolver.set_user_override(SpecialValueRule::new(
            0x8000,
            "User meaning",
            SpecialValueCategory::Reserved,
        ));
        assert_eq!(resolver.resolve(0x8000).unwrap().tier, RuleTier::User);
    }

    #[test]
    fn test_reverse_lookups_respect_overlay() {
        let mut resolver = SpecialValueResolver::from_spec_rules([
            SpecialValueRule::new(0x7FFF, "Overflow high", SpecialValueCategory::Overflow)
                .with_threshold(327.67),
            SpecialValueRule::new(0x8000, "Value is not known", SpecialValueCategory::Unknown),
        ]);
        assert_eq!(
            resolver.find_by_category(SpecialValueCategory::Overflow).len(),
            1
        );
        assert_eq!(resolver.find_by_meaning("not known").len(), 1);

        resolver.disable(0x8000);
        assert!(resolver.find_by_meaning("not known").is_empty());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let resolver = resolver_with_spec_rule();
        let first = resolver.resolve(0x8000);
        let second = resolver.resolve(0x8000);
        assert_eq!(first, second);
    }
}
