//! Cache policy registry.
//!
//! Each [`CacheKind`] maps to one [`CacheSpec`]: where it lives, how long it
//! stays fresh, which artifacts make it complete, and how far back it is
//! acquired. The registry is built once, then shared read-only.

use crate::domain::{CacheKind, EntityId, Lookback, MAX_SPAN_DAYS};
use crate::error::ConfigError;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Longest accepted TTL.
pub const MAX_TTL_SECS: u64 = MAX_SPAN_DAYS as u64 * DAY;

/// Placeholders a path template may use.
const PLACEHOLDERS: [&str; 4] = ["{entity}", "{symbol}", "{code}", "{market}"];

/// Refresh and storage policy for one cache kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSpec {
    pub kind: CacheKind,
    /// Relative to the cache root. Per-entity kinds reference `{entity}`
    /// (or `{symbol}`); global kinds use no placeholders.
    pub path_template: String,
    pub description: String,
    pub ttl_secs: u64,
    pub required_files: Vec<String>,
    pub optional_files: Vec<String>,
    pub per_entity: bool,
    pub acquisition_lookback: Option<Lookback>,
    /// Trailing window, in days before the as-of date, that consumers see.
    pub consumption_window_days: Option<u32>,
}

impl CacheSpec {
    /// A per-entity spec with no artifacts yet.
    pub fn new(kind: CacheKind, path_template: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            kind,
            path_template: path_template.into(),
            description: String::new(),
            ttl_secs,
            required_files: Vec::new(),
            optional_files: Vec::new(),
            per_entity: true,
            acquisition_lookback: None,
            consumption_window_days: None,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn required(mut self, files: &[&str]) -> Self {
        self.required_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn optional(mut self, files: &[&str]) -> Self {
        self.optional_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn global(mut self) -> Self {
        self.per_entity = false;
        self
    }

    pub fn lookback(mut self, lookback: Lookback) -> Self {
        self.acquisition_lookback = Some(lookback);
        self
    }

    pub fn consumption_window(mut self, days: u32) -> Self {
        self.consumption_window_days = Some(days);
        self
    }

    pub fn ttl(&self) -> Duration {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Required then optional artifact names.
    pub fn artifacts(&self) -> impl Iterator<Item = &str> {
        self.required_files
            .iter()
            .chain(self.optional_files.iter())
            .map(String::as_str)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let out_of_range = |field: &'static str, value: u64, max: u64| ConfigError::OutOfRange {
            kind: self.kind,
            field,
            value,
            max,
        };
        if self.ttl_secs > MAX_TTL_SECS {
            return Err(out_of_range("ttl_secs", self.ttl_secs, MAX_TTL_SECS));
        }
        if let Some(Lookback::Days(days)) = self.acquisition_lookback {
            if days > MAX_SPAN_DAYS {
                return Err(out_of_range("acquisition_lookback_days", days.into(), MAX_SPAN_DAYS.into()));
            }
        }
        if let Some(days) = self.consumption_window_days {
            if days > MAX_SPAN_DAYS {
                return Err(out_of_range("consumption_window_days", days.into(), MAX_SPAN_DAYS.into()));
            }
        }

        let invalid = |reason: &str| ConfigError::InvalidTemplate {
            kind: self.kind,
            template: self.path_template.clone(),
            reason: reason.to_string(),
        };

        let path = Path::new(&self.path_template);
        if self.path_template.trim().is_empty() {
            return Err(invalid("template is empty"));
        }
        if path.is_absolute() {
            return Err(invalid("template must be relative to the cache root"));
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(invalid("template must not leave the cache root"));
        }

        let has_entity = self.path_template.contains("{entity}") || self.path_template.contains("{symbol}");
        let has_any = PLACEHOLDERS.iter().any(|p| self.path_template.contains(p));
        if self.per_entity && !has_entity {
            return Err(invalid("per-entity template must contain {entity} or {symbol}"));
        }
        if !self.per_entity && has_any {
            return Err(invalid("global template must not contain entity placeholders"));
        }
        Ok(())
    }
}

/// Builder for an immutable [`CacheRegistry`].
#[derive(Debug, Clone)]
pub struct CacheRegistryBuilder {
    root: PathBuf,
    specs: BTreeMap<CacheKind, CacheSpec>,
}

impl CacheRegistryBuilder {
    /// Empty registry rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            specs: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the default policy for every kind.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        let mut specs = BTreeMap::new();
        for spec in default_specs() {
            specs.insert(spec.kind, spec);
        }
        Self {
            root: root.into(),
            specs,
        }
    }

    /// Register `spec` under `kind`. Re-registering an identical spec is a
    /// no-op; a different spec for an existing kind is a conflict.
    pub fn register(&mut self, kind: CacheKind, spec: CacheSpec) -> Result<&mut Self, ConfigError> {
        if spec.kind != kind {
            return Err(ConfigError::KindMismatch {
                registered: kind,
                described: spec.kind,
            });
        }
        spec.validate()?;
        match self.specs.get(&kind) {
            Some(existing) if *existing == spec => {}
            Some(_) => return Err(ConfigError::Conflict { kind }),
            None => {
                self.specs.insert(kind, spec);
            }
        }
        Ok(self)
    }

    /// Replace the policy for a kind that is already registered.
    pub fn override_spec(&mut self, spec: CacheSpec) -> Result<&mut Self, ConfigError> {
        if !self.specs.contains_key(&spec.kind) {
            return Err(ConfigError::UnknownKind(spec.kind));
        }
        spec.validate()?;
        self.specs.insert(spec.kind, spec);
        Ok(self)
    }

    pub fn spec(&self, kind: CacheKind) -> Option<&CacheSpec> {
        self.specs.get(&kind)
    }

    pub fn build(self) -> CacheRegistry {
        CacheRegistry {
            root: self.root,
            specs: self.specs,
        }
    }
}

/// Immutable kind-to-policy table, rooted at a cache directory.
#[derive(Debug, Clone)]
pub struct CacheRegistry {
    root: PathBuf,
    specs: BTreeMap<CacheKind, CacheSpec>,
}

impl CacheRegistry {
    /// The default policy table.
    pub fn defaults(root: impl Into<PathBuf>) -> Self {
        CacheRegistryBuilder::with_defaults(root).build()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lookup(&self, kind: CacheKind) -> Result<&CacheSpec, ConfigError> {
        self.specs.get(&kind).ok_or(ConfigError::UnknownKind(kind))
    }

    pub fn specs(&self) -> impl Iterator<Item = &CacheSpec> {
        self.specs.values()
    }

    /// Storage directory for `kind`, rendered for `entity` when per-entity.
    pub fn resolve(&self, kind: CacheKind, entity: Option<&EntityId>) -> Result<PathBuf, ConfigError> {
        let spec = self.lookup(kind)?;
        if !spec.per_entity {
            return Ok(self.root.join(&spec.path_template));
        }
        let entity = entity.ok_or(ConfigError::EntityRequired { kind })?;
        let rendered = spec
            .path_template
            .replace("{entity}", &entity.storage_segment())
            .replace("{symbol}", &entity.symbol())
            .replace("{code}", entity.code())
            .replace("{market}", entity.market().as_str());
        Ok(self.root.join(rendered))
    }
}

/// Default policy table.
pub fn default_specs() -> Vec<CacheSpec> {
    let since_2000 = NaiveDate::from_ymd_opt(2000, 1, 1).map(Lookback::Since);

    let mut financials = CacheSpec::new(CacheKind::Financials, "{entity}/financials_cache", 7 * DAY)
        .describe("Financial statements: profit, balance sheet, cash flow")
        .required(&["profit_sheet.csv", "balance_sheet.csv", "cash_flow_sheet.csv"])
        .optional(&["financial_abstract.csv"]);
    financials.acquisition_lookback = since_2000;

    let mut share = CacheSpec::new(CacheKind::ShareCapital, "{entity}/share_info", 7 * DAY)
        .describe("Share capital change history")
        .required(&["share_change.csv"]);
    share.acquisition_lookback = since_2000;

    vec![
        CacheSpec::new(CacheKind::PriceSeries, "{entity}/prices", DAY)
            .describe("Daily price history")
            .required(&["price.csv"])
            .lookback(Lookback::Days(1800)),
        financials,
        share,
        CacheSpec::new(CacheKind::Disclosures, "{entity}/disclosures", DAY)
            .describe("Announcement and disclosure list")
            .required(&["disclosure_list.csv"])
            .lookback(Lookback::Days(900))
            .consumption_window(730),
        CacheSpec::new(CacheKind::SecurityList, "global/security_list", 12 * HOUR)
            .describe("Exchange security list")
            .required(&["securities.csv"])
            .global(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> EntityId {
        EntityId::parse("600000.SH").unwrap().with_name("浦发银行")
    }

    #[test]
    fn defaults_cover_every_kind() {
        let reg = CacheRegistry::defaults("/cache");
        for kind in CacheKind::ALL {
            assert!(reg.lookup(kind).is_ok(), "{kind} missing");
        }
        assert_eq!(reg.lookup(CacheKind::PriceSeries).unwrap().ttl(), Duration::days(1));
        assert_eq!(reg.lookup(CacheKind::Financials).unwrap().ttl(), Duration::days(7));
        assert_eq!(
            reg.lookup(CacheKind::Disclosures).unwrap().consumption_window_days,
            Some(730)
        );
    }

    #[test]
    fn resolve_per_entity_path() {
        let reg = CacheRegistry::defaults("/cache");
        let path = reg.resolve(CacheKind::PriceSeries, Some(&entity())).unwrap();
        assert_eq!(path, PathBuf::from("/cache/浦发银行_600000.SH/prices"));
    }

    #[test]
    fn resolve_global_ignores_entity() {
        let reg = CacheRegistry::defaults("/cache");
        let a = reg.resolve(CacheKind::SecurityList, None).unwrap();
        let b = reg.resolve(CacheKind::SecurityList, Some(&entity())).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/cache/global/security_list"));
    }

    #[test]
    fn resolve_per_entity_without_entity_is_config_error() {
        let reg = CacheRegistry::defaults("/cache");
        assert_eq!(
            reg.resolve(CacheKind::Financials, None),
            Err(ConfigError::EntityRequired {
                kind: CacheKind::Financials
            })
        );
    }

    #[test]
    fn lookup_unregistered_kind_is_config_error() {
        let reg = CacheRegistryBuilder::new("/cache").build();
        assert_eq!(
            reg.lookup(CacheKind::Disclosures),
            Err(ConfigError::UnknownKind(CacheKind::Disclosures))
        );
    }

    #[test]
    fn identical_registration_is_idempotent_conflict_is_rejected() {
        let mut b = CacheRegistryBuilder::new("/cache");
        let spec = CacheSpec::new(CacheKind::PriceSeries, "{entity}/px", DAY).required(&["price.csv"]);
        b.register(CacheKind::PriceSeries, spec.clone()).unwrap();
        b.register(CacheKind::PriceSeries, spec.clone()).unwrap();

        let mut changed = spec;
        changed.ttl_secs = 2 * DAY;
        assert_eq!(
            b.register(CacheKind::PriceSeries, changed).unwrap_err(),
            ConfigError::Conflict {
                kind: CacheKind::PriceSeries
            }
        );
    }

    #[test]
    fn register_rejects_mismatched_kind() {
        let mut b = CacheRegistryBuilder::new("/cache");
        let spec = CacheSpec::new(CacheKind::Financials, "{entity}/f", DAY);
        assert!(matches!(
            b.register(CacheKind::PriceSeries, spec),
            Err(ConfigError::KindMismatch { .. })
        ));
    }

    #[test]
    fn templates_are_validated() {
        let mut b = CacheRegistryBuilder::new("/cache");
        let escape = CacheSpec::new(CacheKind::PriceSeries, "../{entity}", DAY);
        assert!(matches!(
            b.register(CacheKind::PriceSeries, escape),
            Err(ConfigError::InvalidTemplate { .. })
        ));
        let no_entity = CacheSpec::new(CacheKind::PriceSeries, "prices", DAY);
        assert!(b.register(CacheKind::PriceSeries, no_entity).is_err());
        let global_with_entity = CacheSpec::new(CacheKind::SecurityList, "{entity}/list", DAY).global();
        assert!(b.register(CacheKind::SecurityList, global_with_entity).is_err());
    }

    #[test]
    fn override_replaces_registered_spec() {
        let mut b = CacheRegistryBuilder::with_defaults("/cache");
        let mut spec = b.spec(CacheKind::PriceSeries).unwrap().clone();
        spec.ttl_secs = 6 * HOUR;
        b.override_spec(spec).unwrap();
        let reg = b.build();
        assert_eq!(reg.lookup(CacheKind::PriceSeries).unwrap().ttl(), Duration::hours(6));
    }

    #[test]
    fn register_rejects_spans_that_overflow_date_math() {
        let mut b = CacheRegistryBuilder::with_defaults("/cache");
        let mut spec = b.spec(CacheKind::PriceSeries).unwrap().clone();
        spec.ttl_secs = u64::MAX;
        assert!(matches!(
            b.override_spec(spec.clone()),
            Err(ConfigError::OutOfRange { field: "ttl_secs", .. })
        ));

        spec.ttl_secs = DAY;
        spec.acquisition_lookback = Some(Lookback::Days(u32::MAX));
        assert!(matches!(
            b.override_spec(spec),
            Err(ConfigError::OutOfRange { field: "acquisition_lookback_days", .. })
        ));
    }

    #[test]
    fn unvalidated_ttl_saturates() {
        let mut spec = CacheSpec::new(CacheKind::PriceSeries, "{entity}/prices", DAY);
        spec.ttl_secs = u64::MAX;
        assert_eq!(spec.ttl(), Duration::MAX);
    }

    #[test]
    fn symbol_placeholder_renders() {
        let mut b = CacheRegistryBuilder::new("/c");
        b.register(
            CacheKind::PriceSeries,
            CacheSpec::new(CacheKind::PriceSeries, "{market}/{symbol}", DAY),
        )
        .unwrap();
        let reg = b.build();
        assert_eq!(
            reg.resolve(CacheKind::PriceSeries, Some(&entity())).unwrap(),
            PathBuf::from("/c/CN_A/600000.SH")
        );
    }
}
