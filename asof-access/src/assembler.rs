//! Dataset assembly: inspect, conditionally refresh, load, truncate.
//!
//! Per kind:
//! 1. Skip kinds that don't apply to the entity class (or weren't requested)
//! 2. Inspect the cache location against its policy
//! 3. Refresh (fetch, write, record) when inspection or the caller demands it
//! 4. Load the full history from disk
//! 5. Truncate to the as-of date (and the consumption window, if any)
//!
//! A failed refresh is an error unless the caller opted into stale data.

use crate::bundle::{BundleOrigin, DataBundle, PreparedDataset};
use crate::error::AccessError;
use crate::locks::RefreshLocks;
use crate::truncate::{consumption_start, truncate_tables};
use asof_core::clock::Clock;
use asof_core::data::{
    quarantine, read_table, should_refresh as needs_refresh, CacheInspector, CacheRegistry, CacheSpec, CacheState,
    CacheWriter, FetcherSet,
};
use asof_core::domain::{CacheKind, EntityId, Table, MAX_SPAN_DAYS};
use asof_core::ConfigError;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-call options. The default is a plain online call without disclosures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Re-fetch every applicable kind.
    pub force_refresh: bool,
    /// Re-fetch financial statements.
    pub force_refresh_financials: bool,
    /// Re-fetch these kinds specifically.
    pub force_kinds: BTreeSet<CacheKind>,
    pub include_disclosures: bool,
    /// Overrides the disclosure consumption window for this call.
    pub disclosure_window_days: Option<u32>,
    /// Never contact providers.
    pub offline: bool,
    /// Serve a complete but outdated copy when refresh fails or is disallowed.
    pub allow_stale: bool,
}

impl PrepareOptions {
    pub fn forces(&self, kind: CacheKind) -> bool {
        self.force_refresh
            || (self.force_refresh_financials && kind == CacheKind::Financials)
            || self.force_kinds.contains(&kind)
    }
}

/// Parse a caller-supplied as-of date. `YYYY-MM-DD` and `YYYYMMDD` are accepted.
pub fn parse_as_of(raw: &str) -> Result<NaiveDate, AccessError> {
    let s = raw.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .map_err(|_| AccessError::InvalidInput(format!("as-of date '{raw}' is not a calendar date (YYYY-MM-DD)")))
}

/// Kinds assembled for `entity`, in order.
pub fn applicable_kinds(entity: &EntityId, include_disclosures: bool) -> Vec<CacheKind> {
    CacheKind::BUNDLE_KINDS
        .into_iter()
        .filter(|k| k.applies_to(entity.class()))
        .filter(|k| *k != CacheKind::Disclosures || include_disclosures)
        .collect()
}

pub struct DatasetAssembler {
    registry: Arc<CacheRegistry>,
    fetchers: FetcherSet,
    inspector: CacheInspector,
    writer: CacheWriter,
    clock: Arc<dyn Clock>,
    locks: RefreshLocks,
}

impl DatasetAssembler {
    pub fn new(registry: Arc<CacheRegistry>, fetchers: FetcherSet, clock: Arc<dyn Clock>) -> Self {
        Self {
            inspector: CacheInspector::new(Arc::clone(&clock)),
            writer: CacheWriter::new(Arc::clone(&clock)),
            registry,
            fetchers,
            clock,
            locks: RefreshLocks::new(),
        }
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Read-only state of a cache location under `kind`'s policy.
    pub fn check_cache(&self, path: &Path, kind: CacheKind) -> Result<CacheState, AccessError> {
        let spec = self.registry.lookup(kind)?;
        Ok(self.inspector.inspect(path, spec))
    }

    /// Whether `prepare_dataset` would refresh the location now.
    pub fn should_refresh(&self, path: &Path, kind: CacheKind, force: bool) -> Result<bool, AccessError> {
        let state = self.check_cache(path, kind)?;
        Ok(needs_refresh(&state, force))
    }

    /// `check_cache` for an entity's own location.
    pub fn check_entity(&self, entity: &EntityId, kind: CacheKind) -> Result<CacheState, AccessError> {
        let path = self.registry.resolve(kind, Some(entity))?;
        self.check_cache(&path, kind)
    }

    /// Prepare `entity` as of a `YYYY-MM-DD` date string.
    pub fn prepare_dataset(
        &self,
        entity: &EntityId,
        as_of: &str,
        opts: &PrepareOptions,
    ) -> Result<PreparedDataset, AccessError> {
        let as_of = parse_as_of(as_of)?;
        self.prepare_dataset_on(entity, as_of, opts)
    }

    pub fn prepare_dataset_on(
        &self,
        entity: &EntityId,
        as_of: NaiveDate,
        opts: &PrepareOptions,
    ) -> Result<PreparedDataset, AccessError> {
        // One day of slack: the caller's calendar may run ahead of ours.
        let latest = self.clock.today() + Duration::days(1);
        if as_of > latest {
            return Err(AccessError::InvalidInput(format!(
                "as-of date {as_of} is in the future (today is {})",
                self.clock.today()
            )));
        }

        if let Some(days) = opts.disclosure_window_days.filter(|d| *d > MAX_SPAN_DAYS) {
            return Err(AccessError::InvalidInput(format!(
                "disclosure window of {days} days exceeds the {MAX_SPAN_DAYS}-day maximum"
            )));
        }

        let kinds = applicable_kinds(entity, opts.include_disclosures);
        tracing::debug!(entity = %entity, %as_of, ?kinds, "preparing dataset");

        let bundle_for = |kind: CacheKind| -> Result<DataBundle, AccessError> {
            if kinds.contains(&kind) {
                self.prepare_kind(entity, kind, as_of, opts)
            } else {
                Ok(DataBundle::not_applicable(kind, as_of))
            }
        };

        let dataset = PreparedDataset {
            entity: entity.clone(),
            as_of,
            prices: bundle_for(CacheKind::PriceSeries)?,
            financials: bundle_for(CacheKind::Financials)?,
            share_capital: bundle_for(CacheKind::ShareCapital)?,
            disclosures: bundle_for(CacheKind::Disclosures)?,
            assembled_at: self.clock.now(),
        };

        if dataset.prices.is_empty() {
            tracing::warn!(entity = %entity, %as_of, "no price rows on or before as-of date");
        }
        tracing::info!(
            entity = %entity,
            %as_of,
            prices = dataset.prices.row_count(),
            financials = dataset.financials.row_count(),
            share_capital = dataset.share_capital.row_count(),
            disclosures = dataset.disclosures.row_count(),
            "dataset prepared"
        );
        Ok(dataset)
    }

    fn prepare_kind(
        &self,
        entity: &EntityId,
        kind: CacheKind,
        as_of: NaiveDate,
        opts: &PrepareOptions,
    ) -> Result<DataBundle, AccessError> {
        let spec = self.registry.lookup(kind)?;
        let path = self.registry.resolve(kind, Some(entity))?;

        let (origin, state, tables) = self.locks.with_location(&path, || -> Result<_, AccessError> {
            let (origin, state) = self.ensure_fresh(entity, spec, &path, opts)?;
            let tables = self.load(entity, spec, &path)?;
            Ok((origin, state, tables))
        })?;

        let window_days = match kind {
            CacheKind::Disclosures => opts.disclosure_window_days.or(spec.consumption_window_days),
            _ => spec.consumption_window_days,
        };
        let window_start = consumption_start(as_of, window_days);

        Ok(DataBundle {
            kind,
            as_of,
            window_start,
            tables: truncate_tables(&tables, as_of, window_start),
            sources: tables.iter().map(|t| path.join(&t.name)).collect(),
            origin,
            last_refresh: state.last_refresh,
        })
    }

    /// Bring the location up to date, or decide to serve what is there.
    /// Returns how the data was obtained and the post-refresh state.
    fn ensure_fresh(
        &self,
        entity: &EntityId,
        spec: &CacheSpec,
        path: &Path,
        opts: &PrepareOptions,
    ) -> Result<(BundleOrigin, CacheState), AccessError> {
        let kind = spec.kind;
        let force = opts.forces(kind);
        let state = self.inspector.inspect(path, spec);

        if !needs_refresh(&state, force) {
            tracing::debug!(entity = %entity, %kind, "cache valid");
            return Ok((BundleOrigin::Cached, state));
        }

        if opts.offline {
            if state.is_valid() {
                tracing::debug!(entity = %entity, %kind, "offline: forced refresh skipped, cache valid");
                return Ok((BundleOrigin::Cached, state));
            }
            return self.degrade(entity, spec, path, state, opts, "offline mode disallows refresh".to_string());
        }

        let fetcher = self
            .fetchers
            .get(kind)
            .ok_or(ConfigError::NoFetcher { kind })?;

        tracing::info!(
            entity = %entity,
            %kind,
            force,
            stale = state.stale,
            missing = state.missing.len(),
            corrupt = state.corrupt,
            "refreshing cache"
        );

        match fetcher.fetch_full_history(entity) {
            Ok(history) => {
                self.writer
                    .write_history(path, &history, &spec.optional_files)
                    .map_err(|source| AccessError::Store {
                        entity: entity.symbol(),
                        kind,
                        source,
                    })?;
                self.writer
                    .record_refresh(path, &history)
                    .map_err(|source| AccessError::Store {
                        entity: entity.symbol(),
                        kind,
                        source,
                    })?;
                let refreshed = self.inspector.inspect(path, spec);
                Ok((BundleOrigin::Fetched, refreshed))
            }
            Err(err) if opts.allow_stale => self.degrade(entity, spec, path, state, opts, err.to_string()),
            Err(err) => Err(AccessError::Fetch {
                path: path.to_path_buf(),
                source: err,
            }),
        }
    }

    fn degrade(
        &self,
        entity: &EntityId,
        spec: &CacheSpec,
        path: &Path,
        state: CacheState,
        opts: &PrepareOptions,
        reason: String,
    ) -> Result<(BundleOrigin, CacheState), AccessError> {
        if opts.allow_stale && state.is_complete() {
            tracing::warn!(
                entity = %entity,
                kind = %spec.kind,
                age_secs = ?state.age_secs,
                reason = %reason,
                "serving stale cache"
            );
            return Ok((BundleOrigin::StaleFallback { reason }, state));
        }
        let detail = if state.corrupt {
            "cache is corrupt".to_string()
        } else if !state.missing.is_empty() {
            let missing: Vec<&str> = state.missing.iter().map(String::as_str).collect();
            format!("missing {}", missing.join(", "))
        } else if state.last_refresh.is_none() {
            "cache was never refreshed".to_string()
        } else {
            "cache is stale".to_string()
        };
        Err(AccessError::CacheIntegrity {
            entity: entity.symbol(),
            kind: spec.kind,
            path: path.to_path_buf(),
            reason: format!("{reason}; {detail}"),
        })
    }

    /// Read every artifact of the location. Required artifacts must parse;
    /// unreadable ones are quarantined.
    fn load(&self, entity: &EntityId, spec: &CacheSpec, dir: &Path) -> Result<Vec<Table>, AccessError> {
        let mut tables = Vec::new();
        for name in spec.artifacts() {
            let file = dir.join(name);
            let required = spec.required_files.iter().any(|r| r == name);
            if !file.is_file() {
                if required {
                    return Err(AccessError::CacheIntegrity {
                        entity: entity.symbol(),
                        kind: spec.kind,
                        path: file,
                        reason: "required artifact missing after refresh".into(),
                    });
                }
                continue;
            }
            match read_table(&file, name) {
                Ok(table) => tables.push(table),
                Err(e) if e.is_corruption() => {
                    let reason = e.to_string();
                    let moved: PathBuf = quarantine(&file).map_err(|source| AccessError::Store {
                        entity: entity.symbol(),
                        kind: spec.kind,
                        source,
                    })?;
                    return Err(AccessError::CacheIntegrity {
                        entity: entity.symbol(),
                        kind: spec.kind,
                        path: file,
                        reason: format!("{reason}; moved to {}", moved.display()),
                    });
                }
                Err(source) => {
                    return Err(AccessError::Store {
                        entity: entity.symbol(),
                        kind: spec.kind,
                        source,
                    })
                }
            }
        }
        Ok(tables)
    }
}
