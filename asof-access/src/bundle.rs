//! Bundles and prepared datasets returned to callers.

use asof_core::domain::{CacheKind, EntityId, Row, Table};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// How a bundle's underlying cache was obtained on this call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BundleOrigin {
    /// Refreshed from the provider during this call.
    Fetched,
    /// Served from a valid cache without fetching.
    Cached,
    /// Refresh was needed but failed or was disallowed; an older complete
    /// copy was served because the caller opted in.
    StaleFallback { reason: String },
    /// The kind does not apply to this entity or was not requested.
    NotApplicable,
}

/// The as-of-truncated view of one cache kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataBundle {
    pub kind: CacheKind,
    pub as_of: NaiveDate,
    /// Lower bound of the consumption window, when the kind has one.
    pub window_start: Option<NaiveDate>,
    pub tables: Vec<Table>,
    /// Artifact files the rows were loaded from.
    pub sources: Vec<PathBuf>,
    pub origin: BundleOrigin,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl DataBundle {
    pub fn not_applicable(kind: CacheKind, as_of: NaiveDate) -> Self {
        Self {
            kind,
            as_of,
            window_start: None,
            tables: Vec::new(),
            sources: Vec::new(),
            origin: BundleOrigin::NotApplicable,
            last_refresh: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(Table::is_empty)
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(Table::len).sum()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Most recent row of `name` on or before the as-of date.
    pub fn latest(&self, name: &str) -> Option<&Row> {
        self.table(name)?.latest_on_or_before(self.as_of)
    }

    /// Latest effective date across all tables.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.tables.iter().filter_map(Table::last_date).max()
    }
}

/// Everything known about one entity as of one date.
///
/// Built fresh on every call; holds no handles into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedDataset {
    pub entity: EntityId,
    pub as_of: NaiveDate,
    pub prices: DataBundle,
    pub financials: DataBundle,
    pub share_capital: DataBundle,
    pub disclosures: DataBundle,
    /// Wall-clock time of assembly.
    pub assembled_at: DateTime<Utc>,
}

impl PreparedDataset {
    pub fn bundle(&self, kind: CacheKind) -> Option<&DataBundle> {
        match kind {
            CacheKind::PriceSeries => Some(&self.prices),
            CacheKind::Financials => Some(&self.financials),
            CacheKind::ShareCapital => Some(&self.share_capital),
            CacheKind::Disclosures => Some(&self.disclosures),
            CacheKind::SecurityList => None,
        }
    }

    pub fn bundles(&self) -> [&DataBundle; 4] {
        [&self.prices, &self.financials, &self.share_capital, &self.disclosures]
    }

    /// Latest effective date across every bundle. Never later than `as_of`.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.bundles().iter().filter_map(|b| b.max_date()).max()
    }
}
