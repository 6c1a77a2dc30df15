//! Source fetchers: one per cache kind, each returning the full history of
//! its kind for an entity.
//!
//! The acquisition window is derived from the fetcher's clock and lookback.
//! `fetch_full_history` takes no as-of date, so what gets cached can never
//! depend on the date a caller is asking about.

use super::provider::{MarketDataProvider, TableRequest};
use super::rate_limit::RateLimiter;
use super::registry::CacheRegistry;
use super::retry::RetryPolicy;
use crate::clock::Clock;
use crate::domain::{
    parse_effective_date, AcquisitionWindow, CacheKind, EntityClass, EntityId, Lookback, RawHistory, Record, Row,
    Table,
};
use crate::error::{ConfigError, FetchError, ProviderError};
use std::collections::BTreeMap;
use std::sync::Arc;

pub trait SourceFetcher: Send + Sync {
    fn kind(&self) -> CacheKind;

    fn applies_to(&self, class: EntityClass) -> bool {
        self.kind().applies_to(class)
    }

    /// Everything available for `entity` over the fetcher's acquisition
    /// window, ascending by effective date.
    fn fetch_full_history(&self, entity: &EntityId) -> Result<RawHistory, FetchError>;
}

/// Provider dataset name, optionally varying by asset class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetName {
    Uniform(String),
    PerClass { equity: String, etf: String, index: String },
}

impl DatasetName {
    pub fn for_class(&self, class: EntityClass) -> &str {
        match self {
            DatasetName::Uniform(name) => name,
            DatasetName::PerClass { equity, etf, index } => match class {
                EntityClass::Equity => equity,
                EntityClass::Etf => etf,
                EntityClass::Index => index,
            },
        }
    }
}

/// How one cache artifact is sourced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSource {
    /// File name inside the cache directory.
    pub artifact: String,
    pub dataset: DatasetName,
    /// Candidate columns for the effective date, in priority order.
    pub date_columns: Vec<String>,
    /// Skipped (not an error) when the provider has no such dataset.
    pub optional: bool,
    /// An empty result is valid data rather than "not found".
    pub allow_empty: bool,
}

impl ArtifactSource {
    pub fn new(artifact: &str, dataset: &str, date_columns: &[&str]) -> Self {
        Self {
            artifact: artifact.to_string(),
            dataset: DatasetName::Uniform(dataset.to_string()),
            date_columns: date_columns.iter().map(|c| c.to_string()).collect(),
            optional: false,
            allow_empty: false,
        }
    }

    pub fn per_class(mut self, equity: &str, etf: &str, index: &str) -> Self {
        self.dataset = DatasetName::PerClass {
            equity: equity.to_string(),
            etf: etf.to_string(),
            index: index.to_string(),
        };
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

/// Stamp each record with its effective date, dropping records without a
/// parseable one, then sort ascending and dedupe.
pub fn normalize_records(artifact: &str, records: Vec<Record>, date_columns: &[String]) -> Table {
    let mut dropped = 0usize;
    let rows: Vec<Row> = records
        .into_iter()
        .filter_map(|fields| {
            let date = date_columns
                .iter()
                .filter_map(|c| fields.get(c))
                .find_map(|v| parse_effective_date(v));
            match date {
                Some(date) => Some(Row::new(date, fields)),
                None => {
                    dropped += 1;
                    None
                }
            }
        })
        .collect();
    if dropped > 0 {
        tracing::debug!(artifact, dropped, "dropped records without an effective date");
    }
    let mut table = Table::new(artifact, rows);
    table.normalize();
    table
}

/// Fetches one kind's artifacts from a provider chain.
///
/// The first provider is primary; any others are fallbacks, tried in order
/// when the one before fails. Only price series accept fallbacks.
pub struct DatasetFetcher {
    kind: CacheKind,
    lookback: Lookback,
    artifacts: Vec<ArtifactSource>,
    providers: Vec<Arc<dyn MarketDataProvider>>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl DatasetFetcher {
    pub fn new(
        kind: CacheKind,
        lookback: Lookback,
        primary: Arc<dyn MarketDataProvider>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kind,
            lookback,
            artifacts: Vec::new(),
            providers: vec![primary],
            limiter,
            retry,
            clock,
        }
    }

    pub fn artifact(mut self, source: ArtifactSource) -> Self {
        self.artifacts.push(source);
        self
    }

    pub fn with_fallback(mut self, provider: Arc<dyn MarketDataProvider>) -> Result<Self, ConfigError> {
        if self.kind != CacheKind::PriceSeries {
            return Err(ConfigError::FallbackNotAllowed { kind: self.kind });
        }
        self.providers.push(provider);
        Ok(self)
    }

    pub fn artifacts(&self) -> &[ArtifactSource] {
        &self.artifacts
    }

    /// Returns `Ok(None)` for an optional artifact the providers don't carry.
    fn fetch_artifact(
        &self,
        entity: &EntityId,
        source: &ArtifactSource,
        window: AcquisitionWindow,
        used: &mut Vec<String>,
    ) -> Result<Option<Table>, FetchError> {
        let dataset = source.dataset.for_class(entity.class());
        let request = TableRequest {
            entity,
            kind: self.kind,
            dataset,
            window,
        };

        let mut total_attempts = 0;
        let mut last: Option<(String, ProviderError)> = None;

        for provider in &self.providers {
            if !provider.is_available() {
                tracing::warn!(provider = provider.name(), kind = %self.kind, "provider unavailable, skipping");
                last = Some((provider.name().to_string(), ProviderError::CircuitBreakerTripped));
                continue;
            }

            let (result, attempts) = self.retry.run(|_| {
                self.limiter.acquire();
                let records = provider.fetch_table(&request)?;
                if records.is_empty() && !source.allow_empty {
                    return Err(ProviderError::EntityNotFound {
                        symbol: entity.symbol(),
                        dataset: dataset.to_string(),
                    });
                }
                Ok(records)
            });
            total_attempts += attempts;

            match result {
                Ok(records) => {
                    let table = normalize_records(&source.artifact, records, &source.date_columns);
                    tracing::debug!(
                        entity = %entity,
                        kind = %self.kind,
                        artifact = %source.artifact,
                        provider = provider.name(),
                        rows = table.len(),
                        "fetched artifact"
                    );
                    if !used.iter().any(|n| n == provider.name()) {
                        used.push(provider.name().to_string());
                    }
                    return Ok(Some(table));
                }
                Err(e) => {
                    tracing::warn!(
                        entity = %entity,
                        kind = %self.kind,
                        dataset,
                        provider = provider.name(),
                        attempts,
                        error = %e,
                        "provider fetch failed"
                    );
                    last = Some((provider.name().to_string(), e));
                }
            }
        }

        let (provider, error) = last.unwrap_or_else(|| {
            (
                "none".to_string(),
                ProviderError::Other("no provider configured".into()),
            )
        });

        if source.optional && matches!(error, ProviderError::EntityNotFound { .. }) {
            tracing::debug!(entity = %entity, artifact = %source.artifact, "optional artifact not available");
            return Ok(None);
        }

        Err(FetchError {
            entity: entity.symbol(),
            kind: self.kind,
            provider,
            attempts: total_attempts,
            source: error,
        })
    }
}

impl SourceFetcher for DatasetFetcher {
    fn kind(&self) -> CacheKind {
        self.kind
    }

    fn fetch_full_history(&self, entity: &EntityId) -> Result<RawHistory, FetchError> {
        if !self.applies_to(entity.class()) {
            return Err(FetchError {
                entity: entity.symbol(),
                kind: self.kind,
                provider: "none".into(),
                attempts: 0,
                source: ProviderError::Unsupported(format!("{} has no {} data", entity.class(), self.kind)),
            });
        }

        let window = AcquisitionWindow::anchored(self.clock.as_ref(), self.lookback);
        let mut used = Vec::new();
        let mut tables = Vec::with_capacity(self.artifacts.len());
        for source in &self.artifacts {
            if let Some(table) = self.fetch_artifact(entity, source, window, &mut used)? {
                tables.push(table);
            }
        }

        Ok(RawHistory {
            entity: entity.clone(),
            kind: self.kind,
            window,
            source: used.join("+"),
            tables,
        })
    }
}

/// Fetchers keyed by kind.
#[derive(Clone, Default)]
pub struct FetcherSet {
    fetchers: BTreeMap<CacheKind, Arc<dyn SourceFetcher>>,
}

impl FetcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fetcher: Arc<dyn SourceFetcher>) -> &mut Self {
        self.fetchers.insert(fetcher.kind(), fetcher);
        self
    }

    pub fn get(&self, kind: CacheKind) -> Option<&Arc<dyn SourceFetcher>> {
        self.fetchers.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = CacheKind> + '_ {
        self.fetchers.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// Fetchers for every bundle kind against `primary`, with lookbacks
    /// from the registry. `price_fallbacks` back up the price fetcher only.
    pub fn standard(
        registry: &CacheRegistry,
        primary: Arc<dyn MarketDataProvider>,
        price_fallbacks: Vec<Arc<dyn MarketDataProvider>>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let mut set = Self::new();
        for (kind, artifacts) in standard_artifacts() {
            let spec = registry.lookup(kind)?;
            let lookback = spec.acquisition_lookback.unwrap_or(Lookback::Days(365));
            let mut fetcher = DatasetFetcher::new(
                kind,
                lookback,
                Arc::clone(&primary),
                Arc::clone(&limiter),
                retry.clone(),
                Arc::clone(&clock),
            );
            for source in artifacts {
                fetcher = fetcher.artifact(source);
            }
            if kind == CacheKind::PriceSeries {
                for fallback in &price_fallbacks {
                    fetcher = fetcher.with_fallback(Arc::clone(fallback))?;
                }
            }
            set.insert(Arc::new(fetcher));
        }
        Ok(set)
    }
}

/// Artifact sources for each bundle kind. Names match the default registry.
pub fn standard_artifacts() -> Vec<(CacheKind, Vec<ArtifactSource>)> {
    const STATEMENT_DATES: [&str; 4] = ["NOTICE_DATE", "公告日期", "REPORT_DATE", "报告期"];
    vec![
        (
            CacheKind::PriceSeries,
            vec![ArtifactSource::new("price.csv", "equity_daily", &["date", "日期", "trade_date"])
                .per_class("equity_daily", "etf_daily", "index_daily")],
        ),
        (
            CacheKind::Financials,
            vec![
                ArtifactSource::new("profit_sheet.csv", "profit_sheet", &STATEMENT_DATES),
                ArtifactSource::new("balance_sheet.csv", "balance_sheet", &STATEMENT_DATES),
                ArtifactSource::new("cash_flow_sheet.csv", "cash_flow_sheet", &STATEMENT_DATES),
                ArtifactSource::new("financial_abstract.csv", "financial_abstract", &STATEMENT_DATES)
                    .optional(),
            ],
        ),
        (
            CacheKind::ShareCapital,
            vec![ArtifactSource::new("share_change.csv", "share_change", &["变动日期", "change_date", "date"])],
        ),
        (
            CacheKind::Disclosures,
            vec![ArtifactSource::new(
                "disclosure_list.csv",
                "disclosure_list",
                &["公告时间", "announcement_time", "date", "datetime"],
            )
            .allow_empty()],
        ),
    ]
}
