//! Market data provider trait.
//!
//! A provider answers one question: give me the records of `dataset` for
//! this entity over this window. Retry, rate limiting, fallback and date
//! normalization live in the fetcher layer above it, so providers stay thin
//! and mockable.

use crate::domain::{AcquisitionWindow, CacheKind, EntityId, Record};
use crate::error::ProviderError;

/// One provider call.
#[derive(Debug, Clone, Copy)]
pub struct TableRequest<'a> {
    pub entity: &'a EntityId,
    pub kind: CacheKind,
    /// Provider-side dataset name, e.g. `equity_daily` or `profit_sheet`.
    pub dataset: &'a str,
    pub window: AcquisitionWindow,
}

pub trait MarketDataProvider: Send + Sync {
    /// Short identifier, recorded in refresh markers.
    fn name(&self) -> &str;

    fn fetch_table(&self, request: &TableRequest<'_>) -> Result<Vec<Record>, ProviderError>;

    /// False while the provider refuses traffic (circuit breaker open).
    fn is_available(&self) -> bool {
        true
    }
}
