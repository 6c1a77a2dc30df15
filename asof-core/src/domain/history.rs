//! Fetched histories and the windows they are acquired over.

use super::{CacheKind, EntityId, Table};
use crate::clock::Clock;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Longest trailing span, in days, a lookback or consumption window may
/// cover. Roughly a century; anything longer is a configuration mistake.
pub const MAX_SPAN_DAYS: u32 = 36_525;

/// `date` minus `days`, saturating at the earliest representable date.
pub fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// How far back an acquisition reaches from today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookback {
    /// A trailing number of calendar days.
    Days(u32),
    /// Everything since a fixed date.
    Since(NaiveDate),
}

/// Date range a fetcher requests from its provider.
///
/// Only constructible from a clock, never from an as-of date: what gets
/// cached is independent of which as-of date triggered the refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl AcquisitionWindow {
    /// Window ending at the clock's current date.
    pub fn anchored(clock: &dyn Clock, lookback: Lookback) -> Self {
        let end = clock.today();
        let start = match lookback {
            Lookback::Days(days) => days_before(end, days),
            Lookback::Since(date) => date.min(end),
        };
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

/// The full history of one kind for one entity, as returned by a fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHistory {
    pub entity: EntityId,
    pub kind: CacheKind,
    pub window: AcquisitionWindow,
    /// Provider(s) that produced the tables.
    pub source: String,
    pub tables: Vec<Table>,
}

impl RawHistory {
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(Table::len).sum()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}
