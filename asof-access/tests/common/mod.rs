#![allow(dead_code)]

use asof_access::DatasetAssembler;
use asof_core::data::{CacheRegistry, FetcherSet, SourceFetcher};
use asof_core::domain::{AcquisitionWindow, CacheKind, EntityId, Lookback, RawHistory, Record, Row, Table};
use asof_core::{FetchError, FixedClock, ProviderError};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

static COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn temp_root(tag: &str) -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("asof_access_{tag}_{}_{id}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// "True now" for every harness: well after the as-of dates under test.
pub fn true_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()
}

fn row(date: NaiveDate, pairs: &[(&str, String)]) -> Row {
    Row::new(date, pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<Record>())
}

/// Weekly closes from 2023-01-02 through 2025-01-13.
pub fn price_tables() -> Vec<Table> {
    let mut rows = Vec::new();
    let mut date = d("2023-01-02");
    let mut close = 10.0;
    while date <= d("2025-01-13") {
        rows.push(row(date, &[("close", format!("{close:.2}")), ("volume", "1000".into())]));
        date += Duration::days(7);
        close += 0.05;
    }
    vec![Table::new("price.csv", rows)]
}

/// Statements keyed by notice date; the last two are published after mid-2024.
pub fn financial_tables() -> Vec<Table> {
    let notices = [
        ("2023-04-28", "2023-03-31"),
        ("2023-08-30", "2023-06-30"),
        ("2023-10-30", "2023-09-30"),
        ("2024-04-29", "2024-03-31"),
        ("2024-08-30", "2024-06-30"),
        ("2024-10-30", "2024-09-30"),
    ];
    ["profit_sheet.csv", "balance_sheet.csv", "cash_flow_sheet.csv"]
        .iter()
        .map(|name| {
            let rows = notices
                .iter()
                .map(|(notice, report)| {
                    row(
                        d(notice),
                        &[("NOTICE_DATE", notice.to_string()), ("REPORT_DATE", report.to_string())],
                    )
                })
                .collect();
            Table::new(*name, rows)
        })
        .collect()
}

pub fn share_tables() -> Vec<Table> {
    vec![Table::new(
        "share_change.csv",
        vec![
            row(d("2020-01-01"), &[("total_shares", "100".into())]),
            row(d("2024-03-15"), &[("total_shares", "120".into())]),
            row(d("2024-09-01"), &[("total_shares", "150".into())]),
        ],
    )]
}

pub fn disclosure_tables() -> Vec<Table> {
    let items = ["2021-05-01", "2022-07-15", "2023-03-01", "2024-06-29", "2024-07-02"];
    vec![Table::new(
        "disclosure_list.csv",
        items
            .iter()
            .map(|s| row(d(s), &[("title", format!("announcement {s}"))]))
            .collect(),
    )]
}

/// Fetcher returning fixed tables, counting calls, optionally failing.
pub struct MockFetcher {
    kind: CacheKind,
    tables: Mutex<Vec<Table>>,
    clock: Arc<FixedClock>,
    pub calls: AtomicUsize,
    fail_all: Mutex<Option<ProviderError>>,
    fail_for: Mutex<BTreeSet<String>>,
}

impl MockFetcher {
    pub fn new(kind: CacheKind, tables: Vec<Table>, clock: Arc<FixedClock>) -> Self {
        Self {
            kind,
            tables: Mutex::new(tables),
            clock,
            calls: AtomicUsize::new(0),
            fail_all: Mutex::new(None),
            fail_for: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, err: Option<ProviderError>) {
        *self.fail_all.lock().unwrap() = err;
    }

    pub fn fail_symbol(&self, symbol: &str) {
        self.fail_for.lock().unwrap().insert(symbol.to_string());
    }

    pub fn set_tables(&self, tables: Vec<Table>) {
        *self.tables.lock().unwrap() = tables;
    }
}

impl SourceFetcher for MockFetcher {
    fn kind(&self) -> CacheKind {
        self.kind
    }

    fn fetch_full_history(&self, entity: &EntityId) -> Result<RawHistory, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = if self.fail_for.lock().unwrap().contains(&entity.symbol()) {
            Some(ProviderError::Timeout("scripted".into()))
        } else {
            self.fail_all.lock().unwrap().clone()
        };
        if let Some(source) = failure {
            return Err(FetchError {
                entity: entity.symbol(),
                kind: self.kind,
                provider: "mock".into(),
                attempts: 4,
                source,
            });
        }
        Ok(RawHistory {
            entity: entity.clone(),
            kind: self.kind,
            window: AcquisitionWindow::anchored(self.clock.as_ref(), Lookback::Days(1800)),
            source: "mock".into(),
            tables: self.tables.lock().unwrap().clone(),
        })
    }
}

pub struct Harness {
    pub root: PathBuf,
    pub clock: Arc<FixedClock>,
    pub fetchers: BTreeMap<CacheKind, Arc<MockFetcher>>,
    pub assembler: DatasetAssembler,
}

impl Harness {
    pub fn new(tag: &str) -> Self {
        let root = temp_root(tag);
        Self::with_registry(CacheRegistry::defaults(&root), root)
    }

    pub fn with_registry(registry: CacheRegistry, root: PathBuf) -> Self {
        let clock = Arc::new(FixedClock::new(true_now()));
        let mut fetchers = BTreeMap::new();
        let mut set = FetcherSet::new();
        for (kind, tables) in [
            (CacheKind::PriceSeries, price_tables()),
            (CacheKind::Financials, financial_tables()),
            (CacheKind::ShareCapital, share_tables()),
            (CacheKind::Disclosures, disclosure_tables()),
        ] {
            let fetcher = Arc::new(MockFetcher::new(kind, tables, Arc::clone(&clock)));
            set.insert(fetcher.clone());
            fetchers.insert(kind, fetcher);
        }
        let assembler = DatasetAssembler::new(Arc::new(registry), set, clock.clone());
        Self {
            root,
            clock,
            fetchers,
            assembler,
        }
    }

    pub fn fetcher(&self, kind: CacheKind) -> &MockFetcher {
        &self.fetchers[&kind]
    }

    pub fn calls(&self, kind: CacheKind) -> usize {
        self.fetcher(kind).calls()
    }

    pub fn all_calls(&self) -> BTreeMap<CacheKind, usize> {
        self.fetchers.iter().map(|(k, f)| (*k, f.calls())).collect()
    }

    pub fn path(&self, entity: &EntityId, kind: CacheKind) -> PathBuf {
        self.assembler.registry().resolve(kind, Some(entity)).unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

pub fn equity() -> EntityId {
    EntityId::parse("600000.SH").unwrap().with_name("浦发银行")
}
