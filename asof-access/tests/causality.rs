mod common;

use asof_access::{BundleOrigin, PrepareOptions};
use asof_core::data::{read_marker, read_table};
use asof_core::domain::CacheKind;
use chrono::Duration;
use common::{d, equity, Harness};
use proptest::prelude::*;
use std::sync::OnceLock;

#[test]
fn empty_cache_fetches_full_history_and_serves_only_the_past() {
    let h = Harness::new("scenario_a");
    let entity = equity();
    let as_of = d("2024-06-30");

    let ds = h
        .assembler
        .prepare_dataset(&entity, "2024-06-30", &PrepareOptions::default())
        .unwrap();

    assert_eq!(h.calls(CacheKind::PriceSeries), 1);
    assert_eq!(h.calls(CacheKind::Financials), 1);
    assert_eq!(h.calls(CacheKind::ShareCapital), 1);
    assert_eq!(h.calls(CacheKind::Disclosures), 0);

    for bundle in [&ds.prices, &ds.financials, &ds.share_capital] {
        assert_eq!(bundle.origin, BundleOrigin::Fetched);
        assert!(!bundle.is_empty(), "{} bundle is empty", bundle.kind);
        assert!(bundle.max_date().unwrap() <= as_of);
    }
    assert!(ds.max_date().unwrap() <= as_of);

    // The last price row on or before 2024-06-30 is the Monday 2024-06-24.
    assert_eq!(ds.prices.max_date(), Some(d("2024-06-24")));
    let profit = ds.financials.table("profit_sheet.csv").unwrap();
    assert_eq!(profit.len(), 4);
    assert_eq!(profit.last_date(), Some(d("2024-04-29")));
    let shares = ds.share_capital.latest("share_change.csv").unwrap();
    assert_eq!(shares.get("total_shares"), Some("120"));

    // Disk holds history through the fetch date, not the as-of date.
    let price_dir = h.path(&entity, CacheKind::PriceSeries);
    let on_disk = read_table(&price_dir.join("price.csv"), "price.csv").unwrap();
    assert_eq!(on_disk.last_date(), Some(d("2025-01-13")));
    let marker = read_marker(&price_dir).unwrap();
    assert_eq!(marker.window_end, Some(d("2025-01-15")));
    assert_eq!(marker.source, "mock");
}

#[test]
fn cache_location_ignores_as_of() {
    let h = Harness::new("location");
    let entity = equity();
    let opts = PrepareOptions::default();

    h.assembler.prepare_dataset(&entity, "2023-06-30", &opts).unwrap();
    h.assembler.prepare_dataset(&entity, "2024-06-30", &opts).unwrap();

    assert_eq!(h.calls(CacheKind::PriceSeries), 1);
    let dir = h.path(&entity, CacheKind::PriceSeries);
    assert!(dir.ends_with("浦发银行_600000.SH/prices"));
}

#[test]
fn disclosures_respect_consumption_window() {
    let h = Harness::new("disclosure_window");
    let entity = equity();
    let opts = PrepareOptions {
        include_disclosures: true,
        ..Default::default()
    };

    let ds = h.assembler.prepare_dataset(&entity, "2024-06-30", &opts).unwrap();
    let dates: Vec<_> = ds.disclosures.tables[0].rows.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![d("2022-07-15"), d("2023-03-01"), d("2024-06-29")]);
    assert_eq!(ds.disclosures.window_start, Some(d("2022-07-01")));

    let narrow = PrepareOptions {
        disclosure_window_days: Some(30),
        ..opts
    };
    let ds = h.assembler.prepare_dataset(&entity, "2024-06-30", &narrow).unwrap();
    assert_eq!(ds.disclosures.row_count(), 1);
    assert_eq!(h.calls(CacheKind::Disclosures), 1);
}

#[test]
fn as_of_before_all_history_yields_empty_bundles() {
    let h = Harness::new("before_history");
    let ds = h
        .assembler
        .prepare_dataset(&equity(), "2019-01-01", &PrepareOptions::default())
        .unwrap();
    assert!(ds.prices.is_empty());
    assert!(ds.financials.is_empty());
    assert!(ds.share_capital.is_empty());
    assert_eq!(ds.max_date(), None);
}

fn shared() -> &'static Harness {
    static HARNESS: OnceLock<Harness> = OnceLock::new();
    HARNESS.get_or_init(|| Harness::new("causality_prop"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn no_row_is_later_than_as_of(offset in 0i64..770, disclosures in any::<bool>()) {
        let h = shared();
        let as_of = d("2022-12-01") + Duration::days(offset);
        let opts = PrepareOptions {
            include_disclosures: disclosures,
            ..Default::default()
        };

        let ds = h.assembler.prepare_dataset_on(&equity(), as_of, &opts).unwrap();

        for bundle in ds.bundles() {
            for table in &bundle.tables {
                for row in &table.rows {
                    prop_assert!(row.date <= as_of, "{} row {} after {}", table.name, row.date, as_of);
                    if let Some(start) = bundle.window_start {
                        prop_assert!(row.date >= start);
                    }
                }
            }
        }
        // One cache serves every replay date.
        prop_assert_eq!(h.calls(CacheKind::PriceSeries), 1);
        prop_assert_eq!(h.calls(CacheKind::Financials), 1);
    }
}
