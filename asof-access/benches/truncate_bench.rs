//! Criterion benchmarks for the read path.
//!
//! 1. As-of truncation of a long price table
//! 2. Windowed truncation of an announcement list
//! 3. Point-in-time lookup of the latest row

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use asof_access::truncate::{consumption_start, truncate_table, truncate_tables};
use asof_core::domain::{Record, Row, Table};
use chrono::{Duration, NaiveDate};

fn make_table(name: &str, n: usize) -> Table {
    let base = NaiveDate::from_ymd_opt(2010, 1, 4).unwrap();
    let rows = (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let fields = Record::from([
                ("close".to_string(), format!("{close:.2}")),
                ("volume".to_string(), (1_000_000 + i % 500_000).to_string()),
            ]);
            Row::new(base + Duration::days(i as i64), fields)
        })
        .collect();
    Table::new(name, rows)
}

fn bench_truncate(c: &mut Criterion) {
    let mut group = c.benchmark_group("truncate_as_of");
    for row_count in [1_260usize, 5_000] {
        let table = make_table("price.csv", row_count);
        let as_of = table.rows[row_count * 3 / 4].date;
        group.bench_with_input(BenchmarkId::new("price", row_count), &table, |b, table| {
            b.iter(|| black_box(truncate_table(black_box(table), as_of, None)))
        });
    }

    let statements: Vec<Table> = ["profit_sheet.csv", "balance_sheet.csv", "cash_flow_sheet.csv"]
        .iter()
        .map(|name| make_table(name, 400))
        .collect();
    let as_of = statements[0].rows[300].date;
    group.bench_function("financials_3x400", |b| {
        b.iter(|| black_box(truncate_tables(black_box(&statements), as_of, None)))
    });
    group.finish();
}

fn bench_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("truncate_window");
    let table = make_table("disclosure_list.csv", 5_000);
    let as_of = table.rows[4_000].date;
    let start = consumption_start(as_of, Some(730));
    group.bench_function("disclosures_730d", |b| {
        b.iter(|| black_box(truncate_table(black_box(&table), as_of, start)))
    });
    group.finish();
}

fn bench_latest(c: &mut Criterion) {
    let table = make_table("share_change.csv", 5_000);
    let as_of = table.rows[2_500].date;
    c.bench_function("latest_on_or_before_5000", |b| {
        b.iter(|| black_box(table.latest_on_or_before(black_box(as_of))))
    });
}

criterion_group!(benches, bench_truncate, bench_window, bench_latest);
criterion_main!(benches);
