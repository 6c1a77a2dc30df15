//! Causal truncation.
//!
//! The only place rows are filtered by as-of date. Everything returned to a
//! caller passes through [`truncate_table`].

use asof_core::domain::{days_before, Table};
use chrono::NaiveDate;

/// Lower bound of a trailing consumption window ending at `as_of`.
pub fn consumption_start(as_of: NaiveDate, window_days: Option<u32>) -> Option<NaiveDate> {
    window_days.map(|days| days_before(as_of, days))
}

/// Rows with `window_start <= date <= as_of`. Input order is preserved.
pub fn truncate_table(table: &Table, as_of: NaiveDate, window_start: Option<NaiveDate>) -> Table {
    let rows = table
        .rows
        .iter()
        .filter(|r| r.date <= as_of && window_start.map_or(true, |start| r.date >= start))
        .cloned()
        .collect();
    Table::new(table.name.clone(), rows)
}

/// Truncate every table of one kind.
pub fn truncate_tables(tables: &[Table], as_of: NaiveDate, window_start: Option<NaiveDate>) -> Vec<Table> {
    let out: Vec<Table> = tables
        .iter()
        .map(|t| truncate_table(t, as_of, window_start))
        .collect();
    debug_assert!(out.iter().flat_map(|t| &t.rows).all(|r| r.date <= as_of));
    out
}
