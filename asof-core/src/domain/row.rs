//! Dated rows and tables.
//!
//! Source data is heterogeneous (statement line items, share-change events,
//! announcement lists), so a row is a string record plus the one field the
//! cache layer interprets: its effective date.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name to value, as delivered by the provider.
pub type Record = BTreeMap<String, String>;

/// A record stamped with the date it became known.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Row {
    pub date: NaiveDate,
    pub fields: Record,
}

impl Row {
    pub fn new(date: NaiveDate, fields: Record) -> Self {
        Self { date, fields }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// A named artifact's rows, ascending by date.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    /// Most recent row dated on or before `date`.
    pub fn latest_on_or_before(&self, date: NaiveDate) -> Option<&Row> {
        let idx = self.rows.partition_point(|r| r.date <= date);
        idx.checked_sub(1).map(|i| &self.rows[i])
    }

    /// Sort ascending by date and drop exact duplicates.
    pub fn normalize(&mut self) {
        self.rows.sort();
        self.rows.dedup();
    }
}

/// Parse a date cell in any of the formats providers emit:
/// `YYYY-MM-DD`, `YYYYMMDD`, `YYYY/MM/DD`, `YYYY-MM-DD HH:MM[:SS]`, RFC 3339.
pub fn parse_effective_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y%m%d") {
            return Some(d);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y/%m/%d") {
        return Some(d);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// Canonical on-disk date form.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(date: &str, v: &str) -> Row {
        Row::new(d(date), Record::from([("v".to_string(), v.to_string())]))
    }

    #[test]
    fn parses_provider_date_formats() {
        assert_eq!(parse_effective_date("2024-06-30"), Some(d("2024-06-30")));
        assert_eq!(parse_effective_date("20240630"), Some(d("2024-06-30")));
        assert_eq!(parse_effective_date("2024/06/30"), Some(d("2024-06-30")));
        assert_eq!(parse_effective_date("2024-06-30 15:30"), Some(d("2024-06-30")));
        assert_eq!(parse_effective_date("2024-06-30 15:30:59"), Some(d("2024-06-30")));
        assert_eq!(
            parse_effective_date("2024-06-30T09:00:00+08:00"),
            Some(d("2024-06-30"))
        );
        assert_eq!(parse_effective_date("  "), None);
        assert_eq!(parse_effective_date("not a date"), None);
        assert_eq!(parse_effective_date("20241340"), None);
    }

    #[test]
    fn latest_on_or_before_picks_boundary_row() {
        let t = Table::new(
            "share_change",
            vec![row("2020-01-01", "a"), row("2022-05-10", "b"), row("2024-01-01", "c")],
        );
        assert_eq!(t.latest_on_or_before(d("2022-05-10")).unwrap().get("v"), Some("b"));
        assert_eq!(t.latest_on_or_before(d("2023-12-31")).unwrap().get("v"), Some("b"));
        assert!(t.latest_on_or_before(d("2019-12-31")).is_none());
    }

    #[test]
    fn normalize_sorts_and_dedups() {
        let mut t = Table::new(
            "price",
            vec![row("2024-01-03", "x"), row("2024-01-02", "y"), row("2024-01-03", "x")],
        );
        t.normalize();
        assert_eq!(t.len(), 2);
        assert_eq!(t.first_date(), Some(d("2024-01-02")));
        assert_eq!(t.last_date(), Some(d("2024-01-03")));
    }
}
