//! Domain types: entities, cache kinds, dated rows, fetched histories.

pub mod entity;
pub mod history;
pub mod kind;
pub mod row;

pub use entity::{sanitize_name, EntityClass, EntityId, Market};
pub use history::{days_before, AcquisitionWindow, Lookback, RawHistory, MAX_SPAN_DAYS};
pub use kind::CacheKind;
pub use row::{format_date, parse_effective_date, Record, Row, Table};
