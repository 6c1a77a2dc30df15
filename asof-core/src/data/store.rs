//! CSV artifact storage.
//!
//! Layout inside a cache directory: one `{artifact}` CSV per table with a
//! leading `date` column followed by the sorted union of field names.
//! A provider field that is itself called `date`, or that starts with
//! `~`, is stored under a `~` prefix so it survives the round trip.
//!
//! Features:
//! - Atomic writes (write to a hidden temp file, fsync, rename into place)
//! - Temp files are removed if the write fails or unwinds
//! - Quarantine for corrupt artifacts (`{artifact}.quarantined`)

use crate::domain::{format_date, parse_effective_date, Record, Row, Table};
use crate::error::StoreError;
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const DATE_COLUMN: &str = "date";
pub const QUARANTINE_SUFFIX: &str = "quarantined";
const ESCAPE: char = '~';

fn encode_column(field: &str) -> String {
    if field == DATE_COLUMN || field.starts_with(ESCAPE) {
        format!("{ESCAPE}{field}")
    } else {
        field.to_string()
    }
}

fn decode_column(header: &str) -> &str {
    header.strip_prefix(ESCAPE).unwrap_or(header)
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temp file that is deleted on drop unless committed.
struct TempFile {
    path: PathBuf,
    committed: bool,
}

impl TempFile {
    fn beside(target: &Path) -> Self {
        let id = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = target.with_file_name(format!(".{name}.{}.{id}.tmp", std::process::id()));
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self, target: &Path) -> Result<(), StoreError> {
        fs::rename(&self.path, target).map_err(|e| StoreError::io(target, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Write `target` atomically: readers see either the old file or the
/// complete new one.
pub fn atomic_write<F>(target: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut BufWriter<fs::File>) -> Result<(), StoreError>,
{
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp = TempFile::beside(target);
    let file = fs::File::create(&tmp.path).map_err(|e| StoreError::io(&tmp.path, e))?;
    let mut out = BufWriter::new(file);
    write(&mut out)?;
    out.flush().map_err(|e| StoreError::io(&tmp.path, e))?;
    let file = out
        .into_inner()
        .map_err(|e| StoreError::io(&tmp.path, e.into_error()))?;
    file.sync_all().map_err(|e| StoreError::io(&tmp.path, e))?;
    drop(file);
    tmp.commit(target)
}

/// Serialize a table to `path` atomically.
pub fn write_table(path: &Path, table: &Table) -> Result<(), StoreError> {
    let columns: BTreeSet<&str> = table
        .rows
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();

    atomic_write(path, |out| {
        let mut w = csv::Writer::from_writer(out);
        let csv_err = |e: csv::Error| StoreError::Csv {
            path: path.to_path_buf(),
            source: e,
        };

        let header: Vec<String> = std::iter::once(DATE_COLUMN.to_string())
            .chain(columns.iter().map(|c| encode_column(c)))
            .collect();
        w.write_record(&header).map_err(csv_err)?;

        for row in &table.rows {
            let date = format_date(row.date);
            let record = std::iter::once(date.as_str())
                .chain(columns.iter().map(|c| row.get(c).unwrap_or("")));
            w.write_record(record).map_err(csv_err)?;
        }
        w.flush().map_err(|e| StoreError::io(path, e))
    })
}

/// Load a table written by [`write_table`]. Empty cells are omitted from
/// the row's fields.
pub fn read_table(path: &Path, name: &str) -> Result<Table, StoreError> {
    let csv_err = |e: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    if headers.get(0) != Some(DATE_COLUMN) {
        return Err(StoreError::MissingDateColumn {
            path: path.to_path_buf(),
        });
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let raw_date = record.get(0).unwrap_or("");
        let date = parse_effective_date(raw_date).ok_or_else(|| StoreError::BadDate {
            path: path.to_path_buf(),
            line: record.position().map(|p| p.line()).unwrap_or(0),
            value: raw_date.to_string(),
        })?;
        let fields: Record = headers
            .iter()
            .zip(record.iter())
            .skip(1)
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (decode_column(k).to_string(), v.to_string()))
            .collect();
        rows.push(Row::new(date, fields));
    }

    Ok(Table::new(name, rows))
}

/// Move a corrupt artifact aside so the next refresh starts clean.
/// Returns the quarantine path.
pub fn quarantine(path: &Path) -> Result<PathBuf, StoreError> {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(QUARANTINE_SUFFIX);
    let target = PathBuf::from(name);
    fs::rename(path, &target).map_err(|e| StoreError::io(path, e))?;
    tracing::warn!(
        from = %path.display(),
        to = %target.display(),
        "quarantined corrupt cache artifact"
    );
    Ok(target)
}
