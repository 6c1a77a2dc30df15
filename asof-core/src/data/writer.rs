//! Persists fetched histories and records refreshes.
//!
//! A refresh is two steps: every artifact is replaced atomically, then the
//! refresh marker is written. A refresh that dies between the two leaves
//! new artifacts under an old (or no) marker; the checksum mismatch makes
//! the next inspection report the directory as corrupt and refresh it.

use super::marker::{artifact_checksum, marker_path, RefreshMarker, MARKER_VERSION};
use super::store::{atomic_write, write_table};
use crate::clock::Clock;
use crate::domain::{RawHistory, Table};
use crate::error::StoreError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct CacheWriter {
    clock: Arc<dyn Clock>,
}

impl CacheWriter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Replace one artifact. Rows are written sorted by date.
    pub fn write(&self, dir: &Path, table: &Table) -> Result<PathBuf, StoreError> {
        let path = dir.join(&table.name);
        if table.rows.windows(2).all(|w| w[0].date <= w[1].date) {
            write_table(&path, table)?;
        } else {
            let mut sorted = table.clone();
            sorted.normalize();
            write_table(&path, &sorted)?;
        }
        Ok(path)
    }

    /// Replace every artifact in `history`, then delete any artifact in
    /// `stale_optional` the history no longer carries.
    pub fn write_history(
        &self,
        dir: &Path,
        history: &RawHistory,
        stale_optional: &[String],
    ) -> Result<Vec<PathBuf>, StoreError> {
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        let mut written = Vec::with_capacity(history.tables.len());
        for table in &history.tables {
            written.push(self.write(dir, table)?);
        }
        for name in stale_optional {
            if history.table(name).is_some() {
                continue;
            }
            let path = dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed artifact absent from refresh"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        Ok(written)
    }

    /// Stamp `dir` as refreshed now, checksumming the artifacts in `history`.
    pub fn record_refresh(&self, dir: &Path, history: &RawHistory) -> Result<RefreshMarker, StoreError> {
        let artifacts: Vec<String> = history.tables.iter().map(|t| t.name.clone()).collect();
        let marker = RefreshMarker {
            version: MARKER_VERSION,
            refreshed_at: self.clock.now(),
            checksum: artifact_checksum(dir, &artifacts)?,
            artifacts,
            source: history.source.clone(),
            window_start: Some(history.window.start()),
            window_end: Some(history.window.end()),
            rows: history.row_count(),
        };

        let path = marker_path(dir);
        let json = serde_json::to_vec_pretty(&marker).map_err(|e| StoreError::Marker {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        atomic_write(&path, |out| out.write_all(&json).map_err(|e| StoreError::io(&path, e)))?;

        tracing::info!(
            path = %dir.display(),
            entity = %history.entity,
            kind = %history.kind,
            rows = marker.rows,
            source = %marker.source,
            "cache refreshed"
        );
        Ok(marker)
    }
}
