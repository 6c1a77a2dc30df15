//! Refresh marker: the JSON sidecar that records when a cache directory was
//! last refreshed, from where, and a checksum over its artifacts.
//!
//! The marker is written last, after every artifact is in place, so a
//! directory whose marker is present was completely written.

use crate::error::StoreError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const MARKER_FILE: &str = ".refresh.json";
pub const MARKER_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshMarker {
    pub version: u32,
    pub refreshed_at: DateTime<Utc>,
    /// Artifacts covered by `checksum`, in hashing order.
    pub artifacts: Vec<String>,
    pub checksum: String,
    pub source: String,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub rows: usize,
}

pub fn marker_path(dir: &Path) -> PathBuf {
    dir.join(MARKER_FILE)
}

/// Read the marker in `dir`. A missing, unparseable, or unknown-version
/// marker reads as `None`, i.e. "never refreshed".
pub fn read_marker(dir: &Path) -> Option<RefreshMarker> {
    let path = marker_path(dir);
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<RefreshMarker>(&content) {
        Ok(marker) if marker.version == MARKER_VERSION => Some(marker),
        Ok(marker) => {
            tracing::debug!(
                path = %path.display(),
                version = marker.version,
                "ignoring refresh marker with unknown version"
            );
            None
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "ignoring unparseable refresh marker");
            None
        }
    }
}

/// BLAKE3 over the named artifacts in order. Each file contributes its name,
/// a NUL separator, its length, and its bytes.
pub fn artifact_checksum(dir: &Path, artifacts: &[String]) -> Result<String, StoreError> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = Vec::new();
    for name in artifacts {
        let path = dir.join(name);
        buf.clear();
        fs::File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut buf))
            .map_err(|e| StoreError::io(&path, e))?;
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(buf.len() as u64).to_le_bytes());
        hasher.update(&buf);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
