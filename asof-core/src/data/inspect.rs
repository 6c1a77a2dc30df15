//! Cache inspection and the refresh decision.

use super::marker::{artifact_checksum, read_marker};
use super::registry::CacheSpec;
use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Observed state of one cache directory at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheState {
    pub path: PathBuf,
    pub exists: bool,
    /// Required artifacts not present on disk.
    pub missing: BTreeSet<String>,
    pub last_refresh: Option<DateTime<Utc>>,
    /// Seconds since `last_refresh`.
    pub age_secs: Option<i64>,
    /// True unless every required artifact is present and the last refresh
    /// is no older than the TTL.
    pub stale: bool,
    /// Artifacts no longer match the checksum recorded at refresh.
    pub corrupt: bool,
    pub source: Option<String>,
}

impl CacheState {
    /// A complete copy is on disk, regardless of age.
    pub fn is_complete(&self) -> bool {
        self.exists && self.missing.is_empty() && !self.corrupt && self.last_refresh.is_some()
    }

    /// Complete and within TTL.
    pub fn is_valid(&self) -> bool {
        self.is_complete() && !self.stale
    }
}

/// Reports cache state against a spec and a clock.
#[derive(Clone)]
pub struct CacheInspector {
    clock: Arc<dyn Clock>,
}

impl CacheInspector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Inspect `path` under `spec`. Never fails: unreadable pieces show up as
    /// missing, absent, or corrupt.
    pub fn inspect(&self, path: &Path, spec: &CacheSpec) -> CacheState {
        let exists = path.is_dir();
        let missing: BTreeSet<String> = spec
            .required_files
            .iter()
            .filter(|name| !exists || !path.join(name.as_str()).is_file())
            .cloned()
            .collect();

        let marker = if exists { read_marker(path) } else { None };
        let now = self.clock.now();

        let last_refresh = marker.as_ref().map(|m| m.refreshed_at);
        let age = last_refresh.map(|t| now - t);
        let expired = match age {
            Some(age) => age > spec.ttl(),
            None => true,
        };
        let stale = !missing.is_empty() || expired;

        let corrupt = match &marker {
            Some(m) if missing.is_empty() => match artifact_checksum(path, &m.artifacts) {
                Ok(sum) => sum != m.checksum,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "checksum unreadable");
                    true
                }
            },
            _ => false,
        };

        if corrupt {
            tracing::warn!(
                path = %path.display(),
                kind = %spec.kind,
                "cache artifacts do not match refresh checksum"
            );
        }

        CacheState {
            path: path.to_path_buf(),
            exists,
            missing,
            last_refresh,
            age_secs: age.map(|a| a.num_seconds()),
            stale,
            corrupt,
            source: marker.map(|m| m.source),
        }
    }
}

/// Refresh if forced, absent, incomplete, stale, or corrupt.
pub fn should_refresh(state: &CacheState, force: bool) -> bool {
    force || !state.exists || !state.missing.is_empty() || state.stale || state.corrupt
}
