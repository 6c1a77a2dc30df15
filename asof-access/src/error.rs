//! Caller-facing error taxonomy for dataset preparation.

use asof_core::domain::CacheKind;
use asof_core::{ConfigError, EntityError, FetchError, StoreError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by dataset preparation.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A refresh was required and the fetcher failed. The inner error is
    /// passed through untouched.
    #[error("{source} (cache at {path})")]
    Fetch {
        path: PathBuf,
        #[source]
        source: FetchError,
    },

    /// No valid cached copy exists and refresh failed or was not allowed.
    #[error("cache integrity: {entity} [{kind}] at {path}: {reason}")]
    CacheIntegrity {
        entity: String,
        kind: CacheKind,
        path: PathBuf,
        reason: String,
    },

    #[error("storage error for {entity} [{kind}]: {source}")]
    Store {
        entity: String,
        kind: CacheKind,
        #[source]
        source: StoreError,
    },

    #[error("worker pool: {0}")]
    WorkerPool(String),
}

impl AccessError {
    /// The fetch failure underneath, if this is one.
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            AccessError::Fetch { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_cache_integrity(&self) -> bool {
        matches!(self, AccessError::CacheIntegrity { .. })
    }
}
