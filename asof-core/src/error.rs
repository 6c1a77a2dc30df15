//! Structured error types for the data layer.
//!
//! Every error that crosses a public boundary names the entity, the cache
//! kind, or the storage path it concerns, so the caller can tell which
//! artifact needs attention without digging through logs.

use crate::domain::CacheKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning a user-supplied symbol into an [`EntityId`](crate::domain::EntityId).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("empty symbol")]
    Empty,

    #[error("symbol '{input}' has no market suffix (expected CODE.SUFFIX, e.g. 600000.SH)")]
    MissingSuffix { input: String },

    #[error("symbol '{input}' has unsupported market suffix '{suffix}' (expected SH, SZ, HK, US or IDX)")]
    UnsupportedSuffix { input: String, suffix: String },

    #[error("symbol '{input}' has an invalid code")]
    InvalidCode { input: String },

    #[error("unknown entity class '{0}' (expected equity, index or etf)")]
    UnknownClass(String),
}

/// Registry and configuration errors. These are programming or deployment
/// mistakes and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cache kind '{0}' is not registered")]
    UnknownKind(CacheKind),

    #[error("unknown cache kind name '{0}'")]
    UnknownKindName(String),

    #[error("cache kind '{kind}' is already registered with a different policy")]
    Conflict { kind: CacheKind },

    #[error("spec registered under '{registered}' describes kind '{described}'")]
    KindMismatch {
        registered: CacheKind,
        described: CacheKind,
    },

    #[error("cache kind '{kind}' is per-entity; an entity is required to resolve its path")]
    EntityRequired { kind: CacheKind },

    #[error("invalid path template '{template}' for '{kind}': {reason}")]
    InvalidTemplate {
        kind: CacheKind,
        template: String,
        reason: String,
    },

    #[error("{field} = {value} for '{kind}' is out of range (max {max})")]
    OutOfRange {
        kind: CacheKind,
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("fallback providers are only supported for price series, not '{kind}'")]
    FallbackNotAllowed { kind: CacheKind },

    #[error("no fetcher configured for cache kind '{kind}'")]
    NoFetcher { kind: CacheKind },

    #[error("invalid policy override for '{kind}': {reason}")]
    InvalidOverride { kind: String, reason: String },

    #[error("failed to read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// A single provider call failed.
///
/// Displayable in CLI contexts; `is_transient` drives the retry decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider server error (HTTP {status})")]
    ServerError { status: u16 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("no data for {symbol} in dataset '{dataset}'")]
    EntityNotFound { symbol: String, dataset: String },

    #[error("provider has blocked requests (circuit breaker open)")]
    CircuitBreakerTripped,

    #[error("not applicable: {0}")]
    Unsupported(String),

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::NetworkUnreachable(_)
                | ProviderError::Timeout(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::ServerError { .. }
        )
    }
}

/// A source fetcher exhausted its retries (and fallbacks) for one kind.
#[derive(Debug, Clone, Error)]
#[error("fetch of '{kind}' for {entity} failed via {provider} after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub entity: String,
    pub kind: CacheKind,
    pub provider: String,
    pub attempts: u32,
    #[source]
    pub source: ProviderError,
}

/// Local storage failures: I/O, CSV decoding, marker serialization.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} has no leading 'date' column")]
    MissingDateColumn { path: PathBuf },

    #[error("{path} line {line}: unparseable date '{value}'")]
    BadDate {
        path: PathBuf,
        line: u64,
        value: String,
    },

    #[error("refresh marker at {path}: {reason}")]
    Marker { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the artifact on disk is unreadable as data (as opposed to the
    /// filesystem failing underneath us). Corrupt artifacts get quarantined.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::Csv { .. } | StoreError::MissingDateColumn { .. } | StoreError::BadDate { .. }
        )
    }
}
