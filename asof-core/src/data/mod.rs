//! Data layer: cache policy registry, inspection, storage, providers, and
//! source fetchers.

pub mod circuit_breaker;
pub mod csv_import;
pub mod fetcher;
pub mod http;
pub mod inspect;
pub mod marker;
pub mod provider;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod store;
pub mod writer;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use csv_import::CsvImportProvider;
pub use fetcher::{normalize_records, standard_artifacts, ArtifactSource, DatasetFetcher, DatasetName, FetcherSet, SourceFetcher};
pub use http::HttpJsonProvider;
pub use inspect::{should_refresh, CacheInspector, CacheState};
pub use marker::{read_marker, RefreshMarker, MARKER_FILE};
pub use provider::{MarketDataProvider, TableRequest};
pub use rate_limit::RateLimiter;
pub use registry::{default_specs, CacheRegistry, CacheRegistryBuilder, CacheSpec, MAX_TTL_SECS};
pub use retry::RetryPolicy;
pub use store::{quarantine, read_table, write_table};
pub use writer::CacheWriter;
