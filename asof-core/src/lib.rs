//! asof-core: data layer for as-of market data access.
//!
//! This crate holds everything below dataset assembly:
//! - Entity identity (`CODE.SUFFIX` parsing, asset class, storage naming)
//! - Cache kinds and the policy registry (paths, TTLs, required artifacts)
//! - Cache inspection and the refresh decision
//! - Atomic CSV storage with refresh markers and quarantine
//! - Providers (HTTP/JSON, CSV import) behind rate limiting, retry, and a
//!   circuit breaker
//! - Source fetchers that acquire full history anchored at today
//!
//! Nothing in this crate takes an as-of date. Causal truncation happens
//! one layer up, in `asof-access`.

pub mod clock;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod logging;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ConfigError, EntityError, FetchError, ProviderError, StoreError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: shared types are Send + Sync so the batch
    /// runner can hand them to worker threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::EntityId>();
        require_sync::<domain::EntityId>();
        require_send::<domain::RawHistory>();
        require_sync::<domain::RawHistory>();
        require_send::<data::CacheRegistry>();
        require_sync::<data::CacheRegistry>();
        require_send::<data::CacheInspector>();
        require_sync::<data::CacheInspector>();
        require_send::<data::CacheWriter>();
        require_sync::<data::CacheWriter>();
        require_send::<data::FetcherSet>();
        require_sync::<data::FetcherSet>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<data::RateLimiter>();
        require_sync::<data::RateLimiter>();
        require_send::<FetchError>();
        require_sync::<FetchError>();
    }

    /// Architecture contract: fetchers take no as-of date.
    #[test]
    fn source_fetcher_has_no_as_of_parameter() {
        fn _check_trait_object_builds(
            fetcher: &dyn data::SourceFetcher,
            entity: &domain::EntityId,
        ) -> Result<domain::RawHistory, FetchError> {
            fetcher.fetch_full_history(entity)
        }
    }
}
