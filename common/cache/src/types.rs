//! Per-call options and cache operation results
//!
//! - [`GetOptions`]: per-call overrides for [`crate::ProtectedCache::get_or_fetch`]
//! - [`CacheSource`]: which path produced a result (for observability)
//! - [`CacheResult`]: wrapper containing a value and its source

use std::fmt;
use std::time::Duration;

/// Per-call overrides. Anything left as `None` falls back to the cache's
/// [`crate::ProtectedCacheConfig`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Reject keys the membership filter has never seen, without touching
    /// the store or the fetcher.
    pub use_membership_filter: Option<bool>,
    /// Nominal TTL for a freshly fetched value, before jitter.
    pub ttl: Option<Duration>,
    /// Nominal TTL for a negative marker, before jitter.
    pub null_ttl: Option<Duration>,
}

impl GetOptions {
    pub fn with_membership_filter(mut self) -> Self {
        self.use_membership_filter = Some(true);
        self
    }

    pub fn without_membership_filter(mut self) -> Self {
        self.use_membership_filter = Some(false);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn null_ttl(mut self, null_ttl: Duration) -> Self {
        self.null_ttl = Some(null_ttl);
        self
    }
}

/// Where a result came from and what the cache had to do to produce it
///
/// Implements `Display` with snake_case names for log fields and metric labels:
/// ```
/// # use common_cache::CacheSource;
/// assert_eq!(CacheSource::PositiveCache.to_string(), "positive_cache");
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    // Value found cases
    /// Value was already in the store
    PositiveCache,
    /// Value appeared in the store while this caller waited on the key lock
    PositiveCacheAfterWait,
    /// Store miss, value loaded from the fetcher and cached
    LoaderCacheMiss,
    /// Store could not be read, value loaded from the fetcher
    LoaderStoreUnavailable,

    // Value not found cases
    /// Membership filter has never seen the key
    FilterRejected,
    /// Key carries a live negative marker
    NegativeCache,
    /// Fetcher confirmed the key does not exist, marker written
    LoaderNotFound,
    /// Store could not be read, fetcher confirmed the key does not exist
    LoaderNotFoundStoreUnavailable,
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheSource::PositiveCache => "positive_cache",
            CacheSource::PositiveCacheAfterWait => "positive_cache_after_wait",
            CacheSource::LoaderCacheMiss => "loader_cache_miss",
            CacheSource::LoaderStoreUnavailable => "loader_store_unavailable",
            CacheSource::FilterRejected => "filter_rejected",
            CacheSource::NegativeCache => "negative_cache",
            CacheSource::LoaderNotFound => "loader_not_found",
            CacheSource::LoaderNotFoundStoreUnavailable => "loader_not_found_store_unavailable",
        };
        f.write_str(name)
    }
}

/// Result of a cache operation with detailed source information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResult<V> {
    /// The value, if found. None indicates the item doesn't exist (negative result)
    pub value: Option<V>,

    /// Where the result came from
    pub source: CacheSource,
}

impl<V> CacheResult<V> {
    pub fn found(value: V, source: CacheSource) -> Self {
        Self {
            value: Some(value),
            source,
        }
    }

    pub fn not_found(source: CacheSource) -> Self {
        Self {
            value: None,
            source,
        }
    }

    /// Answered without calling the fetcher
    pub fn was_cached(&self) -> bool {
        !self.invoked_loader()
    }

    pub fn invoked_loader(&self) -> bool {
        matches!(
            self.source,
            CacheSource::LoaderCacheMiss
                | CacheSource::LoaderStoreUnavailable
                | CacheSource::LoaderNotFound
                | CacheSource::LoaderNotFoundStoreUnavailable
        )
    }

    /// The store misbehaved while serving this result
    pub fn had_cache_problem(&self) -> bool {
        matches!(
            self.source,
            CacheSource::LoaderStoreUnavailable | CacheSource::LoaderNotFoundStoreUnavailable
        )
    }
}
