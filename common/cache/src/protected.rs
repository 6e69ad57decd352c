//! Read-through cache hardened against penetration, breakdown and avalanche
//!
//! This module provides [`ProtectedCache`], which puts three defenses in front
//! of a caller-supplied [`Fetcher`]:
//! - a membership filter that rejects keys never seen before (penetration)
//! - store-backed negative markers for keys the source confirmed missing (penetration)
//! - per-key single-flight so a cold hot key is fetched once (breakdown)
//!
//! Every TTL written is jittered so entries warmed together do not expire
//! together (avalanche).

use common_store::Store;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{CacheCorruptionError, CacheError};
use crate::fetch::Fetcher;
use crate::keys::validate_key;
use crate::locks::KeyLockRegistry;
use crate::membership::MembershipFilter;
use crate::metrics_consts::{
    FETCH_COUNTER, FETCH_DURATION_HISTOGRAM, REQUESTS_COUNTER, STORE_ERRORS_COUNTER,
};
use crate::negative_cache::NegativeCache;
use crate::{CacheResult, CacheSource, GetOptions, ProtectedCacheConfig};

enum Lookup {
    Hit(Vec<u8>),
    Miss,
    Unavailable,
}

/// A read-through cache over a [`Store`].
///
/// `get_or_fetch` walks these steps:
/// 1. If the filter is enabled for the call and has never seen the key, return absent
/// 2. Return the stored value, if any
/// 3. Return absent if the key carries a negative marker
/// 4. Take the key's lock
/// 5. Re-check the stored value and the marker, another flight may have filled them
/// 6. Call the fetcher, then cache the value (or a marker) and release the lock
///
/// Store read failures are treated as misses (fail-open) and store write
/// failures are logged and swallowed. Fetcher errors are returned unchanged
/// and never cached.
///
/// # Example
/// ```rust
/// use common_cache::{
///     BloomMembershipFilter, CacheSource, FetchFn, GetOptions, ProtectedCache,
///     ProtectedCacheConfig,
/// };
/// use common_store::MemoryStore;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let cache = ProtectedCache::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(BloomMembershipFilter::default()),
///     ProtectedCacheConfig::with_ttl(300, 30),
/// );
///
/// let fetcher = FetchFn::new(|key: String| async move {
///     Ok::<_, std::io::Error>(Some(format!("value for {key}").into_bytes()))
/// });
///
/// let result = cache
///     .get_or_fetch("user:42", &fetcher, GetOptions::default())
///     .await
///     .unwrap();
/// assert_eq!(result.source, CacheSource::LoaderCacheMiss);
/// # }
/// ```
pub struct ProtectedCache {
    store: Arc<dyn Store>,
    filter: Arc<dyn MembershipFilter>,
    negative_cache: NegativeCache,
    locks: KeyLockRegistry,
    config: ProtectedCacheConfig,
}

impl ProtectedCache {
    /// Create a new protected cache instance
    ///
    /// # Arguments
    /// * `store` - Backing store for values and negative markers
    /// * `filter` - Membership filter, may be shared with other instances
    /// * `config` - TTLs, jitter and defaults for per-call options
    pub fn new(
        store: Arc<dyn Store>,
        filter: Arc<dyn MembershipFilter>,
        config: ProtectedCacheConfig,
    ) -> Self {
        let negative_cache = match config.negative_cache_local_capacity {
            Some(capacity) => NegativeCache::with_local_tier(store.clone(), capacity),
            None => NegativeCache::new(store.clone()),
        };

        Self {
            store,
            filter,
            negative_cache,
            locks: KeyLockRegistry::new(config.lock_sweep_threshold),
            config,
        }
    }

    /// Get a value from the cache or load it through `fetcher`
    ///
    /// # Arguments
    /// * `key` - Cache key; empty keys and keys starting with `null:` are rejected
    /// * `fetcher` - Called at most once per key at a time, and only on a full miss
    /// * `opts` - Per-call overrides of the instance config
    ///
    /// # Returns
    /// * `Ok(CacheResult)` - The value (or `None` if it does not exist) and where it came from
    /// * `Err(CacheError::Fetch)` - The fetcher failed; nothing was cached
    /// * `Err(CacheError::Corrupted)` - The stored value could not be decoded
    /// * `Err(CacheError::InvalidKey)` - The key is empty or reserved
    pub async fn get_or_fetch<F>(
        &self,
        key: &str,
        fetcher: &F,
        opts: GetOptions,
    ) -> Result<CacheResult<Vec<u8>>, CacheError<F::Error>>
    where
        F: Fetcher + ?Sized,
    {
        validate_key(key).map_err(CacheError::InvalidKey)?;

        let result = self.resolve(key, fetcher, &opts).await;
        if let Ok(result) = &result {
            metrics::counter!(REQUESTS_COUNTER, "source" => result.source.to_string())
                .increment(1);
        }
        result
    }

    async fn resolve<F>(
        &self,
        key: &str,
        fetcher: &F,
        opts: &GetOptions,
    ) -> Result<CacheResult<Vec<u8>>, CacheError<F::Error>>
    where
        F: Fetcher + ?Sized,
    {
        let use_filter = opts
            .use_membership_filter
            .unwrap_or(self.config.use_membership_filter);
        if use_filter && !self.filter.might_contain(key) {
            debug!(key = %key, "membership filter rejected key");
            return Ok(CacheResult::not_found(CacheSource::FilterRejected));
        }

        let mut store_unavailable = false;
        match self.lookup(key).await? {
            Lookup::Hit(value) => {
                debug!(key = %key, "positive cache hit");
                return Ok(CacheResult::found(value, CacheSource::PositiveCache));
            }
            Lookup::Unavailable => store_unavailable = true,
            Lookup::Miss => {}
        }

        if self.is_marked_absent(key).await {
            debug!(key = %key, "negative cache hit");
            return Ok(CacheResult::not_found(CacheSource::NegativeCache));
        }

        let lock = self.locks.acquire(key).await;

        match self.lookup(key).await? {
            Lookup::Hit(value) => {
                debug!(key = %key, "value filled by another caller while waiting");
                return Ok(CacheResult::found(value, CacheSource::PositiveCacheAfterWait));
            }
            Lookup::Unavailable => store_unavailable = true,
            Lookup::Miss => {}
        }
        if self.is_marked_absent(key).await {
            debug!(key = %key, "negative marker set by another caller while waiting");
            return Ok(CacheResult::not_found(CacheSource::NegativeCache));
        }

        let started = Instant::now();
        let fetched = fetcher.fetch(key).await;
        metrics::histogram!(FETCH_DURATION_HISTOGRAM)
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let result = match fetched {
            Err(e) => {
                metrics::counter!(FETCH_COUNTER, "outcome" => "error").increment(1);
                debug!(key = %key, "fetch failed, nothing cached");
                return Err(CacheError::Fetch(e));
            }
            Ok(Some(value)) => {
                metrics::counter!(FETCH_COUNTER, "outcome" => "found").increment(1);
                let ttl = opts.ttl.unwrap_or(self.config.ttl);
                self.write_value(key, &value, ttl).await;
                self.filter.add(key);

                let source = if store_unavailable {
                    CacheSource::LoaderStoreUnavailable
                } else {
                    CacheSource::LoaderCacheMiss
                };
                CacheResult::found(value, source)
            }
            Ok(None) => {
                metrics::counter!(FETCH_COUNTER, "outcome" => "not_found").increment(1);
                let null_ttl = opts.null_ttl.unwrap_or(self.config.null_ttl);
                self.write_marker(key, null_ttl).await;

                let source = if store_unavailable {
                    CacheSource::LoaderNotFoundStoreUnavailable
                } else {
                    CacheSource::LoaderNotFound
                };
                CacheResult::not_found(source)
            }
        };

        self.locks.release(lock);
        Ok(result)
    }

    /// Write a value through the cache: store it, record it in the membership
    /// filter and drop any negative marker for the key.
    ///
    /// `ttl` defaults to the configured value TTL and is jittered either way.
    pub async fn put(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError<Infallible>> {
        validate_key(key).map_err(CacheError::InvalidKey)?;

        let ttl = self.config.jittered(ttl.unwrap_or(self.config.ttl));
        self.store.set(key, value, Some(ttl)).await?;
        self.filter.add(key);
        self.negative_cache.clear(key).await?;
        Ok(())
    }

    /// Remove the value and the negative marker for `key`.
    ///
    /// Both deletes are always attempted; the first failure is returned.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError<Infallible>> {
        validate_key(key).map_err(CacheError::InvalidKey)?;

        let value = self.store.delete(key).await;
        let marker = self.negative_cache.clear(key).await;

        if let Err(e) = &value {
            warn!(key = %key, error = %e, "failed to delete cached value");
        }
        if let Err(e) = &marker {
            warn!(key = %key, error = %e, "failed to delete negative marker");
        }
        debug!(key = %key, "invalidated");
        value.and(marker)?;
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn filter(&self) -> &Arc<dyn MembershipFilter> {
        &self.filter
    }

    pub fn negative_cache(&self) -> &NegativeCache {
        &self.negative_cache
    }

    pub fn locks(&self) -> &KeyLockRegistry {
        &self.locks
    }

    pub fn config(&self) -> &ProtectedCacheConfig {
        &self.config
    }

    async fn lookup(&self, key: &str) -> Result<Lookup, CacheCorruptionError> {
        match self.store.get(key).await {
            Ok(Some(value)) => Ok(Lookup::Hit(value)),
            Ok(None) => Ok(Lookup::Miss),
            Err(e) => match CacheCorruptionError::from_store_error(&e) {
                Some(corruption) => {
                    warn!(key = %key, error = %e, "cached value is corrupted");
                    Err(corruption)
                }
                None => {
                    record_store_error("get");
                    warn!(key = %key, error = %e, "store read failed, treating as a miss");
                    Ok(Lookup::Unavailable)
                }
            },
        }
    }

    async fn is_marked_absent(&self, key: &str) -> bool {
        match self.negative_cache.is_marked_absent(key).await {
            Ok(marked) => marked,
            Err(e) => {
                record_store_error("exists");
                warn!(key = %key, error = %e, "negative marker check failed, treating as unmarked");
                false
            }
        }
    }

    async fn write_value(&self, key: &str, value: &[u8], ttl: Duration) {
        let ttl = self.config.jittered(ttl);
        if let Err(e) = self.store.set(key, value, Some(ttl)).await {
            record_store_error("set");
            warn!(key = %key, error = %e, "failed to cache fetched value");
        }
    }

    async fn write_marker(&self, key: &str, null_ttl: Duration) {
        let null_ttl = self.config.jittered(null_ttl);
        if let Err(e) = self.negative_cache.mark_absent(key, null_ttl).await {
            record_store_error("set_null");
            warn!(key = %key, error = %e, "failed to write negative marker");
        }
    }
}

fn record_store_error(op: &'static str) {
    metrics::counter!(STORE_ERRORS_COUNTER, "op" => op).increment(1);
}
