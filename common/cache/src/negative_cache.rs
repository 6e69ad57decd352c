//! Negative caching so that keys the source confirmed missing stop reaching it
//!
//! Markers live in the [`Store`] under `null:<key>` with their own TTL, so
//! every process sharing the store sees them and an invalidation anywhere
//! clears them everywhere.
//!
//! An optional in-process tier (Moka, bounded LRU) remembers when each marker
//! set by this process expires, skipping the store round-trip on repeated
//! checks. It is off by default: a marker cleared by another process stays
//! visible here until its deadline.

use common_store::{Store, StoreError};
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::keys::null_key;

const NULL_MARKER: &[u8] = b"1";

#[derive(Clone)]
pub struct NegativeCache {
    store: Arc<dyn Store>,
    local: Option<Cache<String, Instant>>,
}

impl NegativeCache {
    /// Store-backed negative cache without an in-process tier
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, local: None }
    }

    /// Store-backed negative cache that also remembers up to `max_capacity`
    /// marker deadlines in memory
    ///
    /// # Example
    /// ```rust
    /// use common_cache::NegativeCache;
    /// use common_store::MemoryStore;
    /// use std::sync::Arc;
    ///
    /// let cache = NegativeCache::with_local_tier(Arc::new(MemoryStore::new()), 1000);
    /// ```
    pub fn with_local_tier(store: Arc<dyn Store>, max_capacity: u64) -> Self {
        let local = Cache::builder().max_capacity(max_capacity).build();
        Self {
            store,
            local: Some(local),
        }
    }

    /// Record that `key` does not exist for the next `null_ttl`.
    pub async fn mark_absent(&self, key: &str, null_ttl: Duration) -> Result<(), StoreError> {
        // taken before the write so the local deadline never outlives the store's
        let deadline = Instant::now() + null_ttl;
        self.store
            .set(&null_key(key), NULL_MARKER, Some(null_ttl))
            .await?;

        if let Some(local) = &self.local {
            local.insert(key.to_string(), deadline);
        }
        Ok(())
    }

    /// Whether a live marker exists for `key`.
    pub async fn is_marked_absent(&self, key: &str) -> Result<bool, StoreError> {
        if let Some(local) = &self.local {
            match local.get(key) {
                Some(deadline) if Instant::now() < deadline => return Ok(true),
                Some(_) => local.invalidate(key),
                None => {}
            }
        }

        self.store.exists(&null_key(key)).await
    }

    /// Remove the marker for `key`. Returns whether the store held one.
    pub async fn clear(&self, key: &str) -> Result<bool, StoreError> {
        if let Some(local) = &self.local {
            local.invalidate(key);
        }
        self.store.delete(&null_key(key)).await
    }

    pub fn has_local_tier(&self) -> bool {
        self.local.is_some()
    }
}
