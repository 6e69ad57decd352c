//! Insert-only key sets used to reject lookups for keys that were never cached.
//!
//! A [`MembershipFilter`] may answer "maybe" for a key it never saw, but it
//! must never answer "no" for a key it did see. Entries are only removed by
//! resetting the whole filter.

use fxhash::FxHasher64;
use sbbf_rs_safe::Filter;
use std::collections::HashSet;
use std::hash::Hasher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

pub const DEFAULT_EXPECTED_KEYS: usize = 1_000_000;
pub const DEFAULT_BITS_PER_KEY: usize = 16;

pub trait MembershipFilter: Send + Sync {
    fn add(&self, key: &str);

    /// `false` means the key was definitely never added.
    fn might_contain(&self, key: &str) -> bool;

    /// Forget every key.
    fn clear(&self);

    /// Number of distinct keys added since construction or the last clear.
    /// Approximate for probabilistic filters.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = FxHasher64::default();
    hasher.write(key.as_bytes());
    hasher.finish()
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("membership filter lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("membership filter lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Split-block bloom filter over FxHash'd keys.
pub struct BloomMembershipFilter {
    filter: RwLock<Filter>,
    inserted: AtomicUsize,
}

impl Default for BloomMembershipFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXPECTED_KEYS, DEFAULT_BITS_PER_KEY)
    }
}

impl BloomMembershipFilter {
    /// Size the filter for `expected_keys` keys at `bits_per_key` bits each.
    /// More bits per key lowers the false positive rate.
    pub fn new(expected_keys: usize, bits_per_key: usize) -> Self {
        Self {
            filter: RwLock::new(Filter::new(bits_per_key, expected_keys)),
            inserted: AtomicUsize::new(0),
        }
    }

    /// Restore a filter previously exported with [`Self::to_bytes`].
    ///
    /// Returns `None` if the bytes are not a valid filter. The restored
    /// filter reports a `len` of zero since insert counts are not persisted.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let filter = Filter::from_bytes(bytes)?;
        Some(Self {
            filter: RwLock::new(filter),
            inserted: AtomicUsize::new(0),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        read(&self.filter).as_bytes().to_vec()
    }
}

impl MembershipFilter for BloomMembershipFilter {
    fn add(&self, key: &str) {
        let hash = hash_key(key);
        let mut filter = write(&self.filter);
        if !filter.contains_hash(hash) {
            filter.insert_hash(hash);
            self.inserted.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn might_contain(&self, key: &str) -> bool {
        read(&self.filter).contains_hash(hash_key(key))
    }

    fn clear(&self) {
        let mut filter = write(&self.filter);
        // same size, all bits unset
        let empty = vec![0u8; filter.as_bytes().len()];
        if let Some(cleared) = Filter::from_bytes(&empty) {
            *filter = cleared;
        } else {
            *filter = Filter::new(DEFAULT_BITS_PER_KEY, DEFAULT_EXPECTED_KEYS);
        }
        self.inserted.store(0, Ordering::Relaxed);
    }

    fn len(&self) -> usize {
        self.inserted.load(Ordering::Relaxed)
    }
}

/// Exact set of key hashes. Only a 64-bit hash collision can cause a false
/// positive, at the price of memory that grows with every key.
#[derive(Default)]
pub struct HashSetMembershipFilter {
    hashes: RwLock<HashSet<u64>>,
}

impl HashSetMembershipFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MembershipFilter for HashSetMembershipFilter {
    fn add(&self, key: &str) {
        write(&self.hashes).insert(hash_key(key));
    }

    fn might_contain(&self, key: &str) -> bool {
        read(&self.hashes).contains(&hash_key(key))
    }

    fn clear(&self) {
        write(&self.hashes).clear();
    }

    fn len(&self) -> usize {
        read(&self.hashes).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_no_false_negatives(filter: &dyn MembershipFilter) {
        for i in 0..10_000 {
            filter.add(&format!("user:{i}"));
        }
        for i in 0..10_000 {
            assert!(
                filter.might_contain(&format!("user:{i}")),
                "false negative for user:{i}"
            );
        }
    }

    #[test]
    fn test_bloom_no_false_negatives() {
        let filter = BloomMembershipFilter::new(100_000, 16);
        assert_no_false_negatives(&filter);

        let false_positives = (0..10_000)
            .filter(|i| filter.might_contain(&format!("article:{i}")))
            .count();
        assert!(
            false_positives < 100,
            "too many false positives: {false_positives}"
        );
    }

    #[test]
    fn test_hash_set_no_false_negatives() {
        let filter = HashSetMembershipFilter::new();
        assert_no_false_negatives(&filter);
        assert_eq!(filter.len(), 10_000);
        assert!(!filter.might_contain("article:1"));
    }

    #[test]
    fn test_bloom_len_counts_distinct_keys() {
        let filter = BloomMembershipFilter::new(1000, 16);
        assert!(filter.is_empty());
        filter.add("a");
        filter.add("a");
        filter.add("b");
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_clear_resets_both_filters() {
        let bloom = BloomMembershipFilter::new(1000, 16);
        let exact = HashSetMembershipFilter::new();
        let filters: [&dyn MembershipFilter; 2] = [&bloom, &exact];

        for filter in filters {
            filter.add("user:1");
            assert!(filter.might_contain("user:1"));
            filter.clear();
            assert!(!filter.might_contain("user:1"));
            assert!(filter.is_empty());

            filter.add("user:2");
            assert!(filter.might_contain("user:2"));
        }
    }

    #[test]
    fn test_bloom_bytes_roundtrip() {
        let filter = BloomMembershipFilter::new(1000, 16);
        filter.add("user:42");
        filter.add("article:7");

        let restored = BloomMembershipFilter::from_bytes(&filter.to_bytes()).unwrap();
        assert!(restored.might_contain("user:42"));
        assert!(restored.might_contain("article:7"));
        assert_eq!(restored.to_bytes(), filter.to_bytes());
    }
}
