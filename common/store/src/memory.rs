use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::codec::{self, CompressionConfig};
use crate::{glob_match, Store, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: &'static str,
    pub key: String,
}

#[derive(Debug, Clone)]
struct Entry {
    stored: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

struct Inner {
    entries: Mutex<BTreeMap<String, Entry>>,
    compression: CompressionConfig,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    calls: Mutex<Vec<StoreCall>>,
}

/// In-process [`Store`] with the same semantics as [`crate::RedisStore`].
///
/// Expiry follows tokio's clock, so tests running with a paused clock can
/// step over TTLs without sleeping. Keys are kept ordered, and
/// `scan_delete` walks them with a resumable cursor just like `SCAN`.
///
/// Clones share the same data. Every operation is recorded and can be read
/// back with [`MemoryStore::get_calls`]; reads and writes can be made to fail
/// to exercise fail-open paths.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_compression(CompressionConfig::default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn validate_ttl(ttl: Option<Duration>) -> Result<(), StoreError> {
    match ttl {
        Some(ttl) if ttl.as_millis() == 0 => Err(StoreError::InvalidConfiguration(
            "TTL must be at least one millisecond - use None for no expiry".to_string(),
        )),
        _ => Ok(()),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(compression: CompressionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(BTreeMap::new()),
                compression,
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Make every read (`get`, `exists`, `ttl`) fail as if the store were down.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write (`set`, `delete`, `increment`, `scan_delete`) fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> Vec<StoreCall> {
        lock(&self.inner.calls).clone()
    }

    pub fn count_calls(&self, op: &str, key: &str) -> usize {
        lock(&self.inner.calls)
            .iter()
            .filter(|call| call.op == op && call.key == key)
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.inner.calls).clear();
    }

    /// The bytes as stored, before decoding. Not recorded as a call.
    pub fn raw_get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        lock(&self.inner.entries)
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.stored.clone())
    }

    /// Write bytes verbatim, bypassing the codec, the way an external writer
    /// sharing the keyspace would. A TTL too large to represent never expires.
    pub fn raw_set(&self, key: &str, stored: Vec<u8>, ttl: Option<Duration>) {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        lock(&self.inner.entries).insert(key.to_string(), Entry { stored, expires_at });
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        lock(&self.inner.entries)
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, op: &'static str, key: &str) {
        lock(&self.inner.calls).push(StoreCall {
            op,
            key: key.to_string(),
        });
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    /// Look up a live entry, dropping it if it has expired.
    fn live_entry(
        entries: &mut BTreeMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<Entry> {
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.record("get", key);
        self.check_read()?;

        let entry = Self::live_entry(&mut lock(&self.inner.entries), key, Instant::now());
        match entry {
            Some(entry) => codec::decode(key, entry.stored).map(Some),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.record("set", key);
        self.check_write()?;
        validate_ttl(ttl)?;

        let stored = codec::encode(value, &self.inner.compression)?;
        self.raw_set(key, stored, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.record("delete", key);
        self.check_write()?;

        let now = Instant::now();
        let removed = lock(&self.inner.entries).remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.record("exists", key);
        self.check_read()?;

        let entry = Self::live_entry(&mut lock(&self.inner.entries), key, Instant::now());
        Ok(entry.is_some())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.record("increment", key);
        self.check_write()?;

        let now = Instant::now();
        let mut entries = lock(&self.inner.entries);
        let (current, expires_at) = match Self::live_entry(&mut entries, key, now) {
            Some(entry) => {
                let expires_at = entry.expires_at;
                let payload = codec::decode(key, entry.stored)?;
                let current = std::str::from_utf8(&payload)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| StoreError::Corrupted {
                        key: key.to_string(),
                        reason: "value is not an integer".to_string(),
                    })?;
                (current, expires_at)
            }
            None => (0, None),
        };

        let next = current.checked_add(delta).ok_or_else(|| StoreError::Corrupted {
            key: key.to_string(),
            reason: "increment would overflow".to_string(),
        })?;

        entries.insert(
            key.to_string(),
            Entry {
                stored: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.record("ttl", key);
        self.check_read()?;

        let now = Instant::now();
        let entry = Self::live_entry(&mut lock(&self.inner.entries), key, now);
        Ok(entry.and_then(|entry| entry.expires_at).map(|at| at - now))
    }

    async fn scan_delete(&self, pattern: &str, batch_size: usize) -> Result<u64, StoreError> {
        self.record("scan_delete", pattern);
        self.check_write()?;

        let batch_size = batch_size.max(1);
        let mut cursor: Option<String> = None;
        let mut deleted = 0u64;

        loop {
            // Each batch takes the map lock on its own so other callers can
            // interleave between batches.
            let (batch, next_cursor) = {
                let entries = lock(&self.inner.entries);
                let lower = match &cursor {
                    Some(last) => Bound::Excluded(last.clone()),
                    None => Bound::Unbounded,
                };
                let batch: Vec<String> = entries
                    .range((lower, Bound::Unbounded))
                    .take(batch_size)
                    .map(|(key, _)| key.clone())
                    .collect();
                let next_cursor = if batch.len() < batch_size {
                    None
                } else {
                    batch.last().cloned()
                };
                (batch, next_cursor)
            };
            self.record("scan", pattern);

            let now = Instant::now();
            {
                let mut entries = lock(&self.inner.entries);
                for key in batch.iter().filter(|key| glob_match(pattern, key)) {
                    if let Some(entry) = entries.remove(key) {
                        if entry.is_live(now) {
                            deleted += 1;
                        }
                    }
                }
            }

            match next_cursor {
                Some(last) => {
                    cursor = Some(last);
                    tokio::task::yield_now().await;
                }
                None => return Ok(deleted),
            }
        }
    }
}
