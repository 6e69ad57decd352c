//! Per-key mutual exclusion for cache fills
//!
//! [`KeyLockRegistry`] hands out one async mutex per cache key. The map of
//! mutexes sits behind a short-lived `std::sync::Mutex` that is never held
//! across an await point; waiting happens on the per-key mutex only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Exclusive hold on one key. Dropping it releases the key, so a cancelled
/// or failed critical section can never leave the key locked.
#[derive(Debug)]
pub struct KeyLock {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLock {
    pub fn key(&self) -> &str {
        &self.key
    }
}

pub struct KeyLockRegistry {
    locks: Mutex<LockMap>,
    sweep_threshold: usize,
}

impl Default for KeyLockRegistry {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_LOCK_SWEEP_THRESHOLD)
    }
}

impl KeyLockRegistry {
    /// # Arguments
    /// * `sweep_threshold` - Entry count at which idle locks are swept on the
    ///   next acquire of a new key. Zero turns automatic sweeping off.
    pub fn new(sweep_threshold: usize) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            sweep_threshold,
        }
    }

    /// Wait until `key` is free and take it.
    pub async fn acquire(&self, key: &str) -> KeyLock {
        let mutex = {
            let mut locks = self.map();
            if self.sweep_threshold > 0
                && locks.len() >= self.sweep_threshold
                && !locks.contains_key(key)
            {
                let removed = sweep_idle(&mut locks);
                debug!(removed, remaining = locks.len(), "swept idle key locks");
            }
            locks.entry(key.to_string()).or_default().clone()
        };

        KeyLock {
            key: key.to_string(),
            _guard: mutex.lock_owned().await,
        }
    }

    /// Take `key` only if nobody holds it right now.
    pub fn try_acquire(&self, key: &str) -> Option<KeyLock> {
        let mutex = self.map().entry(key.to_string()).or_default().clone();
        let guard = mutex.try_lock_owned().ok()?;
        Some(KeyLock {
            key: key.to_string(),
            _guard: guard,
        })
    }

    pub fn release(&self, lock: KeyLock) {
        drop(lock);
    }

    /// Remove every entry nobody holds or waits on. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        sweep_idle(&mut self.map())
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(|poisoned| {
            warn!("key lock registry poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

// Holders and waiters each own a clone of the Arc, and clones are only made
// with the map locked, so a count of one cannot change while we hold it.
fn sweep_idle(locks: &mut LockMap) -> usize {
    let before = locks.len();
    locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    before - locks.len()
}
