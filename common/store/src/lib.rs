//! Backing key-value store used by the protected cache.
//!
//! The [`Store`] trait is the whole contract the cache layer needs from its
//! backing store: plain get/set/delete/exists, an atomic increment, and a
//! cursor-driven pattern delete. Values pass through the [`codec`] on the way
//! in and out, so large payloads are compressed transparently and tagged with
//! the `COMPRESSED:` prefix.
//!
//! Two implementations ship with the crate:
//! - [`RedisStore`] talks to Redis over a multiplexed async connection.
//! - [`MemoryStore`] keeps everything in process; tests use it the way other
//!   crates use a mock client, and it records every call it receives.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod codec;
mod memory;
mod pattern;
mod redis_store;

pub use codec::{CompressionConfig, COMPRESSED_PREFIX};
pub use memory::{MemoryStore, StoreCall};
pub use pattern::glob_match;
pub use redis_store::RedisStore;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Timeout error")]
    Timeout,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupted value for key {key}: {reason}")]
    Corrupted { key: String, reason: String },
    #[error("Compression error: {0}")]
    Compression(String),
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::Redis(Arc::new(err))
        }
    }
}

impl StoreError {
    /// The stored bytes could not be decoded. Never treat this as a miss.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corrupted { .. })
    }

    /// Transient infrastructure problems: the store could not be reached or
    /// did not answer in time. Callers may fail open on these.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StoreError::Timeout | StoreError::Unavailable(_) => true,
            StoreError::Redis(err) => {
                matches!(err.kind(), redis::ErrorKind::IoError)
                    || err.is_io_error()
                    || err.is_connection_dropped()
                    || err.is_connection_refusal()
                    || err.is_timeout()
            }
            _ => false,
        }
    }
}

/// Minimal contract over a networked key-value store.
///
/// Every operation is a single round-trip (or, for `scan_delete`, a bounded
/// sequence of them) and failures are reported to the caller rather than
/// retried here.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch and decode a value. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Encode and write a value. `None` keeps the key until it is deleted.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>)
        -> Result<(), StoreError>;

    /// Returns whether a key was actually removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically add `delta` to the integer stored at `key`, creating it at
    /// zero first if needed, and return the new value.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Remaining time to live. `None` for missing keys and keys without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Delete every key matching a glob `pattern`, walking the keyspace with a
    /// cursor `batch_size` keys at a time. Returns how many keys were removed.
    async fn scan_delete(&self, pattern: &str, batch_size: usize) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_unavailable() {
        assert!(StoreError::Timeout.is_unavailable());
        assert!(!StoreError::Timeout.is_corruption());
    }

    #[test]
    fn test_corruption_is_not_unavailable() {
        let err = StoreError::Corrupted {
            key: "user:1".to_string(),
            reason: "bad frame".to_string(),
        };
        assert!(err.is_corruption());
        assert!(!err.is_unavailable());
        assert_eq!(err.to_string(), "Corrupted value for key user:1: bad frame");
    }

    #[test]
    fn test_redis_io_error_is_unavailable() {
        let err: StoreError =
            redis::RedisError::from((redis::ErrorKind::IoError, "Connection refused")).into();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_invalid_configuration_is_permanent() {
        let err = StoreError::InvalidConfiguration("bad url".to_string());
        assert!(!err.is_unavailable());
        assert!(!err.is_corruption());
    }
}
