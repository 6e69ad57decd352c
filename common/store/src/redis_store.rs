use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use crate::codec::{self, CompressionConfig};
use crate::{Store, StoreError};

pub struct RedisStore {
    connection: MultiplexedConnection,
    compression: CompressionConfig,
}

impl RedisStore {
    /// Connect with default compression and no timeouts.
    pub async fn new(addr: String) -> Result<RedisStore, StoreError> {
        Self::with_config(addr, CompressionConfig::default(), None, None).await
    }

    /// Connect with full configuration control.
    ///
    /// # Arguments
    /// * `addr` - Redis connection string
    /// * `compression` - When values are compressed on write
    /// * `response_timeout` - Timeout for command responses. `None` blocks indefinitely.
    /// * `connection_timeout` - Timeout for establishing the connection. `None` blocks indefinitely.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidConfiguration` if `Some(Duration::ZERO)` is
    /// passed for either timeout; use `None` for no timeout instead.
    ///
    /// # Examples
    /// ```no_run
    /// use common_store::{CompressionConfig, RedisStore};
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let store = RedisStore::with_config(
    ///     "redis://localhost:6379".to_string(),
    ///     CompressionConfig::new(true, 1024, 3),
    ///     Some(Duration::from_millis(100)),
    ///     Some(Duration::from_millis(5000)),
    /// )
    /// .await
    /// .unwrap();
    /// # }
    /// ```
    pub async fn with_config(
        addr: String,
        compression: CompressionConfig,
        response_timeout: Option<Duration>,
        connection_timeout: Option<Duration>,
    ) -> Result<RedisStore, StoreError> {
        if response_timeout.is_some_and(|t| t.is_zero()) {
            return Err(StoreError::InvalidConfiguration(
                "Redis response timeout cannot be Duration::ZERO - use None for no timeout"
                    .to_string(),
            ));
        }
        if connection_timeout.is_some_and(|t| t.is_zero()) {
            return Err(StoreError::InvalidConfiguration(
                "Redis connection timeout cannot be Duration::ZERO - use None for no timeout"
                    .to_string(),
            ));
        }

        let client = redis::Client::open(addr)?;

        let mut config = redis::AsyncConnectionConfig::new();
        if let Some(timeout) = response_timeout {
            config = config.set_response_timeout(timeout);
        }
        if let Some(timeout) = connection_timeout {
            config = config.set_connection_timeout(timeout);
        }

        let connection = client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;

        Ok(RedisStore {
            connection,
            compression,
        })
    }
}

fn ttl_millis(ttl: Duration) -> Result<u64, StoreError> {
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return Err(StoreError::InvalidConfiguration(
            "TTL must be at least one millisecond - use None for no expiry".to_string(),
        ));
    }
    Ok(millis)
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection.clone();
        let stored: Option<Vec<u8>> = conn.get(key).await?;

        match stored {
            Some(stored) => codec::decode(key, stored).map(Some),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let stored = codec::encode(value, &self.compression)?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(stored);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl)?);
        }

        let mut conn = self.connection.clone();
        cmd.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        let value: i64 = conn.incr(key, delta).await?;
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.connection.clone();
        let millis: i64 = conn.pttl(key).await?;

        // -2: no such key, -1: key without expiry
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    async fn scan_delete(&self, pattern: &str, batch_size: usize) -> Result<u64, StoreError> {
        let batch_size = batch_size.max(1);
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(batch_size)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                // UNLINK reclaims memory off the main thread; the reply only
                // counts keys that still existed, so SCAN repeats are harmless.
                let removed: u64 = redis::cmd("UNLINK")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await?;
                deleted += removed;
            }

            debug!(
                pattern,
                cursor = next_cursor,
                batch = keys.len(),
                deleted,
                "scan_delete batch"
            );

            if next_cursor == 0 {
                return Ok(deleted);
            }
            cursor = next_cursor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_response_timeout_returns_error() {
        let result = RedisStore::with_config(
            "redis://localhost:6379".to_string(),
            CompressionConfig::default(),
            Some(Duration::ZERO),
            None,
        )
        .await;

        match result {
            Err(StoreError::InvalidConfiguration(msg)) => assert!(msg.contains("response timeout")),
            _ => panic!("expected invalid configuration"),
        }
    }

    #[tokio::test]
    async fn test_zero_connection_timeout_returns_error() {
        let result = RedisStore::with_config(
            "redis://localhost:6379".to_string(),
            CompressionConfig::default(),
            None,
            Some(Duration::ZERO),
        )
        .await;

        match result {
            Err(StoreError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("connection timeout"))
            }
            _ => panic!("expected invalid configuration"),
        }
    }

    #[test]
    fn test_ttl_millis() {
        assert_eq!(ttl_millis(Duration::from_secs(2)).unwrap(), 2000);
        assert_eq!(ttl_millis(Duration::from_micros(1500)).unwrap(), 1);
        assert!(ttl_millis(Duration::from_micros(10)).is_err());
    }
}
