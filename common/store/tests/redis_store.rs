//! Runs against a live Redis at `REDIS_URL` (default `redis://localhost:6379`).
//! Ignored by default: `cargo test -p common-store -- --ignored`.

use common_store::{CompressionConfig, RedisStore, Store};
use std::time::Duration;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn unique_prefix(name: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("store_test:{name}:{nanos}")
}

async fn store() -> RedisStore {
    RedisStore::with_config(
        redis_url(),
        CompressionConfig::default(),
        Some(Duration::from_secs(2)),
        Some(Duration::from_secs(5)),
    )
    .await
    .expect("failed to connect to redis")
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn test_roundtrip_with_and_without_compression() {
    let store = store().await;
    let prefix = unique_prefix("roundtrip");

    let small = vec![b'x'; 100];
    let large: Vec<u8> = (0..100 * 1024u32).map(|i| (i % 13) as u8).collect();

    store
        .set(&format!("{prefix}:small"), &small, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    store
        .set(&format!("{prefix}:large"), &large, Some(Duration::from_secs(60)))
        .await
        .unwrap();

    assert_eq!(store.get(&format!("{prefix}:small")).await.unwrap(), Some(small));
    assert_eq!(store.get(&format!("{prefix}:large")).await.unwrap(), Some(large));

    store.scan_delete(&format!("{prefix}:*"), 100).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn test_ttl_and_delete() {
    let store = store().await;
    let key = unique_prefix("ttl");

    store
        .set(&key, b"value", Some(Duration::from_secs(30)))
        .await
        .unwrap();
    let ttl = store.ttl(&key).await.unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(30));
    assert!(ttl > Duration::from_secs(25));

    assert!(store.exists(&key).await.unwrap());
    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());
    assert_eq!(store.ttl(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn test_increment_is_atomic() {
    let store = std::sync::Arc::new(store().await);
    let key = unique_prefix("counter");

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move { store.increment(&key, 1).await.unwrap() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.increment(&key, 0).await.unwrap(), 20);
    store.delete(&key).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running redis"]
async fn test_scan_delete_precision() {
    let store = store().await;
    let prefix = unique_prefix("scan");

    for i in 0..250 {
        store
            .set(&format!("{prefix}:match:{i}"), b"m", Some(Duration::from_secs(60)))
            .await
            .unwrap();
    }
    for i in 0..40 {
        store
            .set(&format!("{prefix}:other:{i}"), b"o", Some(Duration::from_secs(60)))
            .await
            .unwrap();
    }

    let deleted = store
        .scan_delete(&format!("{prefix}:match:*"), 32)
        .await
        .unwrap();
    assert_eq!(deleted, 250);
    assert!(store.exists(&format!("{prefix}:other:7")).await.unwrap());

    let rest = store.scan_delete(&format!("{prefix}:*"), 32).await.unwrap();
    assert_eq!(rest, 40);
}
