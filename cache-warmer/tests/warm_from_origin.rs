use cache_warmer::config::Config;
use cache_warmer::origin::HttpOriginFetcher;
use cache_warmer::warm_once;
use common_cache::{HashSetMembershipFilter, ProtectedCache, WarmUpRunner};
use common_store::{MemoryStore, Store};
use envconfig::Envconfig;
use httpmock::MockServer;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn write_keys_file(name: &str, contents: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("cache-warmer-{name}-{nanos}.txt"));
    std::fs::write(&path, contents).unwrap();
    path
}

fn test_config(server: &MockServer, keys_file: &Path) -> Config {
    let env = HashMap::from([
        ("ORIGIN_URL".to_string(), server.url("/origin")),
        ("KEYS_FILE".to_string(), keys_file.display().to_string()),
        ("BATCH_SIZE".to_string(), "2".to_string()),
        ("WARM_TTL_SECONDS".to_string(), "120".to_string()),
    ]);
    Config::init_from_hashmap(&env).unwrap()
}

#[tokio::test]
async fn test_warm_from_http_origin() {
    let server = MockServer::start();
    let alice = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/origin/user:1");
        then.status(200).body("Alice");
    });
    let bob = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/origin/user:2");
        then.status(200).body("Bob");
    });
    let missing = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/origin/user:3");
        then.status(404);
    });
    let broken = server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/origin/user:4");
        then.status(500);
    });

    let keys_file = write_keys_file(
        "origin",
        "# warm these first\nuser:1\nuser:2\n\nuser:3\nuser:4\n",
    );
    let config = test_config(&server, &keys_file);

    let store = MemoryStore::new();
    let cache = Arc::new(ProtectedCache::new(
        Arc::new(store.clone()),
        Arc::new(HashSetMembershipFilter::new()),
        config.cache_config(),
    ));
    let runner = WarmUpRunner::new(cache);
    let fetcher = HttpOriginFetcher::new(&config.origin_url, config.origin_timeout()).unwrap();

    let report = warm_once(&config, &runner, &fetcher).await.unwrap();

    assert_eq!(report.attempted, 4);
    assert_eq!(report.cached, 2);
    assert_eq!(report.absent, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "user:4");

    assert_eq!(store.get("user:1").await.unwrap(), Some(b"Alice".to_vec()));
    assert_eq!(store.get("user:2").await.unwrap(), Some(b"Bob".to_vec()));
    assert!(store.exists("null:user:3").await.unwrap());
    assert!(!store.exists("user:4").await.unwrap());

    let ttl = store.ttl("user:1").await.unwrap().unwrap();
    assert!(ttl > Duration::from_secs(115) && ttl <= Duration::from_secs(132));

    // a second pass is served from the cache, except for the failed key
    warm_once(&config, &runner, &fetcher).await.unwrap();
    assert_eq!(alice.hits(), 1);
    assert_eq!(bob.hits(), 1);
    assert_eq!(missing.hits(), 1);
    assert_eq!(broken.hits(), 2);

    std::fs::remove_file(keys_file).unwrap();
}

#[tokio::test]
async fn test_missing_keys_file_is_an_error() {
    let server = MockServer::start();
    let keys_file = std::env::temp_dir().join("cache-warmer-missing-keys-file.txt");
    let config = test_config(&server, &keys_file);

    let runner = WarmUpRunner::new(Arc::new(ProtectedCache::new(
        Arc::new(MemoryStore::new()),
        Arc::new(HashSetMembershipFilter::new()),
        config.cache_config(),
    )));
    let fetcher = HttpOriginFetcher::new(&config.origin_url, config.origin_timeout()).unwrap();

    let err = warm_once(&config, &runner, &fetcher).await.unwrap_err();
    assert!(err.to_string().contains("failed to read keys"));
}
