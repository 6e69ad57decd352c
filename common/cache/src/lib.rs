//! Protected read-through cache for PostHog services
//!
//! This crate layers cache-failure defenses over a [`common_store::Store`]:
//!
//! - Membership filter fast-reject for keys never seen (penetration)
//! - Store-backed negative markers under `null:<key>` (penetration)
//! - Per-key single-flight around the fetcher (breakdown)
//! - Jittered TTLs on everything written (avalanche)
//! - Batched warm-up of a key list before traffic arrives
//! - Rich return types indicating cache source for observability
//! - User-defined fetcher error types, returned untouched
//!
//! # Example
//!
//! ```rust,ignore
//! use common_cache::{
//!     BloomMembershipFilter, CacheSource, FetchFn, GetOptions, ProtectedCache,
//!     ProtectedCacheConfig,
//! };
//!
//! let cache = ProtectedCache::new(
//!     store,
//!     Arc::new(BloomMembershipFilter::default()),
//!     ProtectedCacheConfig::with_ttl(3600, 60),
//! );
//!
//! let fetcher = FetchFn::new(|key: String| async move { load_from_source(&key).await });
//! let result = cache
//!     .get_or_fetch("user:42", &fetcher, GetOptions::default())
//!     .await?;
//!
//! match result.source {
//!     CacheSource::PositiveCache => println!("Cache hit!"),
//!     CacheSource::LoaderCacheMiss => println!("Cache miss, loaded from source"),
//!     CacheSource::NegativeCache => println!("Known to not exist"),
//!     _ => println!("Other source: {}", result.source),
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod keys;
pub mod locks;
pub mod membership;
pub mod metrics_consts;
pub mod negative_cache;
pub mod protected;
pub mod types;
pub mod warm_up;

pub use config::{jitter, ProtectedCacheConfig, MAX_TTL};
pub use error::{CacheCorruptionError, CacheError};
pub use fetch::{FetchFn, Fetcher};
pub use keys::{null_key, NULL_PREFIX};
pub use locks::{KeyLock, KeyLockRegistry};
pub use membership::{BloomMembershipFilter, HashSetMembershipFilter, MembershipFilter};
pub use negative_cache::NegativeCache;
pub use protected::ProtectedCache;
pub use types::{CacheResult, CacheSource, GetOptions};
pub use warm_up::{WarmUpFailure, WarmUpReport, WarmUpRunner};
