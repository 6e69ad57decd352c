use rand::Rng;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_NULL_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_JITTER_FRACTION: f64 = 0.1;
pub const DEFAULT_LOCK_SWEEP_THRESHOLD: usize = 10_000;
/// Upper bound for any TTL written by the cache. Longer TTLs are capped to it.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Instance-wide settings for a [`crate::ProtectedCache`].
///
/// Per-call overrides go through [`crate::GetOptions`].
#[derive(Clone, Debug)]
pub struct ProtectedCacheConfig {
    /// Nominal TTL for cached values
    pub ttl: Duration,
    /// Nominal TTL for negative markers
    pub null_ttl: Duration,
    /// Both TTLs are stretched by a random factor in `[0, jitter_fraction]`
    pub jitter_fraction: f64,
    /// Consult the membership filter when a call does not say otherwise
    pub use_membership_filter: bool,
    /// Sweep idle per-key locks once the registry holds this many entries. Zero disables it.
    pub lock_sweep_threshold: usize,
    /// Capacity of the in-process negative marker tier. `None` keeps every
    /// check on the store.
    pub negative_cache_local_capacity: Option<u64>,
}

impl Default for ProtectedCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            null_ttl: DEFAULT_NULL_TTL,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            use_membership_filter: false,
            lock_sweep_threshold: DEFAULT_LOCK_SWEEP_THRESHOLD,
            negative_cache_local_capacity: None,
        }
    }
}

impl ProtectedCacheConfig {
    /// Default settings with the given value and negative marker TTLs
    ///
    /// # Arguments
    /// * `ttl_seconds` - TTL for cached values
    /// * `null_ttl_seconds` - TTL for negative markers
    pub fn with_ttl(ttl_seconds: u64, null_ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds),
            null_ttl: Duration::from_secs(null_ttl_seconds),
            ..Self::default()
        }
    }

    pub fn jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction;
        self
    }

    pub fn use_membership_filter(mut self, enabled: bool) -> Self {
        self.use_membership_filter = enabled;
        self
    }

    pub fn lock_sweep_threshold(mut self, threshold: usize) -> Self {
        self.lock_sweep_threshold = threshold;
        self
    }

    pub fn negative_cache_local_capacity(mut self, capacity: u64) -> Self {
        self.negative_cache_local_capacity = Some(capacity);
        self
    }

    /// `ttl` stretched by this config's jitter fraction.
    pub fn jittered(&self, ttl: Duration) -> Duration {
        jitter(ttl, self.jitter_fraction)
    }
}

/// Returns a duration in `[ttl, ttl * (1 + fraction)]`, capped at [`MAX_TTL`].
///
/// `fraction` is clamped to `[0, 1]`; NaN counts as zero.
pub fn jitter(ttl: Duration, fraction: f64) -> Duration {
    let ttl = ttl.min(MAX_TTL);
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    if fraction == 0.0 || ttl.is_zero() {
        return ttl;
    }

    let extra = rand::thread_rng().gen_range(0.0..=fraction);
    let extra =
        Duration::try_from_secs_f64(ttl.as_secs_f64() * extra).unwrap_or(Duration::ZERO);
    ttl.saturating_add(extra).min(MAX_TTL)
}
