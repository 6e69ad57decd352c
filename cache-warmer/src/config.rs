use common_cache::ProtectedCacheConfig;
use common_store::CompressionConfig;
use envconfig::Envconfig;
use std::num::NonZeroU64;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {s}")),
        }
    }
}

impl From<FlexBool> for bool {
    fn from(flex: FlexBool) -> Self {
        flex.0
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,

    #[envconfig(from = "REDIS_URL", default = "redis://localhost:6379/")]
    pub redis_url: String,

    // 0 disables the timeout
    #[envconfig(from = "REDIS_RESPONSE_TIMEOUT_MS", default = "100")]
    pub redis_response_timeout_ms: u64,

    #[envconfig(from = "REDIS_CONNECTION_TIMEOUT_MS", default = "5000")]
    pub redis_connection_timeout_ms: u64,

    #[envconfig(from = "ORIGIN_URL", default = "http://localhost:8000/cache-origin")]
    pub origin_url: String,

    #[envconfig(from = "ORIGIN_TIMEOUT_MS", default = "5000")]
    pub origin_timeout_ms: u64,

    #[envconfig(from = "KEYS_FILE", default = "keys.txt")]
    pub keys_file: PathBuf,

    #[envconfig(from = "WARM_TTL_SECONDS", default = "3600")]
    pub warm_ttl_seconds: NonZeroU64,

    #[envconfig(from = "NULL_TTL_SECONDS", default = "60")]
    pub null_ttl_seconds: NonZeroU64,

    #[envconfig(from = "TTL_JITTER_FRACTION", default = "0.1")]
    pub ttl_jitter_fraction: f64,

    #[envconfig(from = "BATCH_SIZE", default = "100")]
    pub batch_size: usize,

    // 0 runs a single pass and exits
    #[envconfig(from = "WARM_INTERVAL_SECS", default = "0")]
    pub warm_interval_secs: u64,

    #[envconfig(from = "COMPRESSION_ENABLED", default = "true")]
    pub compression_enabled: FlexBool,

    #[envconfig(from = "COMPRESSION_THRESHOLD", default = "1024")]
    pub compression_threshold: usize,

    #[envconfig(from = "COMPRESSION_LEVEL", default = "0")]
    pub compression_level: i32,

    #[envconfig(from = "BLOOM_EXPECTED_KEYS", default = "1000000")]
    pub bloom_expected_keys: usize,

    #[envconfig(from = "BLOOM_BITS_PER_KEY", default = "16")]
    pub bloom_bits_per_key: usize,
}

impl Config {
    pub fn redis_response_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.redis_response_timeout_ms)
    }

    pub fn redis_connection_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.redis_connection_timeout_ms)
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_millis(self.origin_timeout_ms)
    }

    pub fn warm_ttl(&self) -> Duration {
        Duration::from_secs(self.warm_ttl_seconds.get())
    }

    /// `None` when the warmer should run once and exit.
    pub fn warm_interval(&self) -> Option<Duration> {
        (self.warm_interval_secs > 0).then(|| Duration::from_secs(self.warm_interval_secs))
    }

    pub fn compression(&self) -> CompressionConfig {
        CompressionConfig::new(
            *self.compression_enabled,
            self.compression_threshold,
            self.compression_level,
        )
    }

    pub fn cache_config(&self) -> ProtectedCacheConfig {
        ProtectedCacheConfig::with_ttl(
            self.warm_ttl_seconds.get(),
            self.null_ttl_seconds.get(),
        )
        .jitter_fraction(self.ttl_jitter_fraction)
    }
}

fn non_zero_millis(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.debug, FlexBool(false));
        assert_eq!(config.redis_url, "redis://localhost:6379/");
        assert_eq!(
            config.redis_response_timeout(),
            Some(Duration::from_millis(100))
        );
        assert_eq!(config.keys_file, PathBuf::from("keys.txt"));
        assert_eq!(config.warm_ttl(), Duration::from_secs(3600));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.warm_interval(), None);

        let compression = config.compression();
        assert!(compression.enabled);
        assert_eq!(compression.threshold, 1024);

        let cache_config = config.cache_config();
        assert_eq!(cache_config.ttl, Duration::from_secs(3600));
        assert_eq!(cache_config.null_ttl, Duration::from_secs(60));
        assert_eq!(cache_config.jitter_fraction, 0.1);
    }

    #[test]
    fn test_overrides() {
        let env = HashMap::from([
            ("DEBUG".to_string(), "yes".to_string()),
            ("WARM_INTERVAL_SECS".to_string(), "300".to_string()),
            ("REDIS_RESPONSE_TIMEOUT_MS".to_string(), "0".to_string()),
            ("COMPRESSION_ENABLED".to_string(), "off".to_string()),
            ("TTL_JITTER_FRACTION".to_string(), "0.25".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert!(*config.debug);
        assert_eq!(config.warm_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.redis_response_timeout(), None);
        assert!(!config.compression().enabled);
        assert_eq!(config.cache_config().jitter_fraction, 0.25);
    }

    #[test]
    fn test_zero_ttls_are_rejected() {
        for var in ["WARM_TTL_SECONDS", "NULL_TTL_SECONDS"] {
            let env = HashMap::from([(var.to_string(), "0".to_string())]);
            assert!(Config::init_from_hashmap(&env).is_err(), "{var}=0 should be rejected");
        }
    }

    #[test]
    fn test_flex_bool() {
        assert_eq!("TRUE".parse::<FlexBool>().unwrap(), FlexBool(true));
        assert_eq!(" on ".parse::<FlexBool>().unwrap(), FlexBool(true));
        assert_eq!("".parse::<FlexBool>().unwrap(), FlexBool(false));
        assert!("maybe".parse::<FlexBool>().is_err());
    }
}
