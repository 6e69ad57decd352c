pub const REQUESTS_COUNTER: &str = "protected_cache_requests_total";
pub const FETCH_COUNTER: &str = "protected_cache_fetch_total";
pub const FETCH_DURATION_HISTOGRAM: &str = "protected_cache_fetch_duration_ms";
pub const STORE_ERRORS_COUNTER: &str = "protected_cache_store_errors_total";
pub const WARM_UP_KEYS_COUNTER: &str = "cache_warm_up_keys_total";
