/// Prefix reserved for negative markers. Caller keys may never start with it.
pub const NULL_PREFIX: &str = "null:";

/// The store key holding the negative marker for `key`.
pub fn null_key(key: &str) -> String {
    format!("{NULL_PREFIX}{key}")
}

pub(crate) fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("cache key cannot be empty".to_string());
    }
    if key.starts_with(NULL_PREFIX) {
        return Err(format!(
            "cache key {key} uses the reserved {NULL_PREFIX} prefix"
        ));
    }
    Ok(())
}
