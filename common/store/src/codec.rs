//! Value wire format.
//!
//! A stored value is either the raw payload, or the literal ASCII prefix
//! `COMPRESSED:` followed by a zstd frame of the payload. Readers tell the two
//! apart by the prefix alone, so anything writing into the same keyspace from
//! outside this crate must follow the same convention.

use crate::StoreError;

/// Marks a compressed value. Byte-exact, no separator after the colon.
pub const COMPRESSED_PREFIX: &[u8] = b"COMPRESSED:";

/// Controls when values are compressed on write.
///
/// Reads never consult this: a prefixed value is always decompressed, so data
/// written with any setting can be read back with any other.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Whether compression is enabled
    pub enabled: bool,
    /// Payloads strictly larger than this many bytes are compressed
    pub threshold: usize,
    /// Zstd compression level (1-22, or 0 for the library default)
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1024,
            level: 0,
        }
    }
}

impl CompressionConfig {
    pub fn new(enabled: bool, threshold: usize, level: i32) -> Self {
        Self {
            enabled,
            threshold,
            level,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: 0,
            level: 0,
        }
    }

    fn should_compress(&self, payload: &[u8]) -> bool {
        // A raw payload that happens to start with the prefix would be misread
        // as compressed, so it is always wrapped regardless of settings.
        is_compressed(payload) || (self.enabled && payload.len() > self.threshold)
    }
}

pub fn is_compressed(data: &[u8]) -> bool {
    data.starts_with(COMPRESSED_PREFIX)
}

/// Turn a payload into its stored form.
pub fn encode(payload: &[u8], config: &CompressionConfig) -> Result<Vec<u8>, StoreError> {
    if !config.should_compress(payload) {
        return Ok(payload.to_vec());
    }

    let compressed = zstd::encode_all(payload, config.level)
        .map_err(|e| StoreError::Compression(e.to_string()))?;

    let mut stored = Vec::with_capacity(COMPRESSED_PREFIX.len() + compressed.len());
    stored.extend_from_slice(COMPRESSED_PREFIX);
    stored.extend_from_slice(&compressed);
    Ok(stored)
}

/// Turn a stored value back into its payload.
///
/// A prefixed value whose body is not a valid zstd frame is reported as
/// [`StoreError::Corrupted`]; it is never handed back as-is.
pub fn decode(key: &str, stored: Vec<u8>) -> Result<Vec<u8>, StoreError> {
    if !is_compressed(&stored) {
        return Ok(stored);
    }

    zstd::decode_all(&stored[COMPRESSED_PREFIX.len()..]).map_err(|e| StoreError::Corrupted {
        key: key.to_string(),
        reason: format!("failed to decompress {} byte value: {e}", stored.len()),
    })
}
