use common_store::StoreError;
use thiserror::Error;

/// A stored value exists but cannot be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("corrupted cache entry for key {key}: {reason}")]
pub struct CacheCorruptionError {
    pub key: String,
    pub reason: String,
}

impl CacheCorruptionError {
    /// Pulls the corruption details out of a store error, if it is one.
    pub fn from_store_error(err: &StoreError) -> Option<Self> {
        match err {
            StoreError::Corrupted { key, reason } => Some(Self {
                key: key.clone(),
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

/// Errors returned by [`crate::ProtectedCache`].
///
/// `E` is the fetcher's own error type and is handed back untouched.
/// `put` and `invalidate` never fetch, so they use `CacheError<Infallible>`.
/// `get_or_fetch` fails open on the store and never returns `Store`.
#[derive(Error, Debug)]
pub enum CacheError<E> {
    #[error("fetch failed: {0}")]
    Fetch(E),
    #[error(transparent)]
    Corrupted(#[from] CacheCorruptionError),
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<E> CacheError<E> {
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, CacheError::Fetch(_))
    }

    /// The fetcher's error, if that is what failed.
    pub fn into_fetch_error(self) -> Option<E> {
        match self {
            CacheError::Fetch(e) => Some(e),
            _ => None,
        }
    }
}
