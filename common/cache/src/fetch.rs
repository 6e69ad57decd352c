use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// The boundary to the authoritative source of cached values.
///
/// `Ok(Some(bytes))` is a value, `Ok(None)` means the key does not exist at
/// the source, and `Err` is a failure that must not be cached. Implementations
/// should be safe to call more than once for the same key.
#[async_trait]
pub trait Fetcher: Send + Sync {
    type Error: Send;

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;
}

#[async_trait]
impl<T> Fetcher for Arc<T>
where
    T: Fetcher + ?Sized,
{
    type Error = T::Error;

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        (**self).fetch(key).await
    }
}

/// Adapts an async closure into a [`Fetcher`].
///
/// ```rust
/// use common_cache::FetchFn;
///
/// let fetcher = FetchFn::new(|key: String| async move {
///     Ok::<_, std::io::Error>(Some(key.into_bytes()))
/// });
/// ```
pub struct FetchFn<F> {
    func: F,
}

impl<F> FetchFn<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut, E> Fetcher for FetchFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Vec<u8>>, E>> + Send,
    E: Send,
{
    type Error = E;

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, E> {
        (self.func)(key.to_string()).await
    }
}
