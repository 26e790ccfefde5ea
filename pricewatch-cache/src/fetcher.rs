//! Fetch functions driven by the coordinator.

use std::future::Future;

use async_trait::async_trait;
use pricewatch_core::QueryResult;

/// Produces the payload for one cache key.
///
/// Implementations should map transport failures to `QueryError::Network`
/// and a missing remote resource to `QueryError::NotFound`. Aborting the
/// returned future is how the coordinator cancels a request, so a fetcher
/// does not need to watch for cancellation itself.
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    async fn fetch(&self) -> QueryResult<T>;
}

#[async_trait]
impl<T, F, Fut> Fetcher<T> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = QueryResult<T>> + Send,
    T: Send + 'static,
{
    async fn fetch(&self) -> QueryResult<T> {
        (self)().await
    }
}
