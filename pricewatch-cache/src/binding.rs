//! Subscriptions and query bindings.
//!
//! A [`Subscription`] is one consumer's interest in one key: it receives the
//! key's snapshots and releases its interest when dropped. A [`QueryBinding`]
//! is what a view holds: at most one subscription, re-targeted whenever the
//! view's key changes.

use std::sync::Arc;

use pricewatch_core::CacheKey;
use tokio::sync::watch;

use crate::coordinator::RequestCoordinator;
use crate::fetcher::Fetcher;
use crate::policy::QueryOptions;
use crate::snapshot::QuerySnapshot;

// ============================================================================
// SUBSCRIPTION
// ============================================================================

/// Interest in one key, released on drop.
pub struct Subscription<T>
where
    T: Send + Sync + 'static,
{
    coordinator: RequestCoordinator<T>,
    key: CacheKey,
    fetcher: Arc<dyn Fetcher<T>>,
    options: QueryOptions,
    receiver: watch::Receiver<QuerySnapshot<T>>,
    released: bool,
}

impl<T> Subscription<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        coordinator: RequestCoordinator<T>,
        key: CacheKey,
        fetcher: Arc<dyn Fetcher<T>>,
        options: QueryOptions,
        receiver: watch::Receiver<QuerySnapshot<T>>,
    ) -> Self {
        Self {
            coordinator,
            key,
            fetcher,
            options,
            receiver,
            released: false,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Latest snapshot for the key.
    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once released.
    pub async fn changed(&mut self) -> Option<QuerySnapshot<T>> {
        if self.released {
            return None;
        }
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until no request is outstanding and the status is final.
    pub async fn settled(&mut self) -> QuerySnapshot<T> {
        if self.released {
            return self.snapshot();
        }
        let settled = self
            .receiver
            .wait_for(QuerySnapshot::is_settled)
            .await
            .map(|snapshot| snapshot.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    /// Fetch again, bypassing the staleness check.
    pub fn refetch(&self) -> QuerySnapshot<T> {
        if self.released {
            return self.snapshot();
        }
        let options = QueryOptions {
            force: true,
            ..self.options
        };
        self.coordinator
            .ensure(&self.key, Arc::clone(&self.fetcher), options)
    }

    /// Give up interest in the key. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.coordinator.release(&self.key);
        }
    }
}

impl<T> Drop for Subscription<T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// BINDING
// ============================================================================

/// Re-targetable subscription held by a view.
///
/// Binding a new key subscribes to it before releasing the old one, so a
/// shared key is never dropped and re-fetched in between, and the old key's
/// cancellation is never visible through the binding.
pub struct QueryBinding<T>
where
    T: Send + Sync + 'static,
{
    coordinator: RequestCoordinator<T>,
    options: QueryOptions,
    subscription: Option<Subscription<T>>,
}

impl<T> QueryBinding<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(coordinator: RequestCoordinator<T>) -> Self {
        Self::with_options(coordinator, QueryOptions::default())
    }

    pub fn with_options(coordinator: RequestCoordinator<T>, options: QueryOptions) -> Self {
        Self {
            coordinator,
            options,
            subscription: None,
        }
    }

    /// Declare that the view needs `key`, materialized by `fetcher`.
    ///
    /// Re-binding the current key is a no-op that returns the latest
    /// snapshot.
    pub fn bind(&mut self, key: CacheKey, fetcher: Arc<dyn Fetcher<T>>) -> QuerySnapshot<T> {
        if let Some(current) = &self.subscription {
            if current.key() == &key {
                return current.snapshot();
            }
        }
        let next = self.coordinator.subscribe(key, fetcher, self.options);
        let snapshot = next.snapshot();
        // The previous subscription drops here, after the new one is live.
        self.subscription = Some(next);
        snapshot
    }

    pub fn key(&self) -> Option<&CacheKey> {
        self.subscription.as_ref().map(Subscription::key)
    }

    pub fn is_bound(&self) -> bool {
        self.subscription.is_some()
    }

    /// Latest snapshot for the bound key.
    pub fn snapshot(&self) -> Option<QuerySnapshot<T>> {
        self.subscription.as_ref().map(Subscription::snapshot)
    }

    pub fn refetch(&self) -> Option<QuerySnapshot<T>> {
        self.subscription.as_ref().map(Subscription::refetch)
    }

    /// Unbind. Idempotent.
    pub fn cancel(&mut self) {
        self.subscription = None;
    }

    pub async fn changed(&mut self) -> Option<QuerySnapshot<T>> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.changed().await,
            None => None,
        }
    }

    pub async fn settled(&mut self) -> Option<QuerySnapshot<T>> {
        match self.subscription.as_mut() {
            Some(subscription) => Some(subscription.settled().await),
            None => None,
        }
    }

    pub fn coordinator(&self) -> &RequestCoordinator<T> {
        &self.coordinator
    }
}
