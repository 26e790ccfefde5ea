//! Request coordination.
//!
//! The coordinator turns "materialize key K with fetcher F" into a stream of
//! [`QuerySnapshot`]s while keeping at most one request per key outstanding.
//!
//! Each request runs as a tokio task stamped with a generation drawn from a
//! coordinator-wide counter. When the task settles, its result is written
//! only if that generation is still the key's in-flight generation. A result
//! for a released, cancelled or superseded request is dropped, whatever order
//! the responses arrive in. Aborting the task is only a saving of work; the
//! generation check is what keeps the store correct.
//!
//! All bookkeeping sits behind one mutex that is never held across an
//! `.await`, so every transition (ensure, settle, release) runs to completion
//! before the next one starts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use pricewatch_core::{CacheKey, Clock, QueryError, QueryResult, SystemClock};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::binding::Subscription;
use crate::fetcher::Fetcher;
use crate::policy::{CachePolicy, QueryOptions};
use crate::snapshot::QuerySnapshot;
use crate::store::{CacheEntry, CacheStats, CacheStore};

// ============================================================================
// BOOKKEEPING
// ============================================================================

/// Times a request that the fetcher itself reports as cancelled is restarted
/// for live subscribers before it is surfaced as a network failure.
pub const MAX_CANCELLED_RESTARTS: u32 = 2;

/// An outstanding request for one key.
#[derive(Debug)]
pub struct InFlightRequest {
    pub key: CacheKey,
    pub generation: u64,
    abort: AbortHandle,
}

impl InFlightRequest {
    /// Best-effort abort of the transport call.
    fn cancel(&self) {
        self.abort.abort();
    }
}

/// Live interest in one key.
struct KeyState<T> {
    sender: watch::Sender<QuerySnapshot<T>>,
    subscribers: usize,
    in_flight: Option<InFlightRequest>,
    /// Most recently declared fetcher and its resolved policy.
    source: Option<(Arc<dyn Fetcher<T>>, CachePolicy)>,
    cancelled_restarts: u32,
}

impl<T> KeyState<T> {
    fn new() -> Self {
        let (sender, _) = watch::channel(QuerySnapshot::loading(false));
        Self {
            sender,
            subscribers: 0,
            in_flight: None,
            source: None,
            cancelled_restarts: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.subscribers == 0 && self.in_flight.is_none()
    }
}

type KeyMap<T> = HashMap<CacheKey, KeyState<T>>;

struct Inner<T> {
    store: CacheStore<T>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
    keys: Mutex<KeyMap<T>>,
    last_generation: AtomicU64,
}

impl<T> Inner<T> {
    fn lock_keys(&self) -> MutexGuard<'_, KeyMap<T>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let keys = self.keys.get_mut().unwrap_or_else(PoisonError::into_inner);
        for request in keys.values().filter_map(|state| state.in_flight.as_ref()) {
            request.cancel();
        }
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Deduplicating, cancelling request coordinator over a [`CacheStore`].
///
/// Cloning is cheap and yields a handle to the same coordinator. Requests are
/// spawned on the ambient tokio runtime, so `ensure`, `subscribe` and
/// `refetch` must be called from within one.
pub struct RequestCoordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RequestCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> RequestCoordinator<T>
where
    T: Send + Sync + 'static,
{
    /// Coordinator over an empty store using the wall clock.
    pub fn new(policy: CachePolicy) -> Self {
        Self::with_store(CacheStore::new(), Arc::new(SystemClock), policy)
    }

    /// Coordinator over an empty store using the given clock.
    pub fn with_clock(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self::with_store(CacheStore::new(), clock, policy)
    }

    pub fn with_store(store: CacheStore<T>, clock: Arc<dyn Clock>, policy: CachePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                policy,
                keys: Mutex::new(HashMap::new()),
                last_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &CacheStore<T> {
        &self.inner.store
    }

    pub fn policy(&self) -> CachePolicy {
        self.inner.policy
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.store.stats()
    }

    /// Resolve `key` against the store, starting or joining a request when
    /// the entry is missing, failed, stale or `options.force` is set.
    ///
    /// Returns the snapshot published to subscribers of `key`. A request
    /// started here with no subscriber attached still settles into the store.
    pub fn ensure(
        &self,
        key: &CacheKey,
        fetcher: Arc<dyn Fetcher<T>>,
        options: QueryOptions,
    ) -> QuerySnapshot<T> {
        let mut keys = self.inner.lock_keys();
        let snapshot = self
            .ensure_locked(&mut keys, key, fetcher, options)
            .sender
            .borrow()
            .clone();
        if keys.get(key).is_some_and(KeyState::is_idle) {
            keys.remove(key);
        }
        snapshot
    }

    /// Register interest in `key`, ensuring it as [`Self::ensure`] does.
    ///
    /// The returned guard releases the interest when dropped.
    pub fn subscribe(
        &self,
        key: CacheKey,
        fetcher: Arc<dyn Fetcher<T>>,
        options: QueryOptions,
    ) -> Subscription<T> {
        let receiver = {
            let mut keys = self.inner.lock_keys();
            let state = self.ensure_locked(&mut keys, &key, Arc::clone(&fetcher), options);
            state.subscribers += 1;
            debug!(key = %key, subscribers = state.subscribers, "Subscribed");
            state.sender.subscribe()
        };
        Subscription::new(self.clone(), key, fetcher, options, receiver)
    }

    /// Force a fetch for `key`, superseding any request already in flight.
    pub fn refetch(&self, key: &CacheKey, fetcher: Arc<dyn Fetcher<T>>) -> QuerySnapshot<T> {
        self.ensure(key, fetcher, QueryOptions::forced())
    }

    /// Mark the entry for `key` stale so the next `ensure` revalidates it.
    ///
    /// Returns whether an entry existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let _keys = self.inner.lock_keys();
        match self.inner.store.get(key) {
            Some(entry) => {
                self.inner.store.put(entry.invalidate());
                debug!(key = %key, "Invalidated entry");
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `key` so it is fetched again from scratch.
    ///
    /// An outstanding request is left running and still settles. With live
    /// subscribers and nothing in flight, a new request is issued with the
    /// key's last fetcher. Returns whether an entry existed.
    pub fn reset(&self, key: &CacheKey) -> bool {
        let mut keys = self.inner.lock_keys();
        let store = &self.inner.store;
        let removed = store.evict(key).is_some();
        if let Some(state) = keys.get_mut(key) {
            state.cancelled_restarts = 0;
            if state.in_flight.is_none() && state.subscribers > 0 {
                if let Some((fetcher, policy)) = state.source.clone() {
                    store.put(CacheEntry::loading(key.clone(), self.inner.clock.now(), &policy));
                    self.start_request(state, key, fetcher, policy, false);
                }
            }
            let snapshot =
                QuerySnapshot::from_entry(store.get(key).as_deref(), state.in_flight.is_some());
            state.sender.send_replace(snapshot);
        }
        debug!(key = %key, removed, "Reset entry");
        removed
    }

    /// Current snapshot for `key` without side effects.
    pub fn snapshot(&self, key: &CacheKey) -> QuerySnapshot<T> {
        let keys = self.inner.lock_keys();
        match keys.get(key) {
            Some(state) => state.sender.borrow().clone(),
            None => QuerySnapshot::from_entry(self.inner.store.get(key).as_deref(), false),
        }
    }

    /// Number of keys with an outstanding request.
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .lock_keys()
            .values()
            .filter(|state| state.in_flight.is_some())
            .count()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight_generation(key).is_some()
    }

    /// Generation of the outstanding request for `key`, if any.
    pub fn in_flight_generation(&self, key: &CacheKey) -> Option<u64> {
        self.inner
            .lock_keys()
            .get(key)
            .and_then(|state| state.in_flight.as_ref())
            .map(|request| request.generation)
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.inner
            .lock_keys()
            .get(key)
            .map_or(0, |state| state.subscribers)
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn ensure_locked<'a>(
        &self,
        keys: &'a mut KeyMap<T>,
        key: &CacheKey,
        fetcher: Arc<dyn Fetcher<T>>,
        options: QueryOptions,
    ) -> &'a mut KeyState<T> {
        let store = &self.inner.store;
        let now = self.inner.clock.now();
        let policy = options.resolve(&self.inner.policy);

        let state = keys.entry(key.clone()).or_insert_with(KeyState::new);
        state.source = Some((Arc::clone(&fetcher), policy));
        let fetching = state.in_flight.is_some();

        let entry = match store.lookup(key, now) {
            // Placeholder left behind by a request that no longer exists.
            Some(entry) if entry.status.is_loading() && !fetching => {
                store.evict(key);
                None
            }
            other => other,
        };

        match entry {
            Some(entry) if entry.status.is_success() && !options.force && !entry.is_stale(now) => {
                debug!(key = %key, "Serving fresh entry");
            }
            Some(entry) if entry.status.is_success() => {
                debug!(key = %key, forced = options.force, "Revalidating entry in background");
                self.start_request(state, key, fetcher, policy, options.force);
            }
            _ => {
                if !fetching {
                    store.put(CacheEntry::loading(key.clone(), now, &policy));
                }
                self.start_request(state, key, fetcher, policy, options.force);
            }
        }

        let snapshot =
            QuerySnapshot::from_entry(store.get(key).as_deref(), state.in_flight.is_some());
        state.sender.send_replace(snapshot);
        state
    }

    /// Join the outstanding request, or start one. With `supersede`, an
    /// outstanding request is cancelled and replaced.
    fn start_request(
        &self,
        state: &mut KeyState<T>,
        key: &CacheKey,
        fetcher: Arc<dyn Fetcher<T>>,
        policy: CachePolicy,
        supersede: bool,
    ) {
        if let Some(current) = &state.in_flight {
            if !supersede {
                debug!(key = %key, generation = current.generation, "Joining in-flight request");
                return;
            }
            debug!(key = %key, generation = current.generation, "Superseding in-flight request");
            current.cancel();
        }

        let generation = self.inner.last_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = fetcher.fetch().await;
            if let Some(inner) = weak.upgrade() {
                RequestCoordinator { inner }.settle(&task_key, generation, result, policy);
            }
        });

        debug!(key = %key, generation, "Started request");
        state.in_flight = Some(InFlightRequest {
            key: key.clone(),
            generation,
            abort: handle.abort_handle(),
        });
    }

    fn settle(&self, key: &CacheKey, generation: u64, result: QueryResult<T>, policy: CachePolicy) {
        let store = &self.inner.store;
        let mut keys = self.inner.lock_keys();

        let Some(state) = keys.get_mut(key) else {
            debug!(key = %key, generation, "Discarding result for released key");
            return;
        };
        if state.in_flight.as_ref().map(|r| r.generation) != Some(generation) {
            debug!(key = %key, generation, "Discarding superseded result");
            return;
        }
        state.in_flight = None;

        let now = self.inner.clock.now();
        match result {
            Ok(data) => {
                debug!(key = %key, generation, "Request succeeded");
                state.cancelled_restarts = 0;
                store.put(CacheEntry::success(key.clone(), Arc::new(data), now, &policy));
            }
            Err(QueryError::Cancelled) => {
                let has_data = store.get(key).is_some_and(|e| e.status.is_success());
                if has_data || state.subscribers == 0 {
                    debug!(key = %key, generation, "Request cancelled by fetcher");
                    if store.get(key).is_some_and(|e| e.status.is_loading()) {
                        store.evict(key);
                    }
                } else if let Some((fetcher, source_policy)) = state
                    .source
                    .clone()
                    .filter(|_| state.cancelled_restarts < MAX_CANCELLED_RESTARTS)
                {
                    state.cancelled_restarts += 1;
                    debug!(
                        key = %key,
                        generation,
                        restarts = state.cancelled_restarts,
                        "Request cancelled by fetcher, restarting"
                    );
                    self.start_request(state, key, fetcher, source_policy, false);
                    let snapshot = QuerySnapshot::from_entry(store.get(key).as_deref(), true);
                    state.sender.send_replace(snapshot);
                    return;
                } else {
                    warn!(key = %key, generation, "Request kept being cancelled, reporting failure");
                    state.cancelled_restarts = 0;
                    let error = QueryError::network("request aborted before completing");
                    store.put(CacheEntry::failure(key.clone(), error, now, &policy));
                }
            }
            Err(error) => match store.get(key) {
                Some(previous) if previous.status.is_success() => {
                    warn!(key = %key, generation, error = %error, "Refetch failed, keeping previous data");
                }
                _ => {
                    debug!(key = %key, generation, error = %error, "Request failed");
                    state.cancelled_restarts = 0;
                    store.put(CacheEntry::failure(key.clone(), error, now, &policy));
                }
            },
        }

        state
            .sender
            .send_replace(QuerySnapshot::from_entry(store.get(key).as_deref(), false));
        let idle = state.is_idle();
        if idle {
            keys.remove(key);
        }
    }

    /// Drop one subscriber's interest in `key`. The last one out cancels the
    /// outstanding request and clears any loading placeholder.
    pub(crate) fn release(&self, key: &CacheKey) {
        let mut keys = self.inner.lock_keys();
        let Some(state) = keys.get_mut(key) else {
            return;
        };
        state.subscribers = state.subscribers.saturating_sub(1);
        debug!(key = %key, subscribers = state.subscribers, "Released");
        if state.subscribers > 0 {
            return;
        }

        if let Some(request) = state.in_flight.take() {
            debug!(key = %key, generation = request.generation, "Cancelling request with no subscribers");
            request.cancel();
            let store = &self.inner.store;
            if store.get(key).is_some_and(|e| e.status.is_loading()) {
                store.evict(key);
            }
        }
        keys.remove(key);
    }
}
