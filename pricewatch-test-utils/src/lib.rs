//! Pricewatch Test Utilities
//!
//! Shared test infrastructure for the pricewatch workspace:
//! - A hand-driven clock
//! - Scripted and gated fetchers for deterministic request races
//! - Proptest generators for keys, ids and payloads
//! - Payload fixtures
//! - Assertions over query snapshots

// Re-export core and cache types for convenience
pub use pricewatch_cache::{
    CachePolicy, CacheStore, Fetcher, QueryBinding, QueryOptions, QuerySnapshot,
    RequestCoordinator,
};
pub use pricewatch_core::{
    cache_key, CacheKey, Category, Clock, ItemDetail, ItemId, ItemPage, ItemSummary, Paged,
    PricePoint, QueryError, QueryResult, QueryStatus, Timestamp,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

// ============================================================================
// CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Clock starting at [`fixtures::epoch`].
    pub fn at_epoch() -> Self {
        Self::new(fixtures::epoch())
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    /// Share as the trait object coordinators take.
    pub fn shared(&self) -> Arc<dyn Clock> {
        Arc::new(self.clone())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// FETCHERS
// ============================================================================

/// Fetcher that replays queued responses in order and counts calls.
///
/// Once the script runs out every call fails with a network error.
pub struct ScriptedFetcher<T> {
    responses: Mutex<VecDeque<QueryResult<T>>>,
    calls: AtomicUsize,
}

impl<T> ScriptedFetcher<T> {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_results(results: impl IntoIterator<Item = QueryResult<T>>) -> Self {
        Self {
            responses: Mutex::new(results.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: QueryResult<T>) -> &Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
        self
    }

    pub fn push_ok(&self, value: T) -> &Self {
        self.push(Ok(value))
    }

    pub fn push_err(&self, error: QueryError) -> &Self {
        self.push(Err(error))
    }

    /// Number of times `fetch` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T> Default for ScriptedFetcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Fetcher<T> for ScriptedFetcher<T>
where
    T: Send + 'static,
{
    async fn fetch(&self) -> QueryResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| Err(QueryError::network("script exhausted")))
    }
}

/// Fetcher whose calls park until the test resolves them.
///
/// Calls are numbered from zero in the order they start. Resolving them out
/// of order is how tests stage "A starts, B starts, A answers last".
pub struct GatedFetcher<T> {
    gates: Mutex<Vec<Option<oneshot::Sender<QueryResult<T>>>>>,
    started: watch::Sender<usize>,
}

impl<T> GatedFetcher<T> {
    pub fn new() -> Self {
        let (started, _) = watch::channel(0);
        Self {
            gates: Mutex::new(Vec::new()),
            started,
        }
    }

    /// Number of calls started so far.
    pub fn calls(&self) -> usize {
        *self.started.borrow()
    }

    /// Wait until at least `count` calls have started.
    pub async fn wait_for_calls(&self, count: usize) {
        let mut receiver = self.started.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|started| *started >= count).await;
    }

    /// Answer call `index`. Returns false if the call does not exist, was
    /// already answered, or was abandoned by its caller.
    pub fn resolve(&self, index: usize, result: QueryResult<T>) -> bool {
        let gate = self
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(index)
            .and_then(Option::take);
        match gate {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    /// Whether call `index` has been abandoned, e.g. by an aborted request.
    pub fn is_abandoned(&self, index: usize) -> bool {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .and_then(Option::as_ref)
            .is_some_and(oneshot::Sender::is_closed)
    }
}

impl<T> Default for GatedFetcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Fetcher<T> for GatedFetcher<T>
where
    T: Send + 'static,
{
    async fn fetch(&self) -> QueryResult<T> {
        let (sender, receiver) = oneshot::channel();
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Some(sender));
        self.started.send_modify(|started| *started += 1);
        receiver.await.unwrap_or(Err(QueryError::Cancelled))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for pricewatch types.

    use super::*;
    use proptest::prelude::*;

    /// A slug such as a category path segment.
    pub fn arb_slug() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}"
    }

    /// A well-formed product id string.
    pub fn arb_item_id_string() -> impl Strategy<Value = String> {
        "[1-9][0-9]{8,11}"
    }

    pub fn arb_item_id() -> impl Strategy<Value = ItemId> {
        arb_item_id_string().prop_filter_map("valid item id", |id| {
            pricewatch_core::validate_item_input(&id).ok()
        })
    }

    /// A key drawn from the application's resource namespaces.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        prop_oneof![
            Just(pricewatch_core::categories_key()),
            arb_slug().prop_map(|slug| pricewatch_core::subcategories_key(&slug)),
            (1u32..50, arb_slug())
                .prop_map(|(page, slug)| pricewatch_core::items_page_key(page, &slug)),
            arb_item_id().prop_map(|id| pricewatch_core::item_key(&id)),
        ]
    }

    /// Non-cancellation failures a fetcher may report.
    pub fn arb_query_error() -> impl Strategy<Value = QueryError> {
        prop_oneof![
            "[a-z ]{1,20}".prop_map(QueryError::network),
            arb_slug().prop_map(QueryError::not_found),
        ]
    }

    pub fn arb_category() -> impl Strategy<Value = Category> {
        (arb_slug(), "[A-Z][a-z]{2,12}").prop_map(|(slug, name)| Category { slug, name })
    }

    pub fn arb_item_summary() -> impl Strategy<Value = ItemSummary> {
        (1u64..100_000, "[A-Za-z ]{3,24}", proptest::option::of(arb_item_id_string())).prop_map(
            |(id, name, external_id)| ItemSummary {
                id,
                name,
                external_id,
                image_url: None,
            },
        )
    }

    /// A page whose `next` link agrees with `has_next`.
    pub fn arb_item_page(has_next: bool) -> impl Strategy<Value = ItemPage> {
        prop::collection::vec(arb_item_summary(), 0..5).prop_map(move |results| ItemPage {
            count: results.len() as u64,
            previous: None,
            next: has_next.then(|| "/api/items?page=2".to_string()),
            results,
        })
    }

    pub fn arb_price_point() -> impl Strategy<Value = PricePoint> {
        (1u32..1_000_000, 0i64..3650).prop_map(|(value, days)| PricePoint {
            value: f64::from(value),
            date: fixtures::epoch().date_naive() + chrono::Duration::days(days),
        })
    }

    pub fn arb_item_detail() -> impl Strategy<Value = ItemDetail> {
        (
            "[A-Za-z ]{3,24}",
            prop::collection::vec(arb_price_point(), 0..10),
        )
            .prop_map(|(name, prices)| ItemDetail {
                name,
                image_url: "https://cdn.example/item.jpg".to_string(),
                external_id: None,
                prices,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built payloads and times for common scenarios.

    use super::*;

    /// Fixed start time used by [`ManualClock::at_epoch`].
    pub fn epoch() -> Timestamp {
        Utc.with_ymd_and_hms(2020, 5, 26, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn categories() -> Vec<Category> {
        vec![
            Category {
                slug: "electronics".to_string(),
                name: "Electronics".to_string(),
            },
            Category {
                slug: "home".to_string(),
                name: "Home".to_string(),
            },
        ]
    }

    pub fn subcategories(parent: &str) -> Vec<Category> {
        ["phones", "laptops", "monitors"]
            .iter()
            .map(|name| Category {
                slug: format!("{}-{}", parent, name),
                name: name.to_string(),
            })
            .collect()
    }

    /// Page `page` of a listing with `total_pages` pages of two items each.
    pub fn item_page(page: u32, total_pages: u32) -> ItemPage {
        let first = u64::from(page.saturating_sub(1)) * 2;
        ItemPage {
            count: u64::from(total_pages) * 2,
            previous: (page > 1).then(|| format!("/api/items?page={}", page - 1)),
            next: (page < total_pages).then(|| format!("/api/items?page={}", page + 1)),
            results: (first + 1..=first + 2)
                .map(|id| ItemSummary {
                    id,
                    name: format!("Item {}", id),
                    external_id: Some(format!("{}", 193_991_500 + id)),
                    image_url: None,
                })
                .collect(),
        }
    }

    pub fn item_detail() -> ItemDetail {
        let day = |d| {
            chrono::NaiveDate::from_ymd_opt(2020, 5, d).unwrap_or_else(|| epoch().date_naive())
        };
        ItemDetail {
            name: "LED Monitor 27\"".to_string(),
            image_url: "https://cdn.example/193991548.jpg".to_string(),
            external_id: Some("193991548".to_string()),
            prices: vec![
                PricePoint {
                    value: 23.0,
                    date: day(26),
                },
                PricePoint {
                    value: 22.0,
                    date: day(27),
                },
                PricePoint {
                    value: 18.0,
                    date: day(31),
                },
            ],
        }
    }

    /// Coordinator over a manual clock with default windows.
    pub fn coordinator<T>(clock: &ManualClock) -> RequestCoordinator<T>
    where
        T: Send + Sync + 'static,
    {
        RequestCoordinator::with_clock(CachePolicy::default(), clock.shared())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over query snapshots.

    use super::*;
    use std::fmt::Debug;

    /// Assert a SUCCESS snapshot carrying `expected`.
    #[track_caller]
    pub fn assert_success<T: Debug + PartialEq>(snapshot: &QuerySnapshot<T>, expected: &T) {
        assert_eq!(
            snapshot.status,
            QueryStatus::Success,
            "Expected success, got: {:?}",
            snapshot
        );
        assert_eq!(snapshot.data(), Some(expected));
        assert!(snapshot.error.is_none(), "Success carries error: {:?}", snapshot);
    }

    /// Assert a LOADING snapshot with no data.
    #[track_caller]
    pub fn assert_loading<T: Debug>(snapshot: &QuerySnapshot<T>) {
        assert_eq!(
            snapshot.status,
            QueryStatus::Loading,
            "Expected loading, got: {:?}",
            snapshot
        );
        assert!(snapshot.data.is_none(), "Loading carries data: {:?}", snapshot);
    }

    /// Assert an ERROR snapshot whose error satisfies `kind`.
    #[track_caller]
    pub fn assert_error<T: Debug>(snapshot: &QuerySnapshot<T>, kind: fn(&QueryError) -> bool) {
        match &snapshot.error {
            Some(error) if snapshot.status == QueryStatus::Error => {
                assert!(kind(error), "Unexpected error kind: {:?}", error);
            }
            _ => panic!("Expected error, got: {:?}", snapshot),
        }
    }

    /// Assert that no subscriber could ever see a cancellation.
    #[track_caller]
    pub fn assert_not_cancelled<T: Debug>(snapshot: &QuerySnapshot<T>) {
        if let Some(error) = &snapshot.error {
            assert!(!error.is_cancelled(), "Cancellation surfaced: {:?}", snapshot);
        }
    }
}
