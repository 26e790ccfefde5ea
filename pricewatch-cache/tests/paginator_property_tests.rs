//! Property-Based Tests for Pagination
//!
//! Properties:
//! - Visible data never regresses to empty while a next page loads.
//! - A failed next page leaves the previous page, its `has_next` and its data
//!   in place, with the failure reported out-of-band.
//! - `has_next` follows the latest payload of the current page, even when it
//!   shrinks.
//! - `prev` never goes below page 1.

use std::collections::HashMap;
use std::sync::Arc;

use pricewatch_cache::{Fetcher, PageCursor, PageSource, PageState, Paginator, RequestCoordinator};
use pricewatch_core::{ItemPage, Paged, QueryError};
use pricewatch_test_utils::{fixtures, GatedFetcher, ManualClock, ScriptedFetcher};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use tokio::runtime::{Builder, Runtime};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Builder::new_current_thread()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

/// Page source serving a fixed fetcher per page number.
fn source_of(fetchers: HashMap<u32, Arc<dyn Fetcher<ItemPage>>>) -> Arc<dyn PageSource<ItemPage>> {
    Arc::new(move |_: &str, page: u32| -> Arc<dyn Fetcher<ItemPage>> {
        match fetchers.get(&page) {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(|| async { Err::<ItemPage, _>(QueryError::not_found("page")) }),
        }
    })
}

/// Listing with `total` pages, each answered immediately.
fn listing(total: u32) -> Arc<dyn PageSource<ItemPage>> {
    Arc::new(move |_: &str, page: u32| -> Arc<dyn Fetcher<ItemPage>> {
        Arc::new(move || async move {
            if page <= total {
                Ok(fixtures::item_page(page, total))
            } else {
                Err(QueryError::not_found(format!("page {}", page)))
            }
        })
    })
}

fn first_id(pages: &Paginator<ItemPage>) -> Option<u64> {
    pages.data().and_then(|page| page.results.first().map(|item| item.id))
}

// ============================================================================
// NAVIGATION
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_walk_forward_and_back(total in 1u32..6, back in 0u32..8) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let clock = ManualClock::at_epoch();
            let coordinator: RequestCoordinator<ItemPage> = fixtures::coordinator(&clock);
            let mut pages = Paginator::new(coordinator, "items", "phones", listing(total));

            pages.settled().await;
            while pages.next() {
                pages.settled().await;
            }
            prop_assert_eq!(pages.cursor(), PageCursor { page: total, has_next: Some(false) });

            for _ in 0..back {
                pages.prev();
                pages.settled().await;
            }
            let expected = total.saturating_sub(back).max(1);
            prop_assert_eq!(pages.page(), expected);
            prop_assert_eq!(first_id(&pages), Some(u64::from(expected - 1) * 2 + 1));
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_prev_on_first_page_is_noop() {
    let clock = ManualClock::at_epoch();
    let coordinator: RequestCoordinator<ItemPage> = fixtures::coordinator(&clock);
    let mut pages = Paginator::new(coordinator, "items", "phones", listing(3));

    assert!(!pages.prev());
    assert_eq!(pages.state(), &PageState::Loading { page: 1 });
    pages.settled().await;
    assert!(!pages.prev());
    assert_eq!(pages.page(), 1);
}

#[tokio::test]
async fn test_next_page_keeps_previous_data_visible() {
    let clock = ManualClock::at_epoch();
    let coordinator: RequestCoordinator<ItemPage> = fixtures::coordinator(&clock);
    let page2 = Arc::new(GatedFetcher::<ItemPage>::new());
    let mut fetchers: HashMap<u32, Arc<dyn Fetcher<ItemPage>>> = HashMap::new();
    fetchers.insert(1, Arc::new(|| async { Ok::<_, QueryError>(fixtures::item_page(1, 3)) }));
    fetchers.insert(2, page2.clone());
    let mut pages = Paginator::new(coordinator, "items", "phones", source_of(fetchers));
    pages.settled().await;

    assert!(pages.next());
    page2.wait_for_calls(1).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
        pages.sync();
        assert_eq!(pages.state(), &PageState::Loading { page: 2 });
        assert_eq!(first_id(&pages), Some(1));
        assert_eq!(pages.cursor().has_next, None);
    }

    assert!(page2.resolve(0, Ok(fixtures::item_page(2, 3))));
    pages.settled().await;
    assert_eq!(first_id(&pages), Some(3));
    assert_eq!(pages.data_page(), Some(2));
}

#[tokio::test]
async fn test_failed_next_returns_to_previous_page() {
    let clock = ManualClock::at_epoch();
    let coordinator: RequestCoordinator<ItemPage> = fixtures::coordinator(&clock);
    let page2 = Arc::new(GatedFetcher::<ItemPage>::new());
    let mut fetchers: HashMap<u32, Arc<dyn Fetcher<ItemPage>>> = HashMap::new();
    fetchers.insert(1, Arc::new(|| async { Ok::<_, QueryError>(fixtures::item_page(1, 3)) }));
    fetchers.insert(2, page2.clone());
    let mut pages = Paginator::new(coordinator, "items", "phones", source_of(fetchers));
    pages.settled().await;

    pages.next();
    page2.wait_for_calls(1).await;
    page2.resolve(0, Err(QueryError::network("502 Bad Gateway")));
    let state = pages.settled().await.clone();

    assert_eq!(
        state,
        PageState::Success {
            page: 1,
            has_next: true
        }
    );
    assert_eq!(first_id(&pages), Some(1));
    assert!(pages.last_error().is_some_and(QueryError::is_retryable));
    assert!(pages.take_error().is_some());
    assert!(pages.last_error().is_none());

    // Navigation stays available after the fallback.
    assert!(pages.next());
}

#[tokio::test]
async fn test_first_page_failure_is_error_state() {
    let clock = ManualClock::at_epoch();
    let coordinator: RequestCoordinator<ItemPage> = fixtures::coordinator(&clock);
    let mut pages = Paginator::new(coordinator, "items", "phones", source_of(HashMap::new()));

    let state = pages.settled().await.clone();
    assert!(matches!(state, PageState::Error { page: 1, ref error } if error.is_not_found()));
    assert!(pages.data().is_none());
    assert!(!pages.next());
}

#[tokio::test]
async fn test_has_next_follows_latest_payload() {
    let clock = ManualClock::at_epoch();
    let coordinator: RequestCoordinator<ItemPage> = fixtures::coordinator(&clock);
    let script = Arc::new(ScriptedFetcher::from_results([
        Ok(fixtures::item_page(1, 3)),
        Ok(fixtures::item_page(1, 1)),
    ]));
    let mut fetchers: HashMap<u32, Arc<dyn Fetcher<ItemPage>>> = HashMap::new();
    fetchers.insert(1, script.clone());
    let mut pages = Paginator::new(coordinator, "items", "phones", source_of(fetchers));

    pages.settled().await;
    assert_eq!(pages.cursor().has_next, Some(true));

    pages.refetch();
    pages.settled().await;
    assert_eq!(pages.cursor().has_next, Some(false));
    assert!(!pages.data().is_some_and(|page| page.has_next()));
    assert!(!pages.next());
}

#[tokio::test]
async fn test_filter_change_uses_new_key_namespace() {
    let clock = ManualClock::at_epoch();
    let coordinator: RequestCoordinator<ItemPage> = fixtures::coordinator(&clock);
    let mut pages = Paginator::new(coordinator.clone(), "items", "phones", listing(3));
    pages.settled().await;
    pages.next();
    pages.settled().await;
    let old_key = pages.key_for(2);

    pages.set_filter("laptops");
    assert_eq!(pages.state(), &PageState::Loading { page: 1 });
    assert!(pages.data().is_none());
    pages.settled().await;

    assert_eq!(pages.key_for(1).params(), &["1".to_string(), "laptops".to_string()]);
    assert!(coordinator.store().contains(&old_key));
    assert_eq!(coordinator.subscriber_count(&old_key), 0);
}
