//! Pricewatch Cache - Query Cache Engine
//!
//! Given a cache key and a fetch function, the engine deduplicates concurrent
//! requests for the key, serves cached results while fresh, revalidates them
//! in the background once stale, cancels requests nobody is waiting for, and
//! reports a loading/error/success lifecycle to every subscriber.
//!
//! - [`CacheStore`]: key to entry map, whole-entry replacement.
//! - [`RequestCoordinator`]: in-flight tracking, generations, staleness.
//! - [`QueryBinding`]: a view's re-targetable subscription.
//! - [`Paginator`]: page cursor over a listing built on a binding.

pub mod binding;
pub mod coordinator;
pub mod fetcher;
pub mod paginator;
pub mod policy;
pub mod snapshot;
pub mod store;

pub use binding::{QueryBinding, Subscription};
pub use coordinator::{InFlightRequest, RequestCoordinator, MAX_CANCELLED_RESTARTS};
pub use fetcher::Fetcher;
pub use paginator::{PageCursor, PageSource, PageState, Paginator};
pub use policy::{CachePolicy, QueryOptions, DEFAULT_CACHE_TIME, DEFAULT_STALE_AFTER};
pub use snapshot::QuerySnapshot;
pub use store::{CacheEntry, CacheStats, CacheStore};
