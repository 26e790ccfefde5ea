//! Page-by-page navigation over a paginated resource.
//!
//! A [`Paginator`] owns one [`QueryBinding`] and moves it across the page
//! keys `(resource, page, filter)`. The last successfully loaded page stays
//! visible while another page loads, and a failed forward move falls back
//! to it with the error reported through [`Paginator::last_error`].

use std::sync::Arc;

use pricewatch_core::{CacheKey, Paged, QueryError, QueryStatus};
use tracing::debug;

use crate::binding::QueryBinding;
use crate::coordinator::RequestCoordinator;
use crate::fetcher::Fetcher;
use crate::snapshot::QuerySnapshot;

/// Supplies the fetcher for one page of a filtered listing.
pub trait PageSource<T>: Send + Sync {
    fn page_fetcher(&self, filter: &str, page: u32) -> Arc<dyn Fetcher<T>>;
}

impl<T, F> PageSource<T> for F
where
    F: Fn(&str, u32) -> Arc<dyn Fetcher<T>> + Send + Sync,
{
    fn page_fetcher(&self, filter: &str, page: u32) -> Arc<dyn Fetcher<T>> {
        (self)(filter, page)
    }
}

/// Where the paginator is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Loading { page: u32 },
    Error { page: u32, error: QueryError },
    Success { page: u32, has_next: bool },
}

impl PageState {
    pub fn page(&self) -> u32 {
        match self {
            Self::Loading { page } | Self::Error { page, .. } | Self::Success { page, .. } => *page,
        }
    }

    pub fn status(&self) -> QueryStatus {
        match self {
            Self::Loading { .. } => QueryStatus::Loading,
            Self::Error { .. } => QueryStatus::Error,
            Self::Success { .. } => QueryStatus::Success,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

/// Current page and whether a next page exists; `has_next` is unknown until
/// the page has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u32,
    pub has_next: Option<bool>,
}

struct Committed<T> {
    page: u32,
    has_next: bool,
    data: Arc<T>,
}

/// Cursor over the pages of one resource under one filter.
pub struct Paginator<T>
where
    T: Paged + Send + Sync + 'static,
{
    binding: QueryBinding<T>,
    source: Arc<dyn PageSource<T>>,
    resource: String,
    filter: String,
    page: u32,
    state: PageState,
    committed: Option<Committed<T>>,
    last_error: Option<QueryError>,
}

impl<T> Paginator<T>
where
    T: Paged + Send + Sync + 'static,
{
    /// Start on page 1 of `resource` filtered by `filter`.
    pub fn new(
        coordinator: RequestCoordinator<T>,
        resource: impl Into<String>,
        filter: impl Into<String>,
        source: Arc<dyn PageSource<T>>,
    ) -> Self {
        let mut paginator = Self {
            binding: QueryBinding::new(coordinator),
            source,
            resource: resource.into(),
            filter: filter.into(),
            page: 1,
            state: PageState::Loading { page: 1 },
            committed: None,
            last_error: None,
        };
        paginator.load(1);
        paginator
    }

    /// Cache key of `page` under the current filter.
    pub fn key_for(&self, page: u32) -> CacheKey {
        CacheKey::new(self.resource.as_str())
            .with(page)
            .with(&self.filter)
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn cursor(&self) -> PageCursor {
        let has_next = match self.state {
            PageState::Success { has_next, .. } => Some(has_next),
            _ => None,
        };
        PageCursor {
            page: self.page,
            has_next,
        }
    }

    /// Payload on screen: the last page that loaded successfully.
    pub fn data(&self) -> Option<Arc<T>> {
        self.committed.as_ref().map(|c| Arc::clone(&c.data))
    }

    /// Page whose payload [`Self::data`] returns.
    pub fn data_page(&self) -> Option<u32> {
        self.committed.as_ref().map(|c| c.page)
    }

    /// Failure of the last forward move, if it fell back.
    pub fn last_error(&self) -> Option<&QueryError> {
        self.last_error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<QueryError> {
        self.last_error.take()
    }

    /// Move to the next page. Only allowed once the current page has loaded
    /// and reported a successor; returns whether the move happened.
    pub fn next(&mut self) -> bool {
        match self.state {
            PageState::Success {
                page,
                has_next: true,
            } => {
                self.last_error = None;
                self.load(page + 1);
                true
            }
            _ => false,
        }
    }

    /// Move to the previous page. A no-op on page 1.
    pub fn prev(&mut self) -> bool {
        if self.page <= 1 {
            return false;
        }
        self.last_error = None;
        self.load(self.page - 1);
        true
    }

    /// Switch to another filter, back on page 1. Pages of the old filter stay
    /// cached under their own keys.
    pub fn set_filter(&mut self, filter: impl Into<String>) -> bool {
        let filter = filter.into();
        if filter == self.filter {
            return false;
        }
        debug!(resource = %self.resource, from = %self.filter, to = %filter, "Changing filter");
        self.filter = filter;
        self.committed = None;
        self.last_error = None;
        self.load(1);
        true
    }

    /// Fetch the current page again.
    pub fn refetch(&mut self) -> &PageState {
        self.last_error = None;
        if let Some(snapshot) = self.binding.refetch() {
            self.apply(snapshot);
        }
        &self.state
    }

    /// Reconcile with the binding's latest snapshot.
    pub fn sync(&mut self) -> &PageState {
        if let Some(snapshot) = self.binding.snapshot() {
            self.apply(snapshot);
        }
        &self.state
    }

    /// Wait for the next snapshot of the current page and reconcile.
    pub async fn changed(&mut self) -> Option<&PageState> {
        let snapshot = self.binding.changed().await?;
        self.apply(snapshot);
        Some(&self.state)
    }

    /// Wait until the current page has finished loading.
    pub async fn settled(&mut self) -> &PageState {
        loop {
            match self.binding.settled().await {
                Some(snapshot) => self.apply(snapshot),
                None => break,
            }
            if !self.state.is_loading() {
                break;
            }
        }
        &self.state
    }

    fn load(&mut self, page: u32) {
        self.page = page;
        let key = self.key_for(page);
        let fetcher = self.source.page_fetcher(&self.filter, page);
        let snapshot = self.binding.bind(key, fetcher);
        self.apply(snapshot);
    }

    fn apply(&mut self, snapshot: QuerySnapshot<T>) {
        match (snapshot.status, snapshot.data, snapshot.error) {
            (QueryStatus::Success, Some(data), _) => {
                let has_next = data.has_next();
                self.committed = Some(Committed {
                    page: self.page,
                    has_next,
                    data,
                });
                self.state = PageState::Success {
                    page: self.page,
                    has_next,
                };
            }
            (QueryStatus::Error, _, Some(error)) => {
                let fallback = self
                    .committed
                    .as_ref()
                    .filter(|c| c.page != self.page)
                    .map(|c| (c.page, c.has_next));
                match fallback {
                    Some((page, has_next)) => {
                        debug!(
                            resource = %self.resource,
                            failed_page = self.page,
                            page,
                            error = %error,
                            "Page load failed, keeping previous page"
                        );
                        self.last_error = Some(error);
                        self.page = page;
                        self.state = PageState::Success { page, has_next };
                        let key = self.key_for(page);
                        let fetcher = self.source.page_fetcher(&self.filter, page);
                        self.binding.bind(key, fetcher);
                    }
                    None => {
                        self.state = PageState::Error {
                            page: self.page,
                            error,
                        };
                    }
                }
            }
            _ => {
                self.state = PageState::Loading { page: self.page };
            }
        }
    }
}
