//! Freshness policy for cached queries.
//!
//! Two windows govern an entry's life. Inside `stale_after` it is served
//! with no network call. Past `stale_after` it is still served, but a
//! background refetch is started. Past `cache_time` it is treated as absent.

use std::time::Duration;

/// Default window during which a successful entry is served as-is.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(6);

/// Default lifetime after which an entry is treated as absent.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(60);

/// Staleness and expiry windows applied to an entry when it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age after which a successful entry triggers a background refetch.
    pub stale_after: Duration,
    /// Age after which an entry is treated as absent.
    pub cache_time: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            cache_time: DEFAULT_CACHE_TIME,
        }
    }
}

impl CachePolicy {
    /// Create a policy with default windows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the staleness window.
    pub fn with_stale_after(mut self, duration: Duration) -> Self {
        self.stale_after = duration;
        self
    }

    /// Set the hard cache lifetime.
    pub fn with_cache_time(mut self, duration: Duration) -> Self {
        self.cache_time = duration;
        self
    }
}

/// Per-call overrides for [`crate::RequestCoordinator::ensure`].
///
/// Unset windows fall back to the coordinator's policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_after: Option<Duration>,
    pub cache_time: Option<Duration>,
    /// Skip the staleness check and fetch even when a fresh entry exists.
    pub force: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for an explicit refetch.
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn with_stale_after(mut self, duration: Duration) -> Self {
        self.stale_after = Some(duration);
        self
    }

    pub fn with_cache_time(mut self, duration: Duration) -> Self {
        self.cache_time = Some(duration);
        self
    }

    /// Merge these overrides onto a base policy.
    pub fn resolve(&self, base: &CachePolicy) -> CachePolicy {
        CachePolicy {
            stale_after: self.stale_after.unwrap_or(base.stale_after),
            cache_time: self.cache_time.unwrap_or(base.cache_time),
        }
    }
}
