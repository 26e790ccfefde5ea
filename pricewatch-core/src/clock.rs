//! Time source abstraction.
//!
//! Everything that stamps or ages cache entries takes an `Arc<dyn Clock>` so
//! tests can drive time by hand.

use crate::Timestamp;
use chrono::Utc;
use std::time::Duration;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Elapsed time between `since` and `now`, saturating at zero when the clock
/// has moved backwards.
pub fn elapsed_between(since: Timestamp, now: Timestamp) -> Duration {
    now.signed_duration_since(since)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
