//! In-memory cache store.
//!
//! Maps a [`CacheKey`] to the latest [`CacheEntry`] for that key. Entries are
//! immutable once written: every update replaces the whole `Arc<CacheEntry>`,
//! so a reader holding an entry always sees a consistent value.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use pricewatch_core::{elapsed_between, CacheKey, QueryError, QueryStatus, Timestamp};
use tracing::debug;

use crate::policy::CachePolicy;

// ============================================================================
// ENTRY
// ============================================================================

/// Cached state of one key.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: CacheKey,
    /// Payload of the last successful fetch. Absent for LOADING and ERROR.
    pub data: Option<Arc<T>>,
    /// Failure recorded by the last authoritative fetch, ERROR only.
    pub error: Option<QueryError>,
    pub fetched_at: Timestamp,
    pub status: QueryStatus,
    pub stale_after: Duration,
    pub cache_time: Duration,
    /// Set by explicit invalidation; forces the next read to revalidate.
    pub invalidated: bool,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            status: self.status,
            stale_after: self.stale_after,
            cache_time: self.cache_time,
            invalidated: self.invalidated,
        }
    }
}

impl<T> CacheEntry<T> {
    /// Placeholder written while the first request for a key is outstanding.
    pub fn loading(key: CacheKey, now: Timestamp, policy: &CachePolicy) -> Self {
        Self::build(key, None, None, QueryStatus::Loading, now, policy)
    }

    pub fn success(key: CacheKey, data: Arc<T>, now: Timestamp, policy: &CachePolicy) -> Self {
        Self::build(key, Some(data), None, QueryStatus::Success, now, policy)
    }

    pub fn failure(key: CacheKey, error: QueryError, now: Timestamp, policy: &CachePolicy) -> Self {
        Self::build(key, None, Some(error), QueryStatus::Error, now, policy)
    }

    fn build(
        key: CacheKey,
        data: Option<Arc<T>>,
        error: Option<QueryError>,
        status: QueryStatus,
        now: Timestamp,
        policy: &CachePolicy,
    ) -> Self {
        Self {
            key,
            data,
            error,
            fetched_at: now,
            status,
            stale_after: policy.stale_after,
            cache_time: policy.cache_time,
            invalidated: false,
        }
    }

    /// Copy of this entry flagged for revalidation.
    pub fn invalidate(&self) -> Self {
        Self {
            invalidated: true,
            ..self.clone()
        }
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: Timestamp) -> Duration {
        elapsed_between(self.fetched_at, now)
    }

    /// `now - fetched_at > stale_after`, or explicitly invalidated.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        self.invalidated || self.age(now) > self.stale_after
    }

    /// Past the hard lifetime; readers treat the entry as absent.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.age(now) > self.cache_time
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found live SUCCESS data.
    pub hits: u64,
    /// Lookups that found nothing, an expired entry, or an entry without
    /// data (LOADING or ERROR).
    pub misses: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Entries dropped by the size cap or by expiry.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Keyed map of cache entries with optional size cap.
///
/// Without a cap the store grows with the set of distinct keys, which the
/// application bounds (categories, pages, item ids). With a cap, writing a
/// new key beyond the limit evicts the entry with the oldest `fetched_at`.
pub struct CacheStore<T> {
    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry<T>>>>,
    stats: RwLock<CacheStats>,
    max_entries: Option<usize>,
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CacheStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            max_entries: None,
        }
    }

    /// Cap the number of stored entries. A cap of zero is treated as one.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max.max(1));
        self
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, Arc<CacheEntry<T>>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, Arc<CacheEntry<T>>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pure lookup.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry<T>>> {
        self.read().get(key).cloned()
    }

    /// Lookup on behalf of a reader at `now`.
    ///
    /// Records a hit only for a SUCCESS entry. A LOADING or ERROR entry is
    /// returned but counted as a miss. An expired entry is removed and
    /// reported as a miss.
    pub fn lookup(&self, key: &CacheKey, now: Timestamp) -> Option<Arc<CacheEntry<T>>> {
        let found = self.get(key);
        match found {
            Some(entry) if entry.is_expired(now) => {
                debug!(key = %key, age_ms = entry.age(now).as_millis() as u64, "Cache entry expired");
                self.remove_if_same(&entry);
                self.record(|s| {
                    s.misses += 1;
                    s.evictions += 1;
                });
                None
            }
            Some(entry) if entry.status.is_success() => {
                self.record(|s| s.hits += 1);
                Some(entry)
            }
            Some(entry) => {
                self.record(|s| s.misses += 1);
                Some(entry)
            }
            None => {
                self.record(|s| s.misses += 1);
                None
            }
        }
    }

    /// Replace the entry for `entry.key`.
    pub fn put(&self, entry: CacheEntry<T>) -> Arc<CacheEntry<T>> {
        let entry = Arc::new(entry);
        let mut evicted = 0u64;
        let len = {
            let mut entries = self.write();
            let is_new = entries
                .insert(entry.key.clone(), Arc::clone(&entry))
                .is_none();
            if let (true, Some(max)) = (is_new, self.max_entries) {
                while entries.len() > max {
                    let oldest = entries
                        .iter()
                        .filter(|(k, _)| **k != entry.key)
                        .min_by_key(|(_, e)| e.fetched_at)
                        .map(|(k, _)| k.clone());
                    match oldest {
                        Some(k) => {
                            debug!(key = %k, "Evicting oldest cache entry");
                            entries.remove(&k);
                            evicted += 1;
                        }
                        None => break,
                    }
                }
            }
            entries.len()
        };
        self.record(|s| {
            s.evictions += evicted;
            s.entry_count = len as u64;
        });
        entry
    }

    /// Remove the entry for `key`, returning it if present.
    pub fn evict(&self, key: &CacheKey) -> Option<Arc<CacheEntry<T>>> {
        let (removed, len) = {
            let mut entries = self.write();
            let removed = entries.remove(key);
            (removed, entries.len())
        };
        self.record(|s| s.entry_count = len as u64);
        removed
    }

    /// Remove `entry` only if it is still the stored value for its key.
    fn remove_if_same(&self, entry: &Arc<CacheEntry<T>>) {
        let len = {
            let mut entries = self.write();
            if entries
                .get(&entry.key)
                .is_some_and(|current| Arc::ptr_eq(current, entry))
            {
                entries.remove(&entry.key);
            }
            entries.len()
        };
        self.record(|s| s.entry_count = len as u64);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.read().contains_key(key)
    }

    /// Snapshot of the stored keys, in no particular order.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.read().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.write().clear();
        self.record(|s| s.entry_count = 0);
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pricewatch_core::cache_key;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> Timestamp {
        t0() + chrono::Duration::seconds(secs)
    }

    fn success(key: CacheKey, value: u32, now: Timestamp) -> CacheEntry<u32> {
        CacheEntry::success(key, Arc::new(value), now, &CachePolicy::default())
    }

    #[test]
    fn test_put_get_replaces_whole_entry() {
        let store = CacheStore::new();
        let key = cache_key!("item", "193991548");

        let first = store.put(success(key.clone(), 1, t0()));
        let second = store.put(success(key.clone(), 2, at(1)));

        let current = store.get(&key).unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert_eq!(*first.data.clone().unwrap(), 1);
        assert_eq!(*current.data.clone().unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_is_pure() {
        let store: CacheStore<u32> = CacheStore::new();
        let key = cache_key!("categories");
        assert!(store.get(&key).is_none());
        store.put(success(key.clone(), 1, t0()));
        store.get(&key);
        assert_eq!(store.stats().hits, 0);
        assert_eq!(store.stats().misses, 0);
    }

    #[test]
    fn test_staleness_boundaries() {
        let entry = success(cache_key!("categories"), 1, t0());
        assert!(!entry.is_stale(at(6)));
        assert!(entry.is_stale(at(7)));
        assert!(!entry.is_expired(at(60)));
        assert!(entry.is_expired(at(61)));

        assert!(entry.invalidate().is_stale(t0()));
    }

    #[test]
    fn test_clock_skew_is_fresh() {
        let entry = success(cache_key!("categories"), 1, at(10));
        assert_eq!(entry.age(t0()), Duration::ZERO);
        assert!(!entry.is_stale(t0()));
    }

    #[test]
    fn test_lookup_drops_expired() {
        let store = CacheStore::new();
        let key = cache_key!("items", 1, "phones");
        store.put(success(key.clone(), 7, t0()));

        assert!(store.lookup(&key, at(30)).is_some());
        assert!(store.lookup(&key, at(61)).is_none());
        assert!(!store.contains(&key));

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entry_count, 0);
        assert!((stats.hit_rate() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_lookup_counts_only_success_as_hit() {
        let store = CacheStore::new();
        let policy = CachePolicy::default();
        let loading = cache_key!("item", "193991548");
        let failed = cache_key!("categories");
        store.put(CacheEntry::<u32>::loading(loading.clone(), t0(), &policy));
        store.put(CacheEntry::<u32>::failure(
            failed.clone(),
            QueryError::network("timeout"),
            t0(),
            &policy,
        ));

        assert!(store.lookup(&loading, at(1)).is_some());
        assert!(store.lookup(&failed, at(1)).is_some());
        assert_eq!(store.stats().hits, 0);
        assert_eq!(store.stats().misses, 2);

        store.put(success(failed.clone(), 3, at(2)));
        store.lookup(&failed, at(3));
        assert_eq!(store.stats().hits, 1);
        assert_eq!(store.stats().misses, 2);
    }

    #[test]
    fn test_stats_survive_poisoned_lock() {
        let store: CacheStore<u32> = CacheStore::new();
        let key = cache_key!("categories");
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _stats = store.stats.write().unwrap_or_else(PoisonError::into_inner);
            panic!("panic while recording");
        }));
        assert!(poisoned.is_err());
        assert!(store.stats.is_poisoned());

        store.lookup(&key, t0());
        store.put(success(key.clone(), 1, t0()));
        store.lookup(&key, t0());

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_evict() {
        let store = CacheStore::new();
        let key = cache_key!("item", "193991548");
        store.put(CacheEntry::<u32>::failure(
            key.clone(),
            QueryError::network("reset"),
            t0(),
            &CachePolicy::default(),
        ));
        let removed = store.evict(&key).unwrap();
        assert_eq!(removed.status, QueryStatus::Error);
        assert!(store.is_empty());
        assert!(store.evict(&key).is_none());
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let store = CacheStore::new().with_max_entries(2);
        store.put(success(cache_key!("items", 1, "a"), 1, at(5)));
        store.put(success(cache_key!("items", 2, "a"), 2, t0()));
        store.put(success(cache_key!("items", 3, "a"), 3, at(10)));

        assert_eq!(store.len(), 2);
        assert!(!store.contains(&cache_key!("items", 2, "a")));
        assert!(store.contains(&cache_key!("items", 3, "a")));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_cap_keeps_overwrites() {
        let store = CacheStore::new().with_max_entries(1);
        let key = cache_key!("categories");
        store.put(success(key.clone(), 1, t0()));
        store.put(success(key.clone(), 2, at(1)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().evictions, 0);
    }
}
