//! Query snapshots as observed by subscribers.

use std::sync::Arc;

use pricewatch_core::{QueryError, QueryStatus, Timestamp};

use crate::store::CacheEntry;

/// What a subscriber sees for one key at one instant.
///
/// Every subscriber of a key observes the same sequence of snapshots.
#[derive(Debug)]
pub struct QuerySnapshot<T> {
    pub status: QueryStatus,
    /// Latest successful payload, also kept while a refetch is running.
    pub data: Option<Arc<T>>,
    /// Set only when `status` is `Error`.
    pub error: Option<QueryError>,
    /// When `data` or `error` was produced.
    pub fetched_at: Option<Timestamp>,
    /// A request for this key is outstanding.
    pub is_fetching: bool,
}

impl<T> Clone for QuerySnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            is_fetching: self.is_fetching,
        }
    }
}

impl<T> QuerySnapshot<T> {
    /// Snapshot for a key with no usable entry.
    pub fn loading(is_fetching: bool) -> Self {
        Self {
            status: QueryStatus::Loading,
            data: None,
            error: None,
            fetched_at: None,
            is_fetching,
        }
    }

    /// Snapshot derived from the stored entry, or its absence.
    pub fn from_entry(entry: Option<&CacheEntry<T>>, is_fetching: bool) -> Self {
        match entry {
            Some(entry) if entry.status.is_settled() => Self {
                status: entry.status,
                data: entry.data.clone(),
                error: entry.error.clone(),
                fetched_at: Some(entry.fetched_at),
                is_fetching,
            },
            _ => Self::loading(is_fetching),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// No request is outstanding and the status is final.
    pub fn is_settled(&self) -> bool {
        self.status.is_settled() && !self.is_fetching
    }

    /// Borrow the payload.
    pub fn data(&self) -> Option<&T> {
        self.data.as_deref()
    }
}
