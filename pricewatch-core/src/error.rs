//! Error types for pricewatch operations

use thiserror::Error;

/// Failure of a query, as surfaced to subscribers.
///
/// `Cancelled` exists so fetchers can report an aborted transport call, but
/// the cache engine swallows it: subscribers never observe it. A key that
/// still has subscribers restarts the request instead, and reports a
/// `Network` failure once the restarts run out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Request cancelled")]
    Cancelled,
}

impl QueryError {
    /// Create a network error from any displayable reason.
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    /// Create a not-found error for a resource description.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Whether the UI should offer a retry for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Whether this is the internal cancellation marker.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the remote reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Rejection of free-text item input. Messages are meant for direct display.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Enter product's page URL or product's ID")]
    Empty,

    #[error("Product's ID should contain at least {min_digits} digits")]
    TooFewDigits { min_digits: usize },

    #[error("Product's ID should contain only digits (at least {min_digits})")]
    NotDigits { min_digits: usize },

    #[error("URL should point to {expected}, got {host}")]
    WrongHost { host: String, expected: String },

    #[error("URL should contain product's ID")]
    MissingId,
}

/// Result type alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

// =============================================================================
// TESTS
// =============================================================================
