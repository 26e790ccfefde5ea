//! Enum types for query lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// QUERY LIFECYCLE
// ============================================================================

/// Three-state lifecycle of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// A request is outstanding and no successful payload exists.
    Loading,
    /// The last authoritative request failed and no successful payload exists.
    Error,
    /// A payload is available.
    Success,
}

impl QueryStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether a request for this status has settled.
    pub fn is_settled(&self) -> bool {
        !self.is_loading()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loading" => Ok(Self::Loading),
            "error" => Ok(Self::Error),
            "success" => Ok(Self::Success),
            other => Err(format!("unknown query status: {}", other)),
        }
    }
}
