//! Structural cache keys.
//!
//! A [`CacheKey`] is an ordered tuple of string parts: the resource name
//! first, followed by its parameters. Two keys are equal when every part is
//! equal, in order, so `("items", "2", "phones")` and `("items", "phones", "2")`
//! address different entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Separator used when rendering a key for logs.
const DISPLAY_SEPARATOR: char = ':';

/// Ordered, structurally-compared cache key. Always has a resource part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CacheKey {
    parts: Vec<String>,
}

/// Rejection of a key with no parts.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Cache key needs at least a resource name")]
pub struct EmptyKeyError;

impl TryFrom<Vec<String>> for CacheKey {
    type Error = EmptyKeyError;

    fn try_from(parts: Vec<String>) -> Result<Self, Self::Error> {
        if parts.is_empty() {
            Err(EmptyKeyError)
        } else {
            Ok(Self { parts })
        }
    }
}

impl From<CacheKey> for Vec<String> {
    fn from(key: CacheKey) -> Self {
        key.parts
    }
}

impl CacheKey {
    /// Create a key for a resource with no parameters yet.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            parts: vec![resource.into()],
        }
    }

    /// Append a parameter to the key.
    pub fn with(mut self, part: impl ToString) -> Self {
        self.parts.push(part.to_string());
        self
    }

    /// Build a key from an iterator of parts. Returns `None` for an empty iterator.
    pub fn from_parts<I, S>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        Self::try_from(parts).ok()
    }

    /// The resource name (first part).
    pub fn resource(&self) -> &str {
        &self.parts[0]
    }

    /// Parameters after the resource name.
    pub fn params(&self) -> &[String] {
        &self.parts[1..]
    }

    /// All parts, resource first.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// True if this key belongs to the given resource namespace.
    pub fn is_resource(&self, resource: &str) -> bool {
        self.resource() == resource
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", DISPLAY_SEPARATOR)?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// Build a [`CacheKey`] from a resource and any number of displayable parts.
///
/// ```
/// use pricewatch_core::cache_key;
///
/// let key = cache_key!("items", 2, "phones");
/// assert_eq!(key.to_string(), "items:2:phones");
/// ```
#[macro_export]
macro_rules! cache_key {
    ($resource:expr) => {
        $crate::CacheKey::new($resource)
    };
    ($resource:expr, $($part:expr),+ $(,)?) => {{
        let key = $crate::CacheKey::new($resource);
        $(
            let key = key.with(&$part);
        )+
        key
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_is_structural() {
        let a = CacheKey::new("items").with(1).with("phones");
        let b = CacheKey::new("items").with("1").with("phones");
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_order_matters() {
        let a = CacheKey::new("items").with(1).with("phones");
        let b = CacheKey::new("items").with("phones").with(1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_accessors() {
        let key = cache_key!("items", 3, "laptops");
        assert_eq!(key.resource(), "items");
        assert_eq!(key.params(), &["3".to_string(), "laptops".to_string()]);
        assert!(key.is_resource("items"));
        assert!(!key.is_resource("item"));
    }

    #[test]
    fn test_key_display() {
        let key = cache_key!("item", "193991548");
        assert_eq!(key.to_string(), "item:193991548");
        assert_eq!(cache_key!("categories").to_string(), "categories");
    }

    #[test]
    fn test_from_parts_rejects_empty() {
        assert!(CacheKey::from_parts(Vec::<String>::new()).is_none());
        let key = CacheKey::from_parts(["subcategories", "electronics"]).unwrap();
        assert_eq!(key, cache_key!("subcategories", "electronics"));
    }

    #[test]
    fn test_deserialize_rejects_empty_key() {
        let empty = serde_json::from_str::<CacheKey>(r#"[]"#);
        assert!(empty.is_err());

        let key = cache_key!("items", 2, "phones");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"["items","2","phones"]"#);
        let back: CacheKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back.resource(), "items");
        assert_eq!(back, key);
    }
}
