//! Pricewatch Core - Shared Types
//!
//! Cache keys, query lifecycle enums, error taxonomy, API payloads and input
//! validation. Every other pricewatch crate depends on this one; it has no
//! async or I/O of its own.

pub mod clock;
pub mod enums;
pub mod error;
pub mod identity;
pub mod key;
pub mod payload;
pub mod validation;

pub use clock::{elapsed_between, Clock, SystemClock};
pub use enums::QueryStatus;
pub use error::{QueryError, QueryResult, ValidationError};
pub use identity::{ItemId, Timestamp, MIN_ITEM_ID_DIGITS};
pub use key::{CacheKey, EmptyKeyError};
pub use payload::{
    format_price, Category, ItemDetail, ItemPage, ItemSummary, Paged, PricePoint,
};
pub use validation::{validate_item_input, ValidationOutcome, PRODUCT_HOST};

// ============================================================================
// CACHE KEY CONSTRUCTORS
// ============================================================================

/// Resource names used as the first part of every cache key.
pub mod resources {
    pub const CATEGORIES: &str = "categories";
    pub const SUBCATEGORIES: &str = "subcategories";
    pub const ITEMS: &str = "items";
    pub const ITEM: &str = "item";
}

/// Key for the top-level category list.
pub fn categories_key() -> CacheKey {
    CacheKey::new(resources::CATEGORIES)
}

/// Key for the children of a category, fetched on first expansion.
pub fn subcategories_key(parent_slug: &str) -> CacheKey {
    CacheKey::new(resources::SUBCATEGORIES).with(parent_slug)
}

/// Key for one page of a subcategory's item listing.
pub fn items_page_key(page: u32, subcategory: &str) -> CacheKey {
    CacheKey::new(resources::ITEMS).with(page).with(subcategory)
}

/// Key for a single item's detail and price history.
pub fn item_key(id: &ItemId) -> CacheKey {
    CacheKey::new(resources::ITEM).with(id)
}
