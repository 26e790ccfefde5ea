//! Payload types returned by the price-tracker API.
//!
//! The cache engine treats these as opaque values; only the paginator looks
//! inside a page, through the [`Paged`] trait.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Payloads that carry pagination metadata.
pub trait Paged {
    /// Whether the server reports a page after this one.
    fn has_next(&self) -> bool;
}

// ============================================================================
// CATEGORIES
// ============================================================================

/// A category or subcategory node in the browse tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Path segment used to address the category. The backend calls it `url`.
    #[serde(alias = "url")]
    pub slug: String,
    pub name: String,
}

// ============================================================================
// ITEMS
// ============================================================================

/// Row of a paginated item listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// One page of items for a subcategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<ItemSummary>,
}

impl Paged for ItemPage {
    fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// A single observed price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub value: f64,
    pub date: NaiveDate,
}

/// Full item record with its price history, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub name: String,
    pub image_url: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub prices: Vec<PricePoint>,
}

impl ItemDetail {
    /// Most recent price point, if any were recorded.
    pub fn last_price(&self) -> Option<&PricePoint> {
        self.prices.last()
    }
}

/// Render a price with space-separated thousands and the currency suffix.
///
/// Fractional kopecks are kept to two places and dropped when zero.
pub fn format_price(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let sign = if negative && cents > 0 { "-" } else { "" };
    if frac == 0 {
        format!("{}{} P", sign, grouped)
    } else {
        format!("{}{}.{:02} P", sign, grouped, frac)
    }
}
