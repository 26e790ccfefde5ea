//! Plain-text rendering of API payloads for the terminal.

use std::fmt::Write as _;

use pricewatch_core::{format_price, Category, ItemDetail, ItemPage};

pub fn render_categories(categories: &[Category]) -> String {
    let mut out = String::new();
    for category in categories {
        let _ = writeln!(out, "{:<24} {}", category.slug, category.name);
    }
    out
}

/// One listing page with its position.
pub fn render_page(page: u32, items: &ItemPage) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "-- page {} ({} items total) --", page, items.count);
    for item in &items.results {
        let _ = writeln!(out, "{:>12}  {}", item.id, item.name);
    }
    out
}

/// Item name, last price and the full price history, newest first.
pub fn render_item(item: &ItemDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", item.name);
    match item.last_price() {
        Some(last) => {
            let _ = writeln!(out, "Last price: {} ({})", format_price(last.value), last.date);
        }
        None => {
            let _ = writeln!(out, "No prices recorded");
        }
    }
    for point in item.prices.iter().rev() {
        let _ = writeln!(out, "  {}  {}", point.date, format_price(point.value));
    }
    out
}
