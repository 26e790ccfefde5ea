//! Validation of free-text product input.
//!
//! The search form accepts either a bare product ID (9+ digits) or a URL on
//! the product site whose path ends in such an ID. Anything else is rejected
//! with a message that can be shown next to the input as-is. Rejected input
//! never reaches the network.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::ValidationError;
use crate::identity::{ItemId, MIN_ITEM_ID_DIGITS};

/// Host that product URLs must point to.
pub const PRODUCT_HOST: &str = "ozon.ru";

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid digits regex"));

static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?i:https?)://)?(?P<host>[^/?#\s]+)(?P<path>/[^?#\s]*)?(?:[?#]\S*)?$")
        .expect("valid url regex")
});

static PATH_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?:^|[/\-])(\d{{{},}})/?$", MIN_ITEM_ID_DIGITS))
        .expect("valid path id regex")
});

/// Turn user input into an [`ItemId`] or explain why it was rejected.
pub fn validate_item_input(input: &str) -> Result<ItemId, ValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ValidationError::Empty);
    }

    if looks_like_url(input) {
        return extract_from_url(input);
    }
    bare_id(input)
}

/// Accept `input` only if it is already a bare product ID.
fn bare_id(input: &str) -> Result<ItemId, ValidationError> {
    if input.is_empty() {
        return Err(ValidationError::Empty);
    }
    if !DIGITS.is_match(input) {
        return Err(ValidationError::NotDigits {
            min_digits: MIN_ITEM_ID_DIGITS,
        });
    }
    if input.len() < MIN_ITEM_ID_DIGITS {
        return Err(ValidationError::TooFewDigits {
            min_digits: MIN_ITEM_ID_DIGITS,
        });
    }
    Ok(ItemId::new_unchecked(input))
}

impl TryFrom<String> for ItemId {
    type Error = ValidationError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        bare_id(&id)
    }
}

impl TryFrom<&str> for ItemId {
    type Error = ValidationError;

    fn try_from(id: &str) -> Result<Self, Self::Error> {
        bare_id(id)
    }
}

fn looks_like_url(input: &str) -> bool {
    input.contains("://") || input.contains('/') || input.contains('.')
}

fn extract_from_url(input: &str) -> Result<ItemId, ValidationError> {
    let captures = URL.captures(input).ok_or(ValidationError::MissingId)?;

    let host = captures
        .name("host")
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let bare_host = host.split(':').next().unwrap_or_default();
    let bare_host = bare_host.strip_prefix("www.").unwrap_or(bare_host);
    let on_product_site =
        bare_host == PRODUCT_HOST || bare_host.ends_with(&format!(".{}", PRODUCT_HOST));
    if !on_product_site {
        return Err(ValidationError::WrongHost {
            host,
            expected: PRODUCT_HOST.to_string(),
        });
    }

    let path = captures.name("path").map(|m| m.as_str()).unwrap_or_default();
    PATH_ID
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| ItemId::new_unchecked(m.as_str()))
        .ok_or(ValidationError::MissingId)
}

/// Flat validation result in the shape the search form consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    /// Empty when valid.
    pub reason: String,
    pub extracted_id: Option<String>,
}

impl ValidationOutcome {
    pub fn check(input: &str) -> Self {
        validate_item_input(input).into()
    }
}

impl From<Result<ItemId, ValidationError>> for ValidationOutcome {
    fn from(result: Result<ItemId, ValidationError>) -> Self {
        match result {
            Ok(id) => Self {
                valid: true,
                reason: String::new(),
                extracted_id: Some(id.into_inner()),
            },
            Err(err) => Self {
                valid: false,
                reason: err.to_string(),
                extracted_id: None,
            },
        }
    }
}
