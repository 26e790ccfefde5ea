//! Command implementations. Each returns the text to print on stdout.

use std::sync::Arc;

use pricewatch_cache::{PageState, QueryBinding, QuerySnapshot};
use pricewatch_core::{validate_item_input, QueryError, QueryStatus};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::cli::Command;
use crate::error::CliError;
use crate::render::{render_categories, render_item, render_page};

pub async fn run(catalog: &Catalog, command: &Command) -> Result<String, CliError> {
    match command {
        Command::Item { input } => show_item(catalog, input).await,
        Command::Categories => {
            let categories = settle(catalog.categories()).await?;
            Ok(render_categories(&categories))
        }
        Command::Subcategories { parent } => {
            let categories = settle(catalog.subcategories(parent)).await?;
            Ok(render_categories(&categories))
        }
        Command::Browse { subcategory, pages } => browse(catalog, subcategory, *pages).await,
    }
}

/// Validate `input` locally, then fetch the item. Rejected input never
/// reaches the network.
pub async fn show_item(catalog: &Catalog, input: &str) -> Result<String, CliError> {
    let id = validate_item_input(input)?;
    info!(item_id = %id, "Fetching item");
    let item = settle(catalog.item(&id)).await?;
    Ok(render_item(&item))
}

/// Walk forward through up to `max_pages` listing pages.
pub async fn browse(catalog: &Catalog, subcategory: &str, max_pages: u32) -> Result<String, CliError> {
    let mut pages = catalog.items(subcategory);
    let mut out = String::new();
    let mut shown = 0;

    loop {
        let state = pages.settled().await.clone();
        if let Some(error) = pages.take_error() {
            warn!(subcategory, error = %error, "Stopped browsing after failed page");
            out.push_str(&format!("(stopped: {})\n", error));
            break;
        }
        match state {
            PageState::Success { page, .. } => {
                if let Some(data) = pages.data() {
                    out.push_str(&render_page(page, &data));
                }
                shown += 1;
            }
            PageState::Error { error, .. } => return Err(error.into()),
            PageState::Loading { .. } => break,
        }
        if shown >= max_pages || !pages.next() {
            break;
        }
    }
    Ok(out)
}

/// Wait for the binding's first final snapshot.
async fn settle<T>(mut binding: QueryBinding<T>) -> Result<Arc<T>, CliError>
where
    T: Send + Sync + 'static,
{
    let snapshot = binding.settled().await.unwrap_or_else(|| QuerySnapshot::loading(false));
    into_data(snapshot)
}

fn into_data<T>(snapshot: QuerySnapshot<T>) -> Result<Arc<T>, CliError> {
    match (snapshot.status, snapshot.data, snapshot.error) {
        (QueryStatus::Success, Some(data), _) => Ok(data),
        (_, _, Some(error)) => Err(error.into()),
        (status, _, _) => Err(QueryError::network(format!("query ended in {:?}", status)).into()),
    }
}
