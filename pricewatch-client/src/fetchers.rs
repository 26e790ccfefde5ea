//! Adapters that plug [`RestClient`] calls into the cache engine.
//!
//! Each fetcher owns a clone of the client. When the coordinator aborts a
//! request task the pending reqwest future is dropped with it, which closes
//! the underlying HTTP request.

use std::sync::Arc;

use pricewatch_cache::{Fetcher, PageSource};
use pricewatch_core::{Category, ItemDetail, ItemId, ItemPage, QueryError};

use crate::api_client::RestClient;

pub fn categories_fetcher(client: &RestClient) -> Arc<dyn Fetcher<Vec<Category>>> {
    let client = client.clone();
    Arc::new(move || {
        let client = client.clone();
        async move { client.categories().await.map_err(QueryError::from) }
    })
}

pub fn subcategories_fetcher(
    client: &RestClient,
    parent_slug: &str,
) -> Arc<dyn Fetcher<Vec<Category>>> {
    let client = client.clone();
    let parent = parent_slug.to_string();
    Arc::new(move || {
        let client = client.clone();
        let parent = parent.clone();
        async move { client.subcategories(&parent).await.map_err(QueryError::from) }
    })
}

pub fn items_fetcher(client: &RestClient, subcategory: &str, page: u32) -> Arc<dyn Fetcher<ItemPage>> {
    let client = client.clone();
    let subcategory = subcategory.to_string();
    Arc::new(move || {
        let client = client.clone();
        let subcategory = subcategory.clone();
        async move {
            client
                .items(&subcategory, page)
                .await
                .map_err(QueryError::from)
        }
    })
}

pub fn item_fetcher(client: &RestClient, id: &ItemId) -> Arc<dyn Fetcher<ItemDetail>> {
    let client = client.clone();
    let id = id.clone();
    Arc::new(move || {
        let client = client.clone();
        let id = id.clone();
        async move { client.item(&id).await.map_err(QueryError::from) }
    })
}

/// Item listing pages of a subcategory, for the paginator.
#[derive(Clone)]
pub struct ItemPages {
    client: RestClient,
}

impl ItemPages {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

impl PageSource<ItemPage> for ItemPages {
    fn page_fetcher(&self, filter: &str, page: u32) -> Arc<dyn Fetcher<ItemPage>> {
        items_fetcher(&self.client, filter, page)
    }
}
