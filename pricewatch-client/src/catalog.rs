//! One cache engine per payload type, wired to the REST client.

use std::sync::Arc;

use pricewatch_cache::{
    CachePolicy, CacheStats, CacheStore, Paginator, QueryBinding, RequestCoordinator,
};
use pricewatch_core::{
    categories_key, item_key, resources, subcategories_key, Category, Clock, ItemDetail, ItemId,
    ItemPage, SystemClock,
};

use crate::api_client::{ClientError, RestClient};
use crate::config::ClientConfig;
use crate::fetchers::{categories_fetcher, item_fetcher, subcategories_fetcher, ItemPages};

/// Categories and subcategories share a coordinator; their keys never overlap.
#[derive(Clone)]
pub struct Catalog {
    client: RestClient,
    categories: RequestCoordinator<Vec<Category>>,
    items: RequestCoordinator<ItemPage>,
    item: RequestCoordinator<ItemDetail>,
}

impl Catalog {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = RestClient::new(config)?;
        Ok(Self::with_clock(
            client,
            config.cache_policy(),
            config.cache.max_entries,
            Arc::new(SystemClock),
        ))
    }

    pub fn with_clock(
        client: RestClient,
        policy: CachePolicy,
        max_entries: Option<usize>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            categories: RequestCoordinator::with_store(store(max_entries), Arc::clone(&clock), policy),
            items: RequestCoordinator::with_store(store(max_entries), Arc::clone(&clock), policy),
            item: RequestCoordinator::with_store(store(max_entries), clock, policy),
        }
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }

    /// Binding for the top-level category list, already bound.
    pub fn categories(&self) -> QueryBinding<Vec<Category>> {
        let mut binding = QueryBinding::new(self.categories.clone());
        binding.bind(categories_key(), categories_fetcher(&self.client));
        binding
    }

    /// Binding for the children of `parent_slug`, already bound.
    pub fn subcategories(&self, parent_slug: &str) -> QueryBinding<Vec<Category>> {
        let mut binding = QueryBinding::new(self.categories.clone());
        binding.bind(
            subcategories_key(parent_slug),
            subcategories_fetcher(&self.client, parent_slug),
        );
        binding
    }

    /// Binding for one item's detail, already bound.
    pub fn item(&self, id: &ItemId) -> QueryBinding<ItemDetail> {
        let mut binding = QueryBinding::new(self.item.clone());
        binding.bind(item_key(id), item_fetcher(&self.client, id));
        binding
    }

    /// Paginator over the items of `subcategory`, loading page 1.
    pub fn items(&self, subcategory: &str) -> Paginator<ItemPage> {
        Paginator::new(
            self.items.clone(),
            resources::ITEMS,
            subcategory,
            Arc::new(ItemPages::new(self.client.clone())),
        )
    }

    /// Combined statistics of the three stores.
    pub fn stats(&self) -> CacheStats {
        let parts = [
            self.categories.stats(),
            self.items.stats(),
            self.item.stats(),
        ];
        parts.into_iter().fold(CacheStats::default(), |acc, s| CacheStats {
            hits: acc.hits + s.hits,
            misses: acc.misses + s.misses,
            entry_count: acc.entry_count + s.entry_count,
            evictions: acc.evictions + s.evictions,
        })
    }
}

fn store<T>(max_entries: Option<usize>) -> CacheStore<T> {
    match max_entries {
        Some(max) => CacheStore::new().with_max_entries(max),
        None => CacheStore::new(),
    }
}
