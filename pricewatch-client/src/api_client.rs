//! REST client for the price-tracking JSON API.

use crate::config::ClientConfig;
use pricewatch_core::{Category, ItemDetail, ItemId, ItemPage, QueryError};
use reqwest::StatusCode;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Config error: {0}")]
    Config(String),
}

impl From<ClientError> for QueryError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Status { status: 404, url } => QueryError::not_found(url),
            ClientError::Http(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
                let resource = e.url().map(|u| u.to_string()).unwrap_or_default();
                QueryError::not_found(resource)
            }
            other => QueryError::network(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ItemsQuery<'a> {
    subcategory: &'a str,
    page: u32,
}

/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Self::with_client(client, &config.api_base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ClientError::Config("api_base_url must not be empty".to_string()));
        }
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of an API path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn categories(&self) -> Result<Vec<Category>, ClientError> {
        self.get_json::<_, ()>("categories", None).await
    }

    pub async fn subcategories(&self, parent_slug: &str) -> Result<Vec<Category>, ClientError> {
        let path = format!("subcategories/{}", parent_slug);
        self.get_json::<_, ()>(&path, None).await
    }

    pub async fn items(&self, subcategory: &str, page: u32) -> Result<ItemPage, ClientError> {
        let query = ItemsQuery { subcategory, page };
        self.get_json("items", Some(&query)).await
    }

    pub async fn item(&self, id: &ItemId) -> Result<ItemDetail, ClientError> {
        let path = format!("items/{}", id);
        self.get_json::<_, ()>(&path, None).await
    }

    async fn get_json<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(path);
        let mut request = self.client.get(&url);
        if let Some(query) = query {
            request = request.query(query);
        }
        tracing::debug!(url = %url, "GET");
        let response = request.send().await?;
        self.parse_response(url, response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ClientError::Decode { url, source })
    }
}
