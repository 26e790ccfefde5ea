use clap::Parser;
use pricewatch_client::config::CacheConfig;
use pricewatch_client::{commands, Catalog, CliError, ClientConfig, Command, Invocation, LogFormat};
use pricewatch_core::{item_key, validate_item_input, Paged};
use pricewatch_test_utils::fixtures;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn base_config() -> ClientConfig {
    ClientConfig {
        api_base_url: "http://localhost:8000".to_string(),
        request_timeout_ms: 5_000,
        log_format: LogFormat::Human,
        cache: CacheConfig::default(),
    }
}

#[test]
fn config_requires_base_url() {
    let mut config = base_config();
    config.api_base_url = "   ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn config_requires_timeout() {
    let mut config = base_config();
    config.request_timeout_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn config_rejects_zero_cap() {
    let mut config = base_config();
    config.cache.max_entries = Some(0);
    assert!(config.validate().is_err());
    config.cache.max_entries = Some(1);
    assert!(config.validate().is_ok());
}

proptest! {
    #[test]
    fn cache_windows_validate_in_order(stale in 0u64..120_000, cache in 0u64..120_000) {
        let mut config = base_config();
        config.cache.stale_after_ms = stale;
        config.cache.cache_time_ms = cache;

        prop_assert_eq!(config.validate().is_ok(), stale <= cache);
        let policy = config.cache_policy();
        prop_assert_eq!(policy.stale_after, Duration::from_millis(stale));
        prop_assert_eq!(policy.cache_time, Duration::from_millis(cache));
    }

    #[test]
    fn cache_table_parses_from_toml(stale in 0u64..60_000, extra in 0u64..60_000, cap in 1usize..512) {
        let text = format!(
            "api_base_url = \"http://localhost:8000\"\nrequest_timeout_ms = 5000\n\n[cache]\nstale_after_ms = {}\ncache_time_ms = {}\nmax_entries = {}\n",
            stale,
            stale + extra,
            cap
        );
        let config: ClientConfig = text.parse().map_err(|e| TestCaseError::fail(format!("{}", e)))?;
        prop_assert_eq!(config.cache.stale_after_ms, stale);
        prop_assert_eq!(config.cache.cache_time_ms, stale + extra);
        prop_assert_eq!(config.cache.max_entries, Some(cap));
    }

    #[test]
    fn browse_pages_flag_round_trips(slug in "[a-z][a-z0-9-]{0,20}", pages in 1u32..1000) {
        let args = vec![
            "pricewatch".to_string(),
            "browse".to_string(),
            slug.clone(),
            "--pages".to_string(),
            pages.to_string(),
        ];
        let invocation = Invocation::try_parse_from(args).map_err(|e| TestCaseError::fail(format!("{}", e)))?;
        prop_assert_eq!(invocation.command, Command::Browse { subcategory: slug, pages });
    }

    #[test]
    fn browse_rejects_non_positive_pages(pages in -1000i64..=0) {
        let count = pages.to_string();
        let args = ["pricewatch", "browse", "monitors", "--pages", count.as_str()];
        let err = Invocation::try_parse_from(args).err();
        prop_assert!(err.is_some_and(|e| e.exit_code() == 2));
    }
}

// ============================================================================
// STUB API
// ============================================================================

/// Minimal HTTP/1.1 responder serving canned JSON by request target.
struct StubApi {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubApi {
    async fn start(routes: HashMap<String, String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head).to_string();
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    log.lock().unwrap().push(target.clone());

                    let (status, body) = match routes.get(&target) {
                        Some(body) => ("200 OK", body.clone()),
                        None => ("404 Not Found", r#"{"detail":"Not found."}"#.to_string()),
                    };
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { base_url, requests }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig {
            api_base_url: self.base_url.clone(),
            ..base_config()
        }
    }

    fn requests_for(&self, target: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == target)
            .count()
    }
}

fn json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap()
}

fn catalog_routes() -> HashMap<String, String> {
    let mut routes = HashMap::new();
    routes.insert("/api/categories".to_string(), json(&fixtures::categories()));
    routes.insert(
        "/api/subcategories/electronics".to_string(),
        json(&fixtures::subcategories("electronics")),
    );
    routes.insert("/api/items/193991548".to_string(), json(&fixtures::item_detail()));
    for page in 1..=3 {
        routes.insert(
            format!("/api/items?subcategory=monitors&page={}", page),
            json(&fixtures::item_page(page, 3)),
        );
    }
    routes
}

// ============================================================================
// END TO END
// ============================================================================

#[tokio::test]
async fn item_command_renders_last_price() {
    let api = StubApi::start(catalog_routes()).await;
    let catalog = Catalog::from_config(&api.config()).unwrap();

    let command = Command::Item {
        input: "https://www.ozon.ru/context/detail/id/193991548/".to_string(),
    };
    let output = commands::run(&catalog, &command).await.unwrap();

    assert!(output.starts_with("LED Monitor 27\""));
    assert!(output.contains("Last price: 18 P (2020-05-31)"));
    assert_eq!(api.requests_for("/api/items/193991548"), 1);
}

#[tokio::test]
async fn missing_item_is_not_found() {
    let api = StubApi::start(catalog_routes()).await;
    let catalog = Catalog::from_config(&api.config()).unwrap();

    let result = commands::show_item(&catalog, "111111111").await;
    assert!(matches!(result, Err(CliError::Query(ref e)) if e.is_not_found()));
}

#[tokio::test]
async fn concurrent_bindings_share_one_request() {
    let api = StubApi::start(catalog_routes()).await;
    let catalog = Catalog::from_config(&api.config()).unwrap();
    let id = validate_item_input("193991548").unwrap();

    let mut first = catalog.item(&id);
    let mut second = catalog.item(&id);
    let a = first.settled().await.unwrap();
    let b = second.settled().await.unwrap();
    assert_eq!(a.data(), b.data());
    assert_eq!(api.requests_for("/api/items/193991548"), 1);

    // Fresh entry: a third view is served from cache.
    let third = catalog.item(&id);
    assert!(third.snapshot().unwrap().is_success());
    assert_eq!(third.key(), Some(&item_key(&id)));
    assert_eq!(api.requests_for("/api/items/193991548"), 1);
}

#[tokio::test]
async fn categories_and_subcategories_share_a_store() {
    let api = StubApi::start(catalog_routes()).await;
    let catalog = Catalog::from_config(&api.config()).unwrap();

    let top = commands::run(&catalog, &Command::Categories).await.unwrap();
    assert!(top.contains("electronics"));
    let children = commands::run(
        &catalog,
        &Command::Subcategories {
            parent: "electronics".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(children.lines().count(), 3);
    assert!(children.contains("electronics-phones"));
}

#[tokio::test]
async fn browse_walks_requested_pages() {
    let api = StubApi::start(catalog_routes()).await;
    let catalog = Catalog::from_config(&api.config()).unwrap();

    let output = commands::browse(&catalog, "monitors", 2).await.unwrap();
    assert!(output.contains("-- page 1"));
    assert!(output.contains("-- page 2"));
    assert!(!output.contains("-- page 3"));
    assert_eq!(api.requests_for("/api/items?subcategory=monitors&page=3"), 0);

    // Asking for more pages than exist stops at the last one.
    let everything = commands::browse(&catalog, "monitors", 10).await.unwrap();
    assert!(everything.contains("-- page 3"));
    assert_eq!(everything.matches("-- page").count(), 3);
}

#[tokio::test]
async fn browse_stops_on_failed_page() {
    let mut routes = catalog_routes();
    routes.remove("/api/items?subcategory=monitors&page=2");
    let api = StubApi::start(routes).await;
    let catalog = Catalog::from_config(&api.config()).unwrap();

    let mut pages = catalog.items("monitors");
    pages.settled().await;
    assert!(pages.data().is_some_and(|page| page.has_next()));

    let output = commands::browse(&catalog, "monitors", 3).await.unwrap();
    assert!(output.contains("-- page 1"));
    assert!(output.contains("(stopped: Not found"));
}
