//! HTTP-level tests of the three marketplace strategies.
//!
//! Each test stands up a `wiremock` server as the marketplace. The proxy
//! pool is left empty so every attempt goes out directly to the mock.

use std::sync::Arc;

use pricewatch_core::{FetchKey, Marketplace, ProxyRegion};
use pricewatch_scraper::{
    AlternateMarket, AlternateMarketConfig, FailureKind, FetchOutcome, FetchStrategy,
    HttpSettings, PrimaryExchange, PrimaryExchangeConfig, SecondaryMarket, SecondaryMarketConfig,
};
use pricewatch_store::{MemoryStore, ProxyPool};
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn empty_pool() -> ProxyPool {
    ProxyPool::new(Arc::new(MemoryStore::new()), "test")
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn primary(server: &MockServer, max_attempts: u32) -> PrimaryExchange {
    PrimaryExchange::new(
        PrimaryExchangeConfig {
            base_url: server.uri(),
            cookie: Some("session=abc; csrf_token=tok123".to_string()),
            concurrency: 4,
            http: HttpSettings::immediate(max_attempts),
        },
        empty_pool(),
    )
}

fn secondary(server: &MockServer, max_attempts: u32) -> SecondaryMarket {
    SecondaryMarket::new(
        SecondaryMarketConfig {
            base_url: server.uri(),
            authorization: Some("Bearer app-token".to_string()),
            device_id: Some("device-1".to_string()),
            uk: Some("uk-1".to_string()),
            app_version: "5.26.0".to_string(),
            concurrency: 4,
            http: HttpSettings::immediate(max_attempts),
        },
        empty_pool(),
    )
}

fn alternate(server: &MockServer, max_attempts: u32) -> AlternateMarket {
    AlternateMarket::new(
        AlternateMarketConfig {
            base_url: server.uri(),
            concurrency: 2,
            http: HttpSettings::immediate(max_attempts),
        },
        empty_pool(),
    )
}

fn sell_order_json(price: &str, total: i64) -> serde_json::Value {
    json!({
        "code": "OK",
        "data": { "items": [{ "price": price }], "total_count": total }
    })
}

// ---------------------------------------------------------------------------
// PrimaryExchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn primary_discovers_identifier_by_name_then_fetches_price() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/market/goods"))
        .and(query_param("search", "Widget A"))
        .and(query_param("page_num", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "OK",
            "data": { "items": [
                { "id": 1, "market_hash_name": "Widget A (Souvenir)" },
                { "id": 777, "market_hash_name": "Widget A" }
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/market/goods/sell_order"))
        .and(query_param("goods_id", "777"))
        .and(header("X-CSRFToken", "tok123"))
        .and(header("X-Requested-With", "XMLHttpRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sell_order_json("100.00", 12)))
        .expect(1)
        .mount(&server)
        .await;

    let strategy = primary(&server, 3);
    let result = strategy
        .fetch_price(&FetchKey::Name("Widget A".to_string()))
        .await;

    assert_eq!(result.marketplace, Marketplace::PrimaryExchange);
    assert_eq!(result.identifier, Some(777));
    assert_eq!(
        result.outcome,
        FetchOutcome::Success {
            price: dec("100.00"),
            volume: 12
        }
    );
}

#[tokio::test]
async fn primary_known_identifier_skips_search() {
    let server = MockServer::start().await;

    Mock::given(path("/api/market/goods"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/market/goods/sell_order"))
        .and(query_param("goods_id", "777"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sell_order_json("106", 3)))
        .mount(&server)
        .await;

    let result = primary(&server, 3).fetch_price(&FetchKey::Id(777)).await;
    assert!(result.is_success());
    assert_eq!(result.identifier, Some(777));
}

#[tokio::test]
async fn primary_login_required_is_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/market/goods/sell_order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "Login Required",
            "error": "Login Required"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = primary(&server, 5).fetch_price(&FetchKey::Id(42)).await;
    assert_eq!(result.failure_kind(), Some(FailureKind::CredentialExpired));
}

#[tokio::test]
async fn primary_retries_past_a_waf_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/market/goods/sell_order"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Access Denied</title></head></html>"),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/market/goods/sell_order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sell_order_json("55.5", 1)))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;

    let result = primary(&server, 3).fetch_price(&FetchKey::Id(42)).await;
    assert_eq!(
        result.outcome,
        FetchOutcome::Success {
            price: dec("55.50"),
            volume: 1
        }
    );
}

#[tokio::test]
async fn primary_empty_listing_is_no_listings_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/market/goods/sell_order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "OK",
            "data": { "items": [], "total_count": 0 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = primary(&server, 5).fetch_price(&FetchKey::Id(42)).await;
    assert_eq!(result.failure_kind(), Some(FailureKind::NoListings));
}

#[tokio::test]
async fn primary_search_gives_up_after_three_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/market/goods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "OK",
            "data": { "items": [{ "id": 5, "market_hash_name": "Something Else" }] }
        })))
        .expect(3)
        .mount(&server)
        .await;

    let result = primary(&server, 2)
        .fetch_price(&FetchKey::Name("Widget A".to_string()))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::NotFound));
    assert_eq!(result.identifier, None);
}

#[tokio::test]
async fn primary_batch_with_no_successes_is_total_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/market/goods/sell_order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "OK",
            "data": { "items": [] }
        })))
        .expect(3)
        .mount(&server)
        .await;

    let outcome = primary(&server, 1)
        .fetch_batch(vec![FetchKey::Id(1), FetchKey::Id(2), FetchKey::Id(3)])
        .await;
    assert!(outcome.is_total_failure());
    assert_eq!(outcome.results().len(), 3);
}

// ---------------------------------------------------------------------------
// SecondaryMarket
// ---------------------------------------------------------------------------

const ON_SALE_PATH: &str = "/api/homepage/pc/goods/market/queryOnSaleCommodityList";

#[tokio::test]
async fn secondary_posts_template_query_with_app_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ON_SALE_PATH))
        .and(header("authorization", "Bearer app-token"))
        .and(header("deviceId", "device-1"))
        .and(header("secret-v", "h5_v1"))
        .and(body_partial_json(json!({ "gameId": "730", "templateId": "9001" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Code": 0,
            "Data": [{ "price": "88.50" }],
            "TotalCount": 37
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = secondary(&server, 3).fetch_price(&FetchKey::Id(9001)).await;
    assert_eq!(result.identifier, Some(9001));
    assert_eq!(
        result.outcome,
        FetchOutcome::Success {
            price: dec("88.50"),
            volume: 37
        }
    );
}

#[tokio::test]
async fn secondary_retries_too_frequent_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ON_SALE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Code": 84101,
            "Msg": "请求过于频繁"
        })))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ON_SALE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "CommodityList": [{ "price": 12.3 }] }
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let result = secondary(&server, 5).fetch_price(&FetchKey::Id(9001)).await;
    assert_eq!(
        result.outcome,
        FetchOutcome::Success {
            price: dec("12.30"),
            volume: 1
        }
    );
}

#[tokio::test]
async fn secondary_rejects_name_keys_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(path(ON_SALE_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = secondary(&server, 3)
        .fetch_price(&FetchKey::Name("Widget A".to_string()))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::InvalidRequest));
}

// ---------------------------------------------------------------------------
// AlternateMarket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn alternate_parses_price_overview() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/market/priceoverview/"))
        .and(query_param("appid", "730"))
        .and(query_param("market_hash_name", "AK-47 | Redline (Field-Tested)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "lowest_price": "¥ 1,234.56",
            "volume": "1,024"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = alternate(&server, 3)
        .fetch_price(&FetchKey::Name("AK-47 | Redline (Field-Tested)".to_string()))
        .await;
    assert_eq!(result.identifier, None);
    assert_eq!(
        result.outcome,
        FetchOutcome::Success {
            price: dec("1234.56"),
            volume: 1024
        }
    );
}

#[tokio::test]
async fn alternate_rate_limit_exhausts_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/market/priceoverview/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let result = alternate(&server, 3)
        .fetch_price(&FetchKey::Name("Widget A".to_string()))
        .await;
    let kind = result.failure_kind().unwrap();
    assert_eq!(kind, FailureKind::RateLimited);
    assert!(kind.is_blocking());
}

#[tokio::test]
async fn alternate_unsuccessful_lookup_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/market/priceoverview/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .expect(1)
        .mount(&server)
        .await;

    let result = alternate(&server, 3)
        .fetch_price(&FetchKey::Name("Delisted".to_string()))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::NotFound));
}

// ---------------------------------------------------------------------------
// Proxy pool interaction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_domestic_pool_falls_back_to_direct_connection() {
    let server = MockServer::start().await;
    let pool = empty_pool();
    assert!(pool.acquire(ProxyRegion::Domestic).await.is_none());

    Mock::given(method("GET"))
        .and(path("/api/market/goods/sell_order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sell_order_json("10", 1)))
        .expect(1)
        .mount(&server)
        .await;

    let strategy = PrimaryExchange::new(
        PrimaryExchangeConfig {
            base_url: server.uri(),
            cookie: None,
            concurrency: 1,
            http: HttpSettings::immediate(5),
        },
        pool,
    );
    assert!(strategy.fetch_price(&FetchKey::Id(1)).await.is_success());
}
