//! Offline unit tests for pricewatch-db pool configuration and row types.
//! These tests do not require a live database connection.

use pricewatch_core::{Environment, Marketplace};
use pricewatch_db::{PoolConfig, PriceHistoryRow};
use rust_decimal::Decimal;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

fn app_config() -> pricewatch_core::AppConfig {
    pricewatch_core::AppConfig {
        database_url: "postgres://example".to_string(),
        redis_url: "redis://127.0.0.1:6379".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        key_namespace: "pricewatch".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        worker_count: 5,
        worker_batch_size: 80,
        worker_idle_sleep_ms: 5000,
        worker_batch_pause_min_ms: 2000,
        worker_batch_pause_max_ms: 5000,
        worker_marketplaces: vec![Marketplace::PrimaryExchange],
        circuit_failure_threshold: 3,
        circuit_cooldown_secs: 1200,
        alert_change_threshold: Decimal::new(5, 2),
        alert_min_price: Decimal::from(50),
        max_rollbacks: 5,
        backlog_hot: 50,
        backlog_common: 1000,
        backlog_cold: 100,
        scraper_request_timeout_secs: 8,
        scraper_max_attempts: 5,
        scraper_attempt_pause_min_ms: 500,
        scraper_attempt_pause_max_ms: 1500,
        scraper_jitter_min_ms: 200,
        scraper_jitter_max_ms: 1500,
        primary_base_url: "http://localhost".to_string(),
        primary_cookie: None,
        primary_concurrency: 5,
        secondary_base_url: "http://localhost".to_string(),
        secondary_authorization: None,
        secondary_device_id: None,
        secondary_uk: None,
        secondary_app_version: "5.26.0".to_string(),
        secondary_concurrency: 10,
        alternate_base_url: "http://localhost".to_string(),
        alternate_concurrency: 3,
        alternate_max_attempts: 3,
        pushplus_token: None,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: confirm that [`PriceHistoryRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn price_history_row_has_expected_fields() {
    use chrono::Utc;

    let row = PriceHistoryRow {
        id: 1_i64,
        item_id: 42_i64,
        marketplace: "PrimaryExchange".to_string(),
        price: Decimal::new(10_600, 2),
        volume: 3_i64,
        captured_at: Utc::now(),
    };

    assert_eq!(row.item_id, 42);
    assert_eq!(row.marketplace, "PrimaryExchange");
    assert_eq!(row.price.to_string(), "106.00");
}
