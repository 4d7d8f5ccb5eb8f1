use std::net::SocketAddr;

use rust_decimal::Decimal;

use crate::marketplace::Marketplace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Prefix for every queue and proxy key in the shared store.
    pub key_namespace: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub worker_count: usize,
    pub worker_batch_size: usize,
    pub worker_idle_sleep_ms: u64,
    pub worker_batch_pause_min_ms: u64,
    pub worker_batch_pause_max_ms: u64,
    /// Marketplaces the scheduled pipeline fetches from, resolved once at startup.
    pub worker_marketplaces: Vec<Marketplace>,

    pub circuit_failure_threshold: u32,
    pub circuit_cooldown_secs: u64,

    /// Fractional change (0.05 = 5%) above which a price move is alerted.
    pub alert_change_threshold: Decimal,
    /// New prices at or below this floor never alert.
    pub alert_min_price: Decimal,
    /// Cold-lane rollbacks allowed per item before it is dead-lettered.
    pub max_rollbacks: u32,

    pub backlog_hot: usize,
    pub backlog_common: usize,
    pub backlog_cold: usize,

    pub scraper_request_timeout_secs: u64,
    pub scraper_max_attempts: u32,
    pub scraper_attempt_pause_min_ms: u64,
    pub scraper_attempt_pause_max_ms: u64,
    pub scraper_jitter_min_ms: u64,
    pub scraper_jitter_max_ms: u64,

    pub primary_base_url: String,
    pub primary_cookie: Option<String>,
    pub primary_concurrency: usize,

    pub secondary_base_url: String,
    pub secondary_authorization: Option<String>,
    pub secondary_device_id: Option<String>,
    pub secondary_uk: Option<String>,
    pub secondary_app_version: String,
    pub secondary_concurrency: usize,

    pub alternate_base_url: String,
    pub alternate_concurrency: usize,
    pub alternate_max_attempts: u32,

    pub pushplus_token: Option<String>,
}

fn redact(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| "[redacted]")
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("redis_url", &"[redacted]")
            .field("key_namespace", &self.key_namespace)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("worker_count", &self.worker_count)
            .field("worker_batch_size", &self.worker_batch_size)
            .field("worker_idle_sleep_ms", &self.worker_idle_sleep_ms)
            .field("worker_batch_pause_min_ms", &self.worker_batch_pause_min_ms)
            .field("worker_batch_pause_max_ms", &self.worker_batch_pause_max_ms)
            .field("worker_marketplaces", &self.worker_marketplaces)
            .field("circuit_failure_threshold", &self.circuit_failure_threshold)
            .field("circuit_cooldown_secs", &self.circuit_cooldown_secs)
            .field("alert_change_threshold", &self.alert_change_threshold)
            .field("alert_min_price", &self.alert_min_price)
            .field("max_rollbacks", &self.max_rollbacks)
            .field("backlog_hot", &self.backlog_hot)
            .field("backlog_common", &self.backlog_common)
            .field("backlog_cold", &self.backlog_cold)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_max_attempts", &self.scraper_max_attempts)
            .field(
                "scraper_attempt_pause_ms",
                &(
                    self.scraper_attempt_pause_min_ms,
                    self.scraper_attempt_pause_max_ms,
                ),
            )
            .field(
                "scraper_jitter_ms",
                &(self.scraper_jitter_min_ms, self.scraper_jitter_max_ms),
            )
            .field("primary_base_url", &self.primary_base_url)
            .field("primary_cookie", &redact(self.primary_cookie.as_ref()))
            .field("primary_concurrency", &self.primary_concurrency)
            .field("secondary_base_url", &self.secondary_base_url)
            .field(
                "secondary_authorization",
                &redact(self.secondary_authorization.as_ref()),
            )
            .field(
                "secondary_device_id",
                &redact(self.secondary_device_id.as_ref()),
            )
            .field("secondary_uk", &redact(self.secondary_uk.as_ref()))
            .field("secondary_app_version", &self.secondary_app_version)
            .field("secondary_concurrency", &self.secondary_concurrency)
            .field("alternate_base_url", &self.alternate_base_url)
            .field("alternate_concurrency", &self.alternate_concurrency)
            .field("alternate_max_attempts", &self.alternate_max_attempts)
            .field("pushplus_token", &redact(self.pushplus_token.as_ref()))
            .finish()
    }
}
