use std::str::FromStr;

use rust_decimal::Decimal;

use crate::app_config::{AppConfig, Environment};
use crate::marketplace::Marketplace;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
#[allow(clippy::too_many_lines)]
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let parse_as = |var: &str, default: &str| -> ParsedValue {
        ParsedValue {
            var: var.to_string(),
            raw: or_default(var, default),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let redis_url = or_default("PRICEWATCH_REDIS_URL", "redis://127.0.0.1:6379");

    let env = parse_environment(&or_default("PRICEWATCH_ENV", "development"))?;
    let bind_addr: SocketAddr = parse_as("PRICEWATCH_BIND_ADDR", "0.0.0.0:3000").parse()?;
    let log_level = or_default("PRICEWATCH_LOG_LEVEL", "info");
    let key_namespace = or_default("PRICEWATCH_KEY_NAMESPACE", "pricewatch");
    if key_namespace.trim().is_empty() {
        return Err(invalid("PRICEWATCH_KEY_NAMESPACE", "must not be empty"));
    }

    let db_max_connections = parse_as("PRICEWATCH_DB_MAX_CONNECTIONS", "10").parse()?;
    let db_min_connections = parse_as("PRICEWATCH_DB_MIN_CONNECTIONS", "1").parse()?;
    let db_acquire_timeout_secs = parse_as("PRICEWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10").parse()?;

    let worker_count = parse_as("PRICEWATCH_WORKER_COUNT", "5").parse_positive()?;
    let worker_batch_size = parse_as("PRICEWATCH_WORKER_BATCH_SIZE", "80").parse_positive()?;
    let worker_idle_sleep_ms = parse_as("PRICEWATCH_WORKER_IDLE_SLEEP_MS", "5000").parse()?;
    let worker_batch_pause_min_ms =
        parse_as("PRICEWATCH_WORKER_BATCH_PAUSE_MIN_MS", "2000").parse()?;
    let worker_batch_pause_max_ms =
        parse_as("PRICEWATCH_WORKER_BATCH_PAUSE_MAX_MS", "5000").parse()?;
    ensure_range(
        "PRICEWATCH_WORKER_BATCH_PAUSE_MAX_MS",
        worker_batch_pause_min_ms,
        worker_batch_pause_max_ms,
    )?;
    let worker_marketplaces = parse_marketplaces(
        "PRICEWATCH_WORKER_MARKETPLACES",
        &or_default(
            "PRICEWATCH_WORKER_MARKETPLACES",
            "PrimaryExchange,SecondaryMarket",
        ),
    )?;

    let circuit_failure_threshold =
        parse_as("PRICEWATCH_CIRCUIT_FAILURE_THRESHOLD", "3").parse_positive()?;
    let circuit_cooldown_secs = parse_as("PRICEWATCH_CIRCUIT_COOLDOWN_SECS", "1200").parse()?;

    let alert_change_threshold: Decimal =
        parse_as("PRICEWATCH_ALERT_CHANGE_THRESHOLD", "0.05").parse()?;
    let alert_min_price: Decimal = parse_as("PRICEWATCH_ALERT_MIN_PRICE", "50").parse()?;
    if alert_change_threshold.is_sign_negative() {
        return Err(invalid(
            "PRICEWATCH_ALERT_CHANGE_THRESHOLD",
            "must not be negative",
        ));
    }
    let max_rollbacks = parse_as("PRICEWATCH_MAX_ROLLBACKS", "5").parse()?;

    let backlog_hot = parse_as("PRICEWATCH_BACKLOG_HOT", "50").parse()?;
    let backlog_common = parse_as("PRICEWATCH_BACKLOG_COMMON", "1000").parse()?;
    let backlog_cold = parse_as("PRICEWATCH_BACKLOG_COLD", "100").parse()?;

    let scraper_request_timeout_secs =
        parse_as("PRICEWATCH_SCRAPER_REQUEST_TIMEOUT_SECS", "8").parse_positive()?;
    let scraper_max_attempts = parse_as("PRICEWATCH_SCRAPER_MAX_ATTEMPTS", "5").parse_positive()?;
    let scraper_attempt_pause_min_ms =
        parse_as("PRICEWATCH_SCRAPER_ATTEMPT_PAUSE_MIN_MS", "500").parse()?;
    let scraper_attempt_pause_max_ms =
        parse_as("PRICEWATCH_SCRAPER_ATTEMPT_PAUSE_MAX_MS", "1500").parse()?;
    ensure_range(
        "PRICEWATCH_SCRAPER_ATTEMPT_PAUSE_MAX_MS",
        scraper_attempt_pause_min_ms,
        scraper_attempt_pause_max_ms,
    )?;
    let scraper_jitter_min_ms = parse_as("PRICEWATCH_SCRAPER_JITTER_MIN_MS", "200").parse()?;
    let scraper_jitter_max_ms = parse_as("PRICEWATCH_SCRAPER_JITTER_MAX_MS", "1500").parse()?;
    ensure_range(
        "PRICEWATCH_SCRAPER_JITTER_MAX_MS",
        scraper_jitter_min_ms,
        scraper_jitter_max_ms,
    )?;

    let primary_base_url = or_default("PRICEWATCH_PRIMARY_BASE_URL", "https://buff.163.com");
    let primary_cookie = optional("PRICEWATCH_PRIMARY_COOKIE");
    let primary_concurrency = parse_as("PRICEWATCH_PRIMARY_CONCURRENCY", "5").parse_positive()?;

    let secondary_base_url = or_default(
        "PRICEWATCH_SECONDARY_BASE_URL",
        "https://api.youpin898.com",
    );
    let secondary_authorization = optional("PRICEWATCH_SECONDARY_AUTHORIZATION");
    let secondary_device_id = optional("PRICEWATCH_SECONDARY_DEVICE_ID");
    let secondary_uk = optional("PRICEWATCH_SECONDARY_UK");
    let secondary_app_version = or_default("PRICEWATCH_SECONDARY_APP_VERSION", "5.26.0");
    let secondary_concurrency =
        parse_as("PRICEWATCH_SECONDARY_CONCURRENCY", "10").parse_positive()?;

    let alternate_base_url = or_default(
        "PRICEWATCH_ALTERNATE_BASE_URL",
        "https://steamcommunity.com",
    );
    let alternate_concurrency =
        parse_as("PRICEWATCH_ALTERNATE_CONCURRENCY", "3").parse_positive()?;
    let alternate_max_attempts =
        parse_as("PRICEWATCH_ALTERNATE_MAX_ATTEMPTS", "3").parse_positive()?;

    let pushplus_token = optional("PRICEWATCH_PUSHPLUS_TOKEN");

    Ok(AppConfig {
        database_url,
        redis_url,
        env,
        bind_addr,
        log_level,
        key_namespace,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        worker_count,
        worker_batch_size,
        worker_idle_sleep_ms,
        worker_batch_pause_min_ms,
        worker_batch_pause_max_ms,
        worker_marketplaces,
        circuit_failure_threshold,
        circuit_cooldown_secs,
        alert_change_threshold,
        alert_min_price,
        max_rollbacks,
        backlog_hot,
        backlog_common,
        backlog_cold,
        scraper_request_timeout_secs,
        scraper_max_attempts,
        scraper_attempt_pause_min_ms,
        scraper_attempt_pause_max_ms,
        scraper_jitter_min_ms,
        scraper_jitter_max_ms,
        primary_base_url,
        primary_cookie,
        primary_concurrency,
        secondary_base_url,
        secondary_authorization,
        secondary_device_id,
        secondary_uk,
        secondary_app_version,
        secondary_concurrency,
        alternate_base_url,
        alternate_concurrency,
        alternate_max_attempts,
        pushplus_token,
    })
}

/// Raw env value tagged with its variable name, so parse failures report
/// the variable that held the bad value.
struct ParsedValue {
    var: String,
    raw: String,
}

impl ParsedValue {
    fn parse<T>(&self) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.raw.trim().parse::<T>().map_err(|e| invalid(&self.var, e))
    }

    fn parse_positive<T>(&self) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialEq,
        T::Err: std::fmt::Display,
    {
        let value: T = self.parse()?;
        if value == T::default() {
            return Err(invalid(&self.var, "must be greater than zero"));
        }
        Ok(value)
    }
}

fn ensure_range(var: &str, min: u64, max: u64) -> Result<(), ConfigError> {
    if max < min {
        return Err(invalid(var, format!("must be >= the minimum ({min})")));
    }
    Ok(())
}

/// Parse a comma-separated marketplace list. Empty entries are skipped;
/// an unknown name or an empty list is rejected at startup.
fn parse_marketplaces(var: &str, raw: &str) -> Result<Vec<Marketplace>, ConfigError> {
    let mut out = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let marketplace = name.parse::<Marketplace>().map_err(|e| invalid(var, e))?;
        if !out.contains(&marketplace) {
            out.push(marketplace);
        }
    }
    if out.is_empty() {
        return Err(invalid(var, "at least one marketplace is required"));
    }
    Ok(out)
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "production" => Ok(Environment::Production),
        "test" => Ok(Environment::Test),
        other => Err(invalid(
            "PRICEWATCH_ENV",
            format!("unknown environment '{other}'; expected development, test, or production"),
        )),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
