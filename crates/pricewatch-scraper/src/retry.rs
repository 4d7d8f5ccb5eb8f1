//! Attempt loop shared by every marketplace strategy.
//!
//! Each attempt egresses through a freshly acquired proxy of the
//! marketplace's region; the final attempt always goes direct. Retriable
//! failures evict the proxy (when the error implicates it) and move on;
//! terminal failures return immediately. Every attempt, successful or not,
//! is followed by a randomized pause that throttles the per-marketplace
//! request rate.

use std::future::Future;
use std::time::Duration;

use pricewatch_core::{AppConfig, Marketplace};
use pricewatch_store::{ProxyEntry, ProxyPool};
use reqwest::Client;

use crate::error::FetchError;

/// Timing and attempt budget for one marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub attempt_pause_min_ms: u64,
    pub attempt_pause_max_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl HttpSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            request_timeout_secs: config.scraper_request_timeout_secs,
            max_attempts: config.scraper_max_attempts,
            attempt_pause_min_ms: config.scraper_attempt_pause_min_ms,
            attempt_pause_max_ms: config.scraper_attempt_pause_max_ms,
            jitter_min_ms: config.scraper_jitter_min_ms,
            jitter_max_ms: config.scraper_jitter_max_ms,
        }
    }

    /// No pauses or jitter; for tests against a local mock server.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            request_timeout_secs: 5,
            max_attempts,
            attempt_pause_min_ms: 0,
            attempt_pause_max_ms: 0,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
        }
    }
}

/// Sleeps a uniformly random duration in `[min_ms, max_ms]`.
pub(crate) async fn random_pause(min_ms: u64, max_ms: u64) {
    if max_ms == 0 {
        return;
    }
    let ms = if max_ms > min_ms {
        rand::random_range(min_ms..=max_ms)
    } else {
        min_ms
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Builds a client that egresses through `proxy`, or directly when `None`.
pub(crate) fn build_client(
    timeout_secs: u64,
    proxy: Option<&ProxyEntry>,
) -> Result<Client, FetchError> {
    let builder = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(5)));
    let builder = match proxy {
        Some(entry) => builder.proxy(reqwest::Proxy::all(entry.url())?),
        None => builder.no_proxy(),
    };
    Ok(builder.build()?)
}

/// Runs `operation` under the attempt policy of `settings`.
///
/// `operation` receives a client already bound to the attempt's egress.
///
/// # Errors
///
/// Returns the first terminal error, or [`FetchError::RetriesExhausted`]
/// wrapping the last retriable error once the budget is spent.
pub(crate) async fn with_proxy_rotation<T, F, Fut>(
    marketplace: Marketplace,
    settings: &HttpSettings,
    proxies: &ProxyPool,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(Client) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = settings.max_attempts.max(1);
    let region = marketplace.proxy_region();
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        let proxy = if attempt == max_attempts {
            if max_attempts > 1 {
                tracing::warn!(%marketplace, attempt, "final attempt over a direct connection");
            }
            None
        } else {
            proxies.acquire(region).await
        };
        let proxy_label = proxy.as_ref().map_or("direct", |p| p.address.as_str());

        let result = match build_client(settings.request_timeout_secs, proxy.as_ref()) {
            Ok(client) => operation(client).await,
            Err(e) => Err(e),
        };

        random_pause(settings.attempt_pause_min_ms, settings.attempt_pause_max_ms).await;

        let err = match result {
            Ok(value) => {
                tracing::debug!(%marketplace, attempt, proxy = proxy_label, "fetch attempt succeeded");
                return Ok(value);
            }
            Err(err) => err,
        };

        if err.evicts_proxy() {
            if let Some(entry) = &proxy {
                proxies.evict(entry).await;
            }
        }

        if !err.is_retriable() {
            return Err(err);
        }

        tracing::warn!(
            %marketplace,
            attempt,
            max_attempts,
            proxy = proxy_label,
            error = %err,
            "retriable fetch failure"
        );
        last_err = Some(err);
    }

    Err(match last_err {
        Some(last) => FetchError::RetriesExhausted {
            attempts: max_attempts,
            last: Box::new(last),
        },
        None => FetchError::InvalidRequest {
            reason: "no fetch attempt was made".to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::ProxyRegion;
    use pricewatch_store::{MemoryStore, SharedStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn blocked() -> FetchError {
        FetchError::Blocked {
            marketplace: Marketplace::PrimaryExchange,
            title: None,
        }
    }

    async fn pool_with_proxies(n: usize) -> (Arc<MemoryStore>, ProxyPool) {
        let store = Arc::new(MemoryStore::new());
        let pool = ProxyPool::new(store.clone(), "test");
        let key = pool.region_key(ProxyRegion::Domestic);
        for i in 0..n {
            store
                .hash_set(&key, &format!("127.0.0.{}:9", i + 1), "fresh")
                .await
                .unwrap();
        }
        (store, pool)
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let (_, pool) = pool_with_proxies(0).await;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = with_proxy_rotation(
            Marketplace::PrimaryExchange,
            &HttpSettings::immediate(5),
            &pool,
            |_client| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, FetchError>(42)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retriable_errors_exhaust_the_budget_and_evict_proxies() {
        let (_, pool) = pool_with_proxies(4).await;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = with_proxy_rotation(
            Marketplace::PrimaryExchange,
            &HttpSettings::immediate(5),
            &pool,
            |_client| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, FetchError>(blocked())
                }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(matches!(
            result,
            Err(FetchError::RetriesExhausted { attempts: 5, .. })
        ));
        // Four proxied attempts, each on a proxy that was then evicted.
        assert_eq!(pool.size(ProxyRegion::Domestic).await, 0);
    }

    #[tokio::test]
    async fn terminal_errors_return_without_retrying() {
        let (_, pool) = pool_with_proxies(2).await;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = with_proxy_rotation(
            Marketplace::SecondaryMarket,
            &HttpSettings::immediate(5),
            &pool,
            |_client| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, FetchError>(FetchError::CredentialExpired {
                        marketplace: Marketplace::SecondaryMarket,
                    })
                }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::CredentialExpired { .. })));
        assert_eq!(pool.size(ProxyRegion::Domestic).await, 2);
    }

    #[tokio::test]
    async fn empty_pool_still_attempts_directly() {
        let (_, pool) = pool_with_proxies(0).await;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = with_proxy_rotation(
            Marketplace::AlternateMarket,
            &HttpSettings::immediate(2),
            &pool,
            |_client| {
                let c = Arc::clone(&c);
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(FetchError::RateLimited {
                            marketplace: Marketplace::AlternateMarket,
                        })
                    } else {
                        Ok::<&str, FetchError>("ok")
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
