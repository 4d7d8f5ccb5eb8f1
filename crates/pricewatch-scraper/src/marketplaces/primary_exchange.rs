//! Identifier-keyed exchange with a session cookie and CSRF protection.
//!
//! A name key is resolved to the exchange's goods identifier by scanning
//! the first [`SEARCH_PAGES`] search result pages for an exact canonical
//! name match; the discovered identifier is returned on the result so the
//! reconciler can persist it.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use pricewatch_core::{AppConfig, FetchKey, Marketplace};
use pricewatch_store::ProxyPool;
use reqwest::RequestBuilder;
use serde::Deserialize;

use super::{decode, into_result, send_for_json, Listing};
use crate::error::FetchError;
use crate::price::{json_price_text, parse_price};
use crate::retry::{with_proxy_rotation, HttpSettings};
use crate::strategy::FetchStrategy;
use crate::types::{BatchLimits, FetchResult};
use crate::user_agent::random_user_agent;

const MARKETPLACE: Marketplace = Marketplace::PrimaryExchange;

/// Search pages scanned before a name is declared not found.
pub const SEARCH_PAGES: u32 = 3;

#[derive(Debug, Clone)]
pub struct PrimaryExchangeConfig {
    pub base_url: String,
    /// Full `Cookie` header of a logged-in session.
    pub cookie: Option<String>,
    pub concurrency: usize,
    pub http: HttpSettings,
}

impl PrimaryExchangeConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.primary_base_url.clone(),
            cookie: config.primary_cookie.clone(),
            concurrency: config.primary_concurrency,
            http: HttpSettings::from_app_config(config),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: String,
    error: Option<String>,
    data: Option<Page<T>>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    total_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SellOrder {
    #[serde(default)]
    price: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: i64,
    market_hash_name: String,
}

impl<T> Envelope<T> {
    /// The page of an `OK` response; the error field classifies the rest.
    fn into_page(self) -> Result<Page<T>, FetchError> {
        if self.code == "OK" {
            return Ok(self.data.unwrap_or(Page {
                items: Vec::new(),
                total_count: None,
            }));
        }
        let message = self.error.unwrap_or(self.code);
        if message == "Login Required" {
            return Err(FetchError::CredentialExpired {
                marketplace: MARKETPLACE,
            });
        }
        Err(FetchError::Api {
            marketplace: MARKETPLACE,
            message,
        })
    }
}

/// Value of `csrf_token` inside a `Cookie` header.
fn csrf_token(cookie: &str) -> Option<&str> {
    cookie
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("csrf_token="))
        .filter(|token| !token.is_empty())
}

pub struct PrimaryExchange {
    config: PrimaryExchangeConfig,
    proxies: ProxyPool,
}

impl PrimaryExchange {
    #[must_use]
    pub fn new(config: PrimaryExchangeConfig, proxies: ProxyPool) -> Self {
        let config = PrimaryExchangeConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };
        Self { config, proxies }
    }

    /// Browser-like AJAX headers with the session cookie and CSRF token.
    fn ajax_headers(&self, request: RequestBuilder, referer: &str) -> RequestBuilder {
        let mut request = request
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .header(reqwest::header::REFERER, referer)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(
                reqwest::header::ACCEPT,
                "application/json, text/javascript, */*; q=0.01",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8")
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-origin");
        if let Some(cookie) = self.config.cookie.as_deref() {
            request = request.header(reqwest::header::COOKIE, cookie);
            if let Some(token) = csrf_token(cookie) {
                request = request.header("X-CSRFToken", token);
            }
        }
        request
    }

    async fn price_by_id(&self, goods_id: i64) -> Result<Listing, FetchError> {
        let base = &self.config.base_url;
        let url = format!(
            "{base}/api/market/goods/sell_order?game=csgo&goods_id={goods_id}&page_num=1&sort_by=default"
        );
        let referer = format!("{base}/goods/{goods_id}");

        with_proxy_rotation(MARKETPLACE, &self.config.http, &self.proxies, |client| {
            let request = self.ajax_headers(client.get(&url), &referer);
            async move {
                let body = send_for_json(MARKETPLACE, request).await?;
                let envelope: Envelope<SellOrder> = decode(&body, "sell_order")?;
                let page = envelope.into_page()?;
                let cheapest = page.items.first().ok_or_else(|| FetchError::NoListings {
                    marketplace: MARKETPLACE,
                    query: goods_id.to_string(),
                })?;
                let raw = json_price_text(&cheapest.price).unwrap_or_default();
                let price =
                    parse_price(&raw).ok_or(FetchError::UnparseablePrice { raw })?;
                Ok(Listing {
                    price,
                    volume: page.total_count.unwrap_or(0),
                })
            }
        })
        .await
    }

    /// Scans search pages for an exact `market_name` match.
    async fn search_id(&self, market_name: &str) -> Result<i64, FetchError> {
        let base = &self.config.base_url;
        let encoded = utf8_percent_encode(market_name, NON_ALPHANUMERIC).to_string();
        let referer = format!("{base}/market/");

        for page in 1..=SEARCH_PAGES {
            let url = format!(
                "{base}/api/market/goods?game=csgo&page_num={page}&search={encoded}"
            );
            let hits = with_proxy_rotation(MARKETPLACE, &self.config.http, &self.proxies, |client| {
                let request = self.ajax_headers(client.get(&url), &referer);
                async move {
                    let body = send_for_json(MARKETPLACE, request).await?;
                    let envelope: Envelope<SearchHit> = decode(&body, "goods search")?;
                    Ok(envelope.into_page()?.items)
                }
            })
            .await?;

            if hits.is_empty() {
                break;
            }
            if let Some(hit) = hits.iter().find(|h| h.market_hash_name == market_name) {
                tracing::info!(
                    marketplace = %MARKETPLACE,
                    market_name,
                    goods_id = hit.id,
                    page,
                    "identifier discovered"
                );
                return Ok(hit.id);
            }
        }

        Err(FetchError::NotFound {
            marketplace: MARKETPLACE,
            query: market_name.to_string(),
        })
    }
}

#[async_trait]
impl FetchStrategy for PrimaryExchange {
    fn marketplace(&self) -> Marketplace {
        MARKETPLACE
    }

    fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            concurrency: self.config.concurrency,
            jitter_min_ms: self.config.http.jitter_min_ms,
            jitter_max_ms: self.config.http.jitter_max_ms,
        }
    }

    async fn fetch_price(&self, key: &FetchKey) -> FetchResult {
        let (identifier, outcome) = match key {
            FetchKey::Id(id) if *id > 0 => (Some(*id), self.price_by_id(*id).await),
            FetchKey::Id(id) => (
                None,
                Err(FetchError::InvalidRequest {
                    reason: format!("invalid goods identifier {id}"),
                }),
            ),
            FetchKey::Name(name) => match self.search_id(name).await {
                Ok(id) => (Some(id), self.price_by_id(id).await),
                Err(e) => (None, Err(e)),
            },
        };
        into_result(MARKETPLACE, key, identifier, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_token_is_read_from_the_cookie() {
        let cookie = "session=abc; csrf_token=IjE2Zj; Locale-Supported=zh-Hans";
        assert_eq!(csrf_token(cookie), Some("IjE2Zj"));
        assert_eq!(csrf_token("session=abc"), None);
        assert_eq!(csrf_token("csrf_token="), None);
    }

    #[test]
    fn login_required_is_credential_expired() {
        let envelope: Envelope<SellOrder> =
            serde_json::from_str(r#"{"code":"Login Required","error":"Login Required"}"#).unwrap();
        assert!(matches!(
            envelope.into_page(),
            Err(FetchError::CredentialExpired { .. })
        ));
    }

    #[test]
    fn other_error_codes_are_retriable_api_errors() {
        let envelope: Envelope<SellOrder> =
            serde_json::from_str(r#"{"code":"System Busy"}"#).unwrap();
        let err = envelope.into_page().unwrap_err();
        assert!(matches!(err, FetchError::Api { .. }));
        assert!(err.is_retriable());
        assert!(!err.evicts_proxy());
    }
}
