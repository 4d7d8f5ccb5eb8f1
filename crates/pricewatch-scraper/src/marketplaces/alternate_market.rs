//! Name-keyed community market. Prices are locale-formatted strings, so
//! everything goes through [`parse_price`].

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use pricewatch_core::{AppConfig, FetchKey, Item, Marketplace};
use pricewatch_store::ProxyPool;
use serde::Deserialize;

use super::{decode, into_result, send_for_json, Listing};
use crate::error::FetchError;
use crate::price::{parse_price, parse_volume};
use crate::retry::{with_proxy_rotation, HttpSettings};
use crate::strategy::FetchStrategy;
use crate::types::{BatchLimits, FetchResult};
use crate::user_agent::random_user_agent;

const MARKETPLACE: Marketplace = Marketplace::AlternateMarket;
const APP_ID: u32 = 730;
const CURRENCY: u32 = 23;

#[derive(Debug, Clone)]
pub struct AlternateMarketConfig {
    pub base_url: String,
    pub concurrency: usize,
    pub http: HttpSettings,
}

impl AlternateMarketConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.alternate_base_url.clone(),
            concurrency: config.alternate_concurrency,
            http: HttpSettings {
                max_attempts: config.alternate_max_attempts,
                ..HttpSettings::from_app_config(config)
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct PriceOverview {
    #[serde(default)]
    success: bool,
    lowest_price: Option<String>,
    volume: Option<String>,
}

impl PriceOverview {
    fn into_listing(self, market_name: &str) -> Result<Listing, FetchError> {
        if !self.success {
            return Err(FetchError::NotFound {
                marketplace: MARKETPLACE,
                query: market_name.to_string(),
            });
        }
        let raw = self.lowest_price.ok_or_else(|| FetchError::NoListings {
            marketplace: MARKETPLACE,
            query: market_name.to_string(),
        })?;
        let price = parse_price(&raw).ok_or(FetchError::UnparseablePrice { raw })?;
        let volume = self.volume.as_deref().map_or(0, parse_volume);
        Ok(Listing { price, volume })
    }
}

pub struct AlternateMarket {
    config: AlternateMarketConfig,
    proxies: ProxyPool,
}

impl AlternateMarket {
    #[must_use]
    pub fn new(config: AlternateMarketConfig, proxies: ProxyPool) -> Self {
        let config = AlternateMarketConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };
        Self { config, proxies }
    }

    async fn price_by_name(&self, market_name: &str) -> Result<Listing, FetchError> {
        let base = &self.config.base_url;
        let encoded = utf8_percent_encode(market_name, NON_ALPHANUMERIC);
        let url = format!(
            "{base}/market/priceoverview/?appid={APP_ID}&currency={CURRENCY}&market_hash_name={encoded}"
        );
        let referer = format!("{base}/market/");

        with_proxy_rotation(MARKETPLACE, &self.config.http, &self.proxies, |client| {
            let request = client
                .get(&url)
                .header(reqwest::header::USER_AGENT, random_user_agent())
                .header(reqwest::header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9")
                .header(reqwest::header::REFERER, &referer);
            async move {
                let body = send_for_json(MARKETPLACE, request).await?;
                let overview: PriceOverview = decode(&body, "price overview")?;
                overview.into_listing(market_name)
            }
        })
        .await
    }
}

#[async_trait]
impl FetchStrategy for AlternateMarket {
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

    fn key_for(&self, item: &Item) -> Option<FetchKey> {
        Some(FetchKey::Name(item.market_name.clone()))
    }

    async fn fetch_price(&self, key: &FetchKey) -> FetchResult {
        let outcome = match key {
            FetchKey::Name(name) => self.price_by_name(name).await,
            FetchKey::Id(id) => Err(FetchError::InvalidRequest {
                reason: format!("{MARKETPLACE} is queried by name, got identifier {id}"),
            }),
        };
        into_result(MARKETPLACE, key, None, outcome)
    }
}
