//! Identifier-only marketplace queried through its app API.
//!
//! There is no name search: items without a linked template identifier are
//! skipped, and a name key is rejected as an invalid request.

use async_trait::async_trait;
use pricewatch_core::{AppConfig, FetchKey, Item, Marketplace};
use pricewatch_store::ProxyPool;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode, into_result, send_for_json, Listing};
use crate::error::FetchError;
use crate::price::{json_price_text, parse_price};
use crate::retry::{with_proxy_rotation, HttpSettings};
use crate::strategy::FetchStrategy;
use crate::types::{BatchLimits, FetchResult};
use crate::user_agent::random_user_agent;

const MARKETPLACE: Marketplace = Marketplace::SecondaryMarket;
const WEB_ORIGIN: &str = "https://youpin898.com";
const TOO_FREQUENT_MARKER: &str = "频繁";

#[derive(Debug, Clone)]
pub struct SecondaryMarketConfig {
    pub base_url: String,
    pub authorization: Option<String>,
    pub device_id: Option<String>,
    pub uk: Option<String>,
    pub app_version: String,
    pub concurrency: usize,
    pub http: HttpSettings,
}

impl SecondaryMarketConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.secondary_base_url.clone(),
            authorization: config.secondary_authorization.clone(),
            device_id: config.secondary_device_id.clone(),
            uk: config.secondary_uk.clone(),
            app_version: config.secondary_app_version.clone(),
            concurrency: config.secondary_concurrency,
            http: HttpSettings::from_app_config(config),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OnSaleQuery {
    game_id: &'static str,
    template_id: String,
    list_type: &'static str,
    list_sort_type: &'static str,
    sort_type: &'static str,
    page_index: &'static str,
    page_size: &'static str,
}

impl OnSaleQuery {
    /// Cheapest-first first page of on-sale listings for a template.
    fn cheapest_first(template_id: i64) -> Self {
        Self {
            game_id: "730",
            template_id: template_id.to_string(),
            list_type: "10",
            list_sort_type: "1",
            sort_type: "0",
            page_index: "1",
            page_size: "10",
        }
    }
}

/// The API is inconsistent about key casing, so both spellings are read.
#[derive(Debug, Deserialize)]
struct OnSaleResponse {
    #[serde(alias = "code", rename = "Code")]
    code: Option<i64>,
    #[serde(alias = "msg", rename = "Msg")]
    msg: Option<String>,
    #[serde(alias = "data", rename = "Data")]
    data: Option<Value>,
    #[serde(alias = "totalCount", rename = "TotalCount")]
    total_count: Option<i64>,
}

impl OnSaleResponse {
    fn into_listing(self, template_id: i64) -> Result<Listing, FetchError> {
        if self.code != Some(0) {
            let message = self.msg.unwrap_or_default();
            if message.contains(TOO_FREQUENT_MARKER) {
                return Err(FetchError::TooFrequent {
                    marketplace: MARKETPLACE,
                    message,
                });
            }
            return Err(FetchError::Rejected {
                marketplace: MARKETPLACE,
                message,
            });
        }

        let items = match self.data {
            Some(Value::Array(items)) => items,
            Some(Value::Object(mut obj)) => match obj.remove("CommodityList") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        let cheapest = items.first().ok_or_else(|| FetchError::NoListings {
            marketplace: MARKETPLACE,
            query: template_id.to_string(),
        })?;

        let raw = cheapest
            .get("price")
            .or_else(|| cheapest.get("Price"))
            .and_then(json_price_text)
            .unwrap_or_default();
        let price = parse_price(&raw).ok_or(FetchError::UnparseablePrice { raw })?;
        let volume = self
            .total_count
            .unwrap_or_else(|| i64::try_from(items.len()).unwrap_or(i64::MAX));
        Ok(Listing { price, volume })
    }
}

pub struct SecondaryMarket {
    config: SecondaryMarketConfig,
    proxies: ProxyPool,
}

impl SecondaryMarket {
    #[must_use]
    pub fn new(config: SecondaryMarketConfig, proxies: ProxyPool) -> Self {
        let config = SecondaryMarketConfig {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };
        Self { config, proxies }
    }

    fn app_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let version = self.config.app_version.as_str();
        let mut request = request
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .header("App-Version", version)
            .header("AppVersion", version)
            .header("platform", "pc")
            .header("appType", "1")
            .header("secret-v", "h5_v1")
            .header(reqwest::header::ORIGIN, WEB_ORIGIN)
            .header(reqwest::header::REFERER, format!("{WEB_ORIGIN}/"))
            .header(reqwest::header::ACCEPT, "application/json, text/plain, */*");
        for (name, value) in [
            ("authorization", &self.config.authorization),
            ("deviceId", &self.config.device_id),
            ("uk", &self.config.uk),
        ] {
            if let Some(value) = value {
                request = request.header(name, value);
            }
        }
        request
    }

    async fn price_by_template(&self, template_id: i64) -> Result<Listing, FetchError> {
        let url = format!(
            "{}/api/homepage/pc/goods/market/queryOnSaleCommodityList",
            self.config.base_url
        );
        let query = OnSaleQuery::cheapest_first(template_id);

        with_proxy_rotation(MARKETPLACE, &self.config.http, &self.proxies, |client| {
            let request = self.app_headers(client.post(&url)).json(&query);
            async move {
                let body = send_for_json(MARKETPLACE, request).await?;
                let response: OnSaleResponse = decode(&body, "on-sale commodity list")?;
                response.into_listing(template_id)
            }
        })
        .await
    }
}

#[async_trait]
impl FetchStrategy for SecondaryMarket {
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
        item.marketplace_id(MARKETPLACE).map(FetchKey::Id)
    }

    async fn fetch_price(&self, key: &FetchKey) -> FetchResult {
        let (identifier, outcome) = match key {
            FetchKey::Id(id) if *id > 0 => (Some(*id), self.price_by_template(*id).await),
            FetchKey::Id(_) | FetchKey::Name(_) => (
                None,
                Err(FetchError::InvalidRequest {
                    reason: format!("no identifier linked for {key}"),
                }),
            ),
        };
        into_result(MARKETPLACE, key, identifier, outcome)
    }
}
