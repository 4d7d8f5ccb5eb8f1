//! The three marketplace strategies and the response handling they share.

pub mod alternate_market;
pub mod primary_exchange;
pub mod secondary_market;

use std::sync::LazyLock;

use pricewatch_core::{FetchKey, Marketplace};
use regex::Regex;
use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::error::FetchError;
use crate::types::FetchResult;

pub use alternate_market::{AlternateMarket, AlternateMarketConfig};
pub use primary_exchange::{PrimaryExchange, PrimaryExchangeConfig};
pub use secondary_market::{SecondaryMarket, SecondaryMarketConfig};

static PAGE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title>(.*?)</title>").expect("valid title regex"));

/// Cheapest active listing and the marketplace's volume figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Listing {
    pub price: Decimal,
    pub volume: i64,
}

/// `<title>` of an HTML interstitial, if it has one.
pub(crate) fn page_title(body: &str) -> Option<String> {
    PAGE_TITLE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Sends `request` and returns the body of a JSON-looking response.
///
/// 429 is [`FetchError::RateLimited`]; 403 and any 2xx body that is not a
/// JSON object (WAF or CAPTCHA pages) are [`FetchError::Blocked`]; other
/// non-2xx statuses are [`FetchError::UnexpectedStatus`].
pub(crate) async fn send_for_json(
    marketplace: Marketplace,
    request: RequestBuilder,
) -> Result<String, FetchError> {
    let response = request.send().await?;
    let status = response.status();
    let url = response.url().to_string();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited { marketplace });
    }

    let body = response.text().await?;

    if status == StatusCode::FORBIDDEN {
        return Err(FetchError::Blocked {
            marketplace,
            title: page_title(&body),
        });
    }
    if !status.is_success() {
        return Err(FetchError::UnexpectedStatus {
            status: status.as_u16(),
            url,
        });
    }
    if !body.trim_start().starts_with('{') {
        let title = page_title(&body);
        tracing::warn!(
            %marketplace,
            title = title.as_deref().unwrap_or(""),
            "non-JSON response, treating as blocked"
        );
        return Err(FetchError::Blocked { marketplace, title });
    }
    Ok(body)
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|source| FetchError::Deserialize {
        context: context.to_string(),
        source,
    })
}

/// Turns a finished lookup into a [`FetchResult`], logging the failure.
pub(crate) fn into_result(
    marketplace: Marketplace,
    key: &FetchKey,
    identifier: Option<i64>,
    outcome: Result<Listing, FetchError>,
) -> FetchResult {
    match outcome {
        Ok(listing) => {
            tracing::info!(
                %marketplace,
                key = %key,
                identifier,
                price = %listing.price,
                volume = listing.volume,
                "price fetched"
            );
            FetchResult::success(
                marketplace,
                key.clone(),
                identifier,
                listing.price,
                listing.volume,
            )
        }
        Err(err) => {
            if matches!(err, FetchError::CredentialExpired { .. }) {
                tracing::error!(%marketplace, key = %key, "session credential expired, refresh it");
            } else {
                tracing::warn!(%marketplace, key = %key, error = %err, "price fetch failed");
            }
            FetchResult::failed(marketplace, key.clone(), identifier, &err)
        }
    }
}
