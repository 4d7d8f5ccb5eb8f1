use std::fmt;

use pricewatch_core::Marketplace;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {marketplace} (HTTP 429)")]
    RateLimited { marketplace: Marketplace },

    #[error("blocked by {marketplace}: {}", title.as_deref().unwrap_or("non-JSON response"))]
    Blocked {
        marketplace: Marketplace,
        /// `<title>` of the interstitial page when one was present.
        title: Option<String>,
    },

    #[error("{marketplace} reports requests are too frequent: {message}")]
    TooFrequent {
        marketplace: Marketplace,
        message: String,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("{marketplace} session credential expired")]
    CredentialExpired { marketplace: Marketplace },

    #[error("no {marketplace} listing matches {query}")]
    NotFound {
        marketplace: Marketplace,
        query: String,
    },

    #[error("{marketplace} has no active listings for {query}")]
    NoListings {
        marketplace: Marketplace,
        query: String,
    },

    #[error("{marketplace} rejected the request: {message}")]
    Rejected {
        marketplace: Marketplace,
        message: String,
    },

    /// Business error that a different egress may not see; retried without
    /// evicting the proxy.
    #[error("{marketplace} API error: {message}")]
    Api {
        marketplace: Marketplace,
        message: String,
    },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unparseable price {raw:?}")]
    UnparseablePrice { raw: String },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// `true` if another attempt (through another egress) may succeed.
    ///
    /// Network failures, 429s, WAF/CAPTCHA pages, "too frequent" business
    /// errors, unknown API errors and 5xx statuses are retriable; every
    /// per-item verdict (not found, no listings, expired credentials,
    /// malformed input, unparseable data) is terminal.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            FetchError::Http(_)
            | FetchError::RateLimited { .. }
            | FetchError::Blocked { .. }
            | FetchError::TooFrequent { .. }
            | FetchError::Api { .. } => true,
            FetchError::UnexpectedStatus { status, .. } => *status >= 500,
            FetchError::CredentialExpired { .. }
            | FetchError::NotFound { .. }
            | FetchError::NoListings { .. }
            | FetchError::Rejected { .. }
            | FetchError::InvalidRequest { .. }
            | FetchError::Deserialize { .. }
            | FetchError::UnparseablePrice { .. }
            | FetchError::RetriesExhausted { .. } => false,
        }
    }

    /// `true` if the proxy that produced this error should leave the pool.
    #[must_use]
    pub fn evicts_proxy(&self) -> bool {
        matches!(
            self,
            FetchError::Http(_)
                | FetchError::RateLimited { .. }
                | FetchError::Blocked { .. }
                | FetchError::TooFrequent { .. }
        )
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Http(_) => FailureKind::Network,
            FetchError::RateLimited { .. } => FailureKind::RateLimited,
            FetchError::Blocked { .. } => FailureKind::Blocked,
            FetchError::TooFrequent { .. } => FailureKind::TooFrequent,
            FetchError::UnexpectedStatus { status, .. } if *status >= 500 => FailureKind::Network,
            FetchError::UnexpectedStatus { .. }
            | FetchError::Rejected { .. }
            | FetchError::Api { .. }
            | FetchError::Deserialize { .. } => FailureKind::Rejected,
            FetchError::CredentialExpired { .. } => FailureKind::CredentialExpired,
            FetchError::NotFound { .. } => FailureKind::NotFound,
            FetchError::NoListings { .. } => FailureKind::NoListings,
            FetchError::InvalidRequest { .. } => FailureKind::InvalidRequest,
            FetchError::UnparseablePrice { .. } => FailureKind::UnparseablePrice,
            FetchError::RetriesExhausted { last, .. } => last.kind(),
        }
    }
}

/// Stable classification of a failed fetch, carried on the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Blocked,
    RateLimited,
    TooFrequent,
    Network,
    NotFound,
    NoListings,
    InvalidRequest,
    CredentialExpired,
    UnparseablePrice,
    Rejected,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Blocked => "blocked",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::TooFrequent => "too_frequent",
            FailureKind::Network => "network",
            FailureKind::NotFound => "not_found",
            FailureKind::NoListings => "no_listings",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::CredentialExpired => "credential_expired",
            FailureKind::UnparseablePrice => "unparseable_price",
            FailureKind::Rejected => "rejected",
        }
    }

    /// Conditions that point at our egress being blocked rather than at the
    /// item itself. Only these feed the circuit breaker.
    #[must_use]
    pub fn is_blocking(self) -> bool {
        matches!(
            self,
            FailureKind::Blocked
                | FailureKind::RateLimited
                | FailureKind::TooFrequent
                | FailureKind::Network
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no fetch strategy registered for marketplace '{0}'")]
    UnknownMarketplace(String),
}
