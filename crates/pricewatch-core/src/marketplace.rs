//! Marketplaces, queue lanes and proxy regions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An external price source.
///
/// `PrimaryExchange` and `SecondaryMarket` key their listings by a numeric
/// identifier that has to be discovered per item; `AlternateMarket` is
/// queried by canonical market name directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marketplace {
    PrimaryExchange,
    SecondaryMarket,
    AlternateMarket,
}

impl Marketplace {
    pub const ALL: [Marketplace; 3] = [
        Marketplace::PrimaryExchange,
        Marketplace::SecondaryMarket,
        Marketplace::AlternateMarket,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Marketplace::PrimaryExchange => "PrimaryExchange",
            Marketplace::SecondaryMarket => "SecondaryMarket",
            Marketplace::AlternateMarket => "AlternateMarket",
        }
    }

    /// Proxy pool the marketplace's requests egress through.
    #[must_use]
    pub fn proxy_region(self) -> ProxyRegion {
        match self {
            Marketplace::AlternateMarket => ProxyRegion::International,
            Marketplace::PrimaryExchange | Marketplace::SecondaryMarket => ProxyRegion::Domestic,
        }
    }

    /// `true` when results are matched back to items by a stored numeric
    /// identifier rather than by canonical name.
    #[must_use]
    pub fn uses_identifier(self) -> bool {
        !matches!(self, Marketplace::AlternateMarket)
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown marketplace: {0}")]
pub struct UnknownMarketplace(pub String);

impl FromStr for Marketplace {
    type Err = UnknownMarketplace;

    /// Case-insensitive match on the marketplace name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Marketplace::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownMarketplace(s.to_string()))
    }
}

/// One of the three priority lanes of the task queue, drained in
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Hot,
    Common,
    Cold,
}

impl Lane {
    /// Lanes in strict dequeue priority order.
    pub const PRIORITY_ORDER: [Lane; 3] = [Lane::Hot, Lane::Common, Lane::Cold];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Hot => "hot",
            Lane::Common => "common",
            Lane::Cold => "cold",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proxy keyspace: domestic endpoints for the local marketplaces,
/// international endpoints for the overseas one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyRegion {
    Domestic,
    International,
}

impl ProxyRegion {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyRegion::Domestic => "domestic",
            ProxyRegion::International => "international",
        }
    }
}

impl fmt::Display for ProxyRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marketplace_parse_is_case_insensitive() {
        assert_eq!(
            "primaryexchange".parse::<Marketplace>().unwrap(),
            Marketplace::PrimaryExchange
        );
        assert_eq!(
            " SECONDARYMARKET ".parse::<Marketplace>().unwrap(),
            Marketplace::SecondaryMarket
        );
        assert_eq!(
            "AlternateMarket".parse::<Marketplace>().unwrap(),
            Marketplace::AlternateMarket
        );
    }

    #[test]
    fn marketplace_parse_rejects_unknown_names() {
        let err = "MarketX".parse::<Marketplace>().unwrap_err();
        assert_eq!(err, UnknownMarketplace("MarketX".to_string()));
    }

    #[test]
    fn alternate_market_uses_international_proxies_and_names() {
        assert_eq!(
            Marketplace::AlternateMarket.proxy_region(),
            ProxyRegion::International
        );
        assert!(!Marketplace::AlternateMarket.uses_identifier());
        assert_eq!(
            Marketplace::PrimaryExchange.proxy_region(),
            ProxyRegion::Domestic
        );
    }

    #[test]
    fn lanes_drain_hot_first() {
        assert_eq!(Lane::PRIORITY_ORDER, [Lane::Hot, Lane::Common, Lane::Cold]);
        assert_eq!(Lane::Cold.to_string(), "cold");
    }
}
