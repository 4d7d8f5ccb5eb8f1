use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::marketplace::{Lane, Marketplace};

/// Monitoring priority tier of an [`Item`], persisted as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Common,
    Hot,
    Cold,
}

impl PriorityTier {
    #[must_use]
    pub fn code(self) -> i16 {
        match self {
            PriorityTier::Common => 0,
            PriorityTier::Hot => 1,
            PriorityTier::Cold => 2,
        }
    }

    /// Unknown codes fall back to `Common`.
    #[must_use]
    pub fn from_code(code: i16) -> Self {
        match code {
            1 => PriorityTier::Hot,
            2 => PriorityTier::Cold,
            _ => PriorityTier::Common,
        }
    }

    /// Queue lane this tier is scheduled into.
    #[must_use]
    pub fn lane(self) -> Lane {
        match self {
            PriorityTier::Hot => Lane::Hot,
            PriorityTier::Common => Lane::Common,
            PriorityTier::Cold => Lane::Cold,
        }
    }

    #[must_use]
    pub fn for_lane(lane: Lane) -> Self {
        match lane {
            Lane::Hot => PriorityTier::Hot,
            Lane::Common => PriorityTier::Common,
            Lane::Cold => PriorityTier::Cold,
        }
    }
}

/// A monitored good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    /// Canonical market name, the natural key used for marketplace search.
    pub market_name: String,
    pub display_name: String,
    pub priority: PriorityTier,
    pub primary_exchange_id: Option<i64>,
    pub secondary_market_id: Option<i64>,
}

impl Item {
    /// Stored marketplace identifier; non-positive values count as unknown.
    #[must_use]
    pub fn marketplace_id(&self, marketplace: Marketplace) -> Option<i64> {
        let id = match marketplace {
            Marketplace::PrimaryExchange => self.primary_exchange_id,
            Marketplace::SecondaryMarket => self.secondary_market_id,
            Marketplace::AlternateMarket => None,
        };
        id.filter(|v| *v > 0)
    }

    pub fn set_marketplace_id(&mut self, marketplace: Marketplace, id: i64) {
        match marketplace {
            Marketplace::PrimaryExchange => self.primary_exchange_id = Some(id),
            Marketplace::SecondaryMarket => self.secondary_market_id = Some(id),
            Marketplace::AlternateMarket => {}
        }
    }
}

/// Key a marketplace lookup is issued with: either the canonical name
/// (which triggers identifier discovery where the marketplace needs one) or
/// a previously discovered identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchKey {
    Name(String),
    Id(i64),
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchKey::Name(name) => f.write_str(name),
            FetchKey::Id(id) => write!(f, "{id}"),
        }
    }
}

/// A persisted, append-only price observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistoryRecord {
    pub id: i64,
    pub item_id: i64,
    pub marketplace: Marketplace,
    pub price: Decimal,
    pub volume: i64,
    pub captured_at: DateTime<Utc>,
}

/// A price observation waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPriceRecord {
    pub item_id: i64,
    pub marketplace: Marketplace,
    pub price: Decimal,
    pub volume: i64,
    pub captured_at: DateTime<Utc>,
}
