pub mod error;
pub mod marketplaces;
pub mod price;
pub mod registry;
pub mod retry;
pub mod strategy;
pub mod types;
pub mod user_agent;

pub use error::{FailureKind, FetchError, RegistryError};
pub use marketplaces::{
    AlternateMarket, AlternateMarketConfig, PrimaryExchange, PrimaryExchangeConfig,
    SecondaryMarket, SecondaryMarketConfig,
};
pub use price::{parse_price, parse_volume};
pub use registry::StrategyRegistry;
pub use retry::HttpSettings;
pub use strategy::FetchStrategy;
pub use types::{BatchLimits, BatchOutcome, FetchOutcome, FetchResult, GatedBatch};
