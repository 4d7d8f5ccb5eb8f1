pub mod app_config;
pub mod config;
pub mod items;
pub mod marketplace;

pub use app_config::{AppConfig, Environment};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use items::{FetchKey, Item, NewPriceRecord, PriceHistoryRecord, PriorityTier};
pub use marketplace::{Lane, Marketplace, ProxyRegion, UnknownMarketplace};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
