use std::collections::HashMap;
use std::sync::Arc;

use pricewatch_core::{AppConfig, Marketplace};
use pricewatch_store::ProxyPool;

use crate::error::RegistryError;
use crate::marketplaces::{
    AlternateMarket, AlternateMarketConfig, PrimaryExchange, PrimaryExchangeConfig,
    SecondaryMarket, SecondaryMarketConfig,
};
use crate::strategy::FetchStrategy;

/// Marketplace name to strategy, resolved once at startup.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn FetchStrategy>>,
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers all three marketplaces from configuration, sharing one
    /// proxy pool.
    #[must_use]
    pub fn from_app_config(config: &AppConfig, proxies: &ProxyPool) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PrimaryExchange::new(
            PrimaryExchangeConfig::from_app_config(config),
            proxies.clone(),
        )));
        registry.register(Arc::new(SecondaryMarket::new(
            SecondaryMarketConfig::from_app_config(config),
            proxies.clone(),
        )));
        registry.register(Arc::new(AlternateMarket::new(
            AlternateMarketConfig::from_app_config(config),
            proxies.clone(),
        )));
        registry
    }

    /// Adds or replaces the strategy for its marketplace.
    pub fn register(&mut self, strategy: Arc<dyn FetchStrategy>) {
        let key = strategy.marketplace().name().to_ascii_lowercase();
        self.strategies.insert(key, strategy);
    }

    /// Case-insensitive lookup by marketplace name.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownMarketplace`] when nothing is registered
    /// under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn FetchStrategy>, RegistryError> {
        self.strategies
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| RegistryError::UnknownMarketplace(name.to_string()))
    }

    /// # Errors
    ///
    /// See [`StrategyRegistry::resolve`].
    pub fn get(&self, marketplace: Marketplace) -> Result<Arc<dyn FetchStrategy>, RegistryError> {
        self.resolve(marketplace.name())
    }

    /// Registered marketplaces in declaration order.
    #[must_use]
    pub fn marketplaces(&self) -> Vec<Marketplace> {
        Marketplace::ALL
            .into_iter()
            .filter(|m| self.strategies.contains_key(&m.name().to_ascii_lowercase()))
            .collect()
    }
}
