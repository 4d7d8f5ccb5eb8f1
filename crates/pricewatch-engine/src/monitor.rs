//! On-demand check of one item across every registered marketplace.
//!
//! Runs the same per-success reconciliation as the scheduled pipeline but
//! bypasses the queue and the circuit breaker.

use std::collections::BTreeMap;
use std::sync::Arc;

use pricewatch_core::{Item, Marketplace};
use pricewatch_scraper::{FailureKind, FetchOutcome, FetchStrategy, StrategyRegistry};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::EngineError;
use crate::reconciler::ResultReconciler;
use crate::repository::ItemRepository;
use crate::trend::TrendTag;

/// Result of a manual check on one marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketplaceStatus {
    pub marketplace: Marketplace,
    pub success: bool,
    pub price: Option<Decimal>,
    pub volume: Option<i64>,
    pub identifier: Option<i64>,
    /// Human-readable outcome, e.g. `"ok"` or the failure reason.
    pub status: String,
    pub change: Option<String>,
    pub tag: Option<TrendTag>,
    pub failure: Option<FailureKind>,
}

impl MarketplaceStatus {
    fn failed(marketplace: Marketplace, status: String, failure: Option<FailureKind>) -> Self {
        Self {
            marketplace,
            success: false,
            price: None,
            volume: None,
            identifier: None,
            status,
            change: None,
            tag: None,
            failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub item_id: i64,
    pub item_name: String,
    /// Keyed by marketplace name.
    pub marketplaces: BTreeMap<String, MarketplaceStatus>,
}

pub struct Monitor {
    repository: Arc<dyn ItemRepository>,
    registry: StrategyRegistry,
    reconciler: Arc<ResultReconciler>,
}

impl Monitor {
    #[must_use]
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        registry: StrategyRegistry,
        reconciler: Arc<ResultReconciler>,
    ) -> Self {
        Self {
            repository,
            registry,
            reconciler,
        }
    }

    /// Checks `item_id` on every registered marketplace now.
    ///
    /// A failure on one marketplace is reported in its status entry and
    /// never fails the whole check.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ItemNotFound`] for an unknown item, or
    /// [`EngineError::Db`] if the item lookup fails.
    pub async fn monitor_item(&self, item_id: i64) -> Result<MonitorReport, EngineError> {
        let item = self
            .repository
            .get_item(item_id)
            .await?
            .ok_or(EngineError::ItemNotFound(item_id))?;

        let mut marketplaces = BTreeMap::new();
        for marketplace in self.registry.marketplaces() {
            let status = match self.registry.get(marketplace) {
                Ok(strategy) => self.check(&item, strategy.as_ref()).await,
                Err(e) => MarketplaceStatus::failed(marketplace, e.to_string(), None),
            };
            marketplaces.insert(marketplace.name().to_string(), status);
        }

        let succeeded = marketplaces.values().filter(|s| s.success).count();
        tracing::info!(
            item_id,
            marketplaces = marketplaces.len(),
            succeeded,
            "manual monitor complete"
        );

        Ok(MonitorReport {
            item_id,
            item_name: item.display_name.clone(),
            marketplaces,
        })
    }

    async fn check(&self, item: &Item, strategy: &dyn FetchStrategy) -> MarketplaceStatus {
        let marketplace = strategy.marketplace();
        let Some(key) = strategy.key_for(item) else {
            return MarketplaceStatus::failed(
                marketplace,
                "no identifier linked".to_string(),
                Some(FailureKind::InvalidRequest),
            );
        };

        let result = strategy.fetch_price(&key).await;
        let (price, volume) = match result.outcome {
            FetchOutcome::Success { price, volume } => (price, volume),
            FetchOutcome::Failed { kind, reason } => {
                return MarketplaceStatus::failed(marketplace, reason, Some(kind));
            }
        };

        let applied = match self
            .reconciler
            .apply_success(item, marketplace, result.identifier, price, volume)
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                tracing::error!(item_id = item.id, %marketplace, error = %e, "manual monitor reconcile failed");
                return MarketplaceStatus::failed(marketplace, format!("system error: {e}"), None);
            }
        };
        if let Err(e) = self
            .repository
            .append_price_history_batch(std::slice::from_ref(&applied.record))
            .await
        {
            tracing::error!(item_id = item.id, %marketplace, error = %e, "manual monitor record failed");
            return MarketplaceStatus::failed(marketplace, format!("system error: {e}"), None);
        }
        if let Some(alert) = applied.alert {
            self.reconciler.send_alert(alert);
        }

        MarketplaceStatus {
            marketplace,
            success: true,
            price: Some(price),
            volume: Some(volume),
            identifier: result.identifier,
            status: "ok".to_string(),
            change: applied.change.as_ref().map(|c| c.text()),
            tag: applied.change.as_ref().and_then(|c| c.tag()),
            failure: None,
        }
    }
}
