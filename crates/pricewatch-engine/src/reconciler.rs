//! Maps fetch results back to items and applies them.
//!
//! For every successful result, in order: persist a newly discovered
//! marketplace identifier, compare against the latest stored price, then
//! record the price. Alerts for notable moves are sent only after the batch's
//! records are written. Items with no success
//! on any marketplace feed the circuit breaker and roll back to the cold
//! lane.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use pricewatch_core::{FetchKey, Item, Marketplace, NewPriceRecord};
use pricewatch_scraper::{FetchOutcome, FetchResult};
use pricewatch_store::PriorityTaskQueue;
use rust_decimal::Decimal;

use crate::circuit::CircuitBreaker;
use crate::error::EngineError;
use crate::notify::{dispatch, Notifier, PriceAlert};
use crate::repository::ItemRepository;
use crate::trend::{AlertPolicy, PriceChange};

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub recorded: usize,
    pub identifiers_learned: usize,
    pub alerts: usize,
    /// Items with at least one success.
    pub succeeded: Vec<i64>,
    /// Items checked somewhere with no success anywhere.
    pub failed: Vec<i64>,
    /// Failed items whose every failure was a blocking condition.
    pub blocking_failures: usize,
    pub requeued: Vec<i64>,
    pub dead_lettered: Vec<i64>,
}

/// Effect of one successful result on its item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPrice {
    pub record: NewPriceRecord,
    pub identifier_learned: Option<i64>,
    pub change: Option<PriceChange>,
    /// Alert to send once the record is persisted.
    pub alert: Option<PriceAlert>,
}

pub struct ResultReconciler {
    repository: Arc<dyn ItemRepository>,
    queue: PriorityTaskQueue,
    circuit: Arc<CircuitBreaker>,
    notifier: Arc<dyn Notifier>,
    policy: AlertPolicy,
}

/// `true` if `result` was issued for `item`.
fn matches_item(item: &Item, result: &FetchResult) -> bool {
    match &result.query {
        FetchKey::Id(id) => item.marketplace_id(result.marketplace) == Some(*id),
        FetchKey::Name(name) => &item.market_name == name,
    }
}

impl ResultReconciler {
    #[must_use]
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        queue: PriorityTaskQueue,
        circuit: Arc<CircuitBreaker>,
        notifier: Arc<dyn Notifier>,
        policy: AlertPolicy,
    ) -> Self {
        Self {
            repository,
            queue,
            circuit,
            notifier,
            policy,
        }
    }

    /// Self-learns the identifier and runs the trend check for one success.
    /// The returned record is not yet persisted and its alert not yet sent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Db`] if the identifier update or the history
    /// lookup fails.
    pub async fn apply_success(
        &self,
        item: &Item,
        marketplace: Marketplace,
        identifier: Option<i64>,
        price: Decimal,
        volume: i64,
    ) -> Result<AppliedPrice, EngineError> {
        let mut identifier_learned = None;
        if let Some(id) = identifier.filter(|_| marketplace.uses_identifier()) {
            if item.marketplace_id(marketplace) != Some(id) {
                let updated = self
                    .repository
                    .update_item_marketplace_id(item.id, marketplace, id)
                    .await?;
                if updated {
                    tracing::info!(
                        item_id = item.id,
                        %marketplace,
                        identifier = id,
                        previous = item.marketplace_id(marketplace),
                        "learned marketplace identifier"
                    );
                    identifier_learned = Some(id);
                }
            }
        }

        let previous = self
            .repository
            .get_latest_price_history(item.id, marketplace)
            .await?;
        let change = previous.and_then(|p| PriceChange::between(p.price, price));
        let alert = change
            .as_ref()
            .filter(|c| self.policy.should_alert(c))
            .map(|c| {
                tracing::warn!(
                    item_id = item.id,
                    %marketplace,
                    old_price = %c.old,
                    new_price = %c.new,
                    change = %c.text(),
                    "abnormal price movement"
                );
                PriceAlert {
                    item_name: item.display_name.clone(),
                    marketplace,
                    old_price: c.old,
                    new_price: c.new,
                    change_text: c.text(),
                }
            });

        Ok(AppliedPrice {
            record: NewPriceRecord {
                item_id: item.id,
                marketplace,
                price,
                volume,
                captured_at: Utc::now(),
            },
            identifier_learned,
            change,
            alert,
        })
    }

    /// Hands `alert` to the notifier without waiting for delivery.
    pub fn send_alert(&self, alert: PriceAlert) {
        dispatch(&self.notifier, alert);
    }

    /// Applies a worker batch's results to its items.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the data store or queue store fails. Work
    /// done before the failure is not undone.
    pub async fn reconcile(
        &self,
        items: &[Item],
        results: &[FetchResult],
    ) -> Result<ReconcileReport, EngineError> {
        let mut report = ReconcileReport::default();
        let mut records = Vec::new();
        let mut alerts = Vec::new();

        for item in items {
            let matched: Vec<&FetchResult> =
                results.iter().filter(|r| matches_item(item, r)).collect();
            if matched.is_empty() {
                continue;
            }

            let mut any_success = false;
            let mut seen_marketplaces = HashSet::new();
            for result in &matched {
                let FetchOutcome::Success { price, volume } = result.outcome else {
                    continue;
                };
                any_success = true;
                // A duplicated key in one batch must not double-record.
                if !seen_marketplaces.insert(result.marketplace) {
                    continue;
                }
                let applied = self
                    .apply_success(item, result.marketplace, result.identifier, price, volume)
                    .await?;
                report.identifiers_learned += usize::from(applied.identifier_learned.is_some());
                alerts.extend(applied.alert);
                records.push(applied.record);
            }

            if any_success {
                self.circuit.record_success();
                report.succeeded.push(item.id);
                continue;
            }

            let blocking = matched
                .iter()
                .all(|r| r.failure_kind().is_some_and(|k| k.is_blocking()));
            if blocking {
                report.blocking_failures += 1;
                self.circuit.record_failure();
            }
            tracing::warn!(
                item_id = item.id,
                blocking,
                reasons = ?matched.iter().filter_map(|r| r.failure_kind()).collect::<Vec<_>>(),
                "no marketplace succeeded for item"
            );
            report.failed.push(item.id);
        }

        if !records.is_empty() {
            let written = self.repository.append_price_history_batch(&records).await?;
            report.recorded = usize::try_from(written).unwrap_or(records.len());
        }
        // Alerts go out only once their records are written.
        report.alerts = alerts.len();
        for alert in alerts {
            self.send_alert(alert);
        }

        if !report.succeeded.is_empty() {
            self.queue.clear_rollbacks(&report.succeeded).await?;
        }
        if !report.failed.is_empty() {
            let outcome = self.queue.requeue_cold(&report.failed).await?;
            report.requeued = outcome.requeued;
            report.dead_lettered = outcome.dead_lettered;
        }

        tracing::info!(
            items = items.len(),
            recorded = report.recorded,
            learned = report.identifiers_learned,
            alerts = report.alerts,
            failed = report.failed.len(),
            requeued = report.requeued.len(),
            dead_lettered = report.dead_lettered.len(),
            "batch reconciled"
        );
        Ok(report)
    }
}
