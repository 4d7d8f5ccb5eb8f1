use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use pricewatch_core::{FetchKey, Item, Marketplace};

use crate::retry::random_pause;
use crate::types::{BatchLimits, BatchOutcome, FetchResult, GatedBatch};

/// Price lookups against one marketplace.
///
/// Implementations never return ordinary failures as errors: every lookup
/// produces a [`FetchResult`], and only a batch with zero successes is
/// distinguished, as [`BatchOutcome::TotalFailure`].
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    fn batch_limits(&self) -> BatchLimits;

    /// Key to look `item` up with: its stored identifier when one is known,
    /// otherwise its canonical name. `None` skips the item on this
    /// marketplace.
    fn key_for(&self, item: &Item) -> Option<FetchKey> {
        Some(match item.marketplace_id(self.marketplace()) {
            Some(id) => FetchKey::Id(id),
            None => FetchKey::Name(item.market_name.clone()),
        })
    }

    /// Looks up one item, retrying through the proxy pool as needed.
    async fn fetch_price(&self, key: &FetchKey) -> FetchResult;

    /// Fans `keys` out under the marketplace's concurrency limit, each
    /// lookup preceded by a random jitter delay. Result order is
    /// completion order.
    async fn fetch_batch(&self, keys: Vec<FetchKey>) -> BatchOutcome {
        self.fetch_batch_until(keys, &|| false).await.outcome
    }

    /// [`FetchStrategy::fetch_batch`] with a gate: `halted` is asked right
    /// before each lookup, after its jitter delay. Keys reached while it
    /// returns `true` are not looked up and come back in
    /// [`GatedBatch::skipped`]; lookups already running finish.
    async fn fetch_batch_until(
        &self,
        keys: Vec<FetchKey>,
        halted: &(dyn Fn() -> bool + Sync),
    ) -> GatedBatch {
        enum Lookup {
            Fetched(FetchResult),
            Skipped(FetchKey),
        }

        let limits = self.batch_limits();
        let marketplace = self.marketplace();
        let total = keys.len();

        let lookups: Vec<Lookup> = stream::iter(keys)
            .map(|key| async move {
                random_pause(limits.jitter_min_ms, limits.jitter_max_ms).await;
                if halted() {
                    Lookup::Skipped(key)
                } else {
                    Lookup::Fetched(self.fetch_price(&key).await)
                }
            })
            .buffer_unordered(limits.concurrency.max(1))
            .collect()
            .await;

        let mut results = Vec::with_capacity(lookups.len());
        let mut skipped = Vec::new();
        for lookup in lookups {
            match lookup {
                Lookup::Fetched(result) => results.push(result),
                Lookup::Skipped(key) => skipped.push(key),
            }
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        if skipped.is_empty() {
            tracing::info!(%marketplace, total, succeeded, "batch fetch complete");
        } else {
            tracing::warn!(
                %marketplace,
                total,
                succeeded,
                skipped = skipped.len(),
                "batch fetch halted early"
            );
        }

        GatedBatch {
            outcome: BatchOutcome::from_results(results),
            skipped,
        }
    }
}
