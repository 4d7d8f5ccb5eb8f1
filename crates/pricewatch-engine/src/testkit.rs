//! In-memory collaborators for exercising the engine without Postgres or
//! live marketplaces.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pricewatch_core::{
    FetchKey, Item, Marketplace, NewPriceRecord, PriceHistoryRecord, PriorityTier,
};
use pricewatch_db::DbError;
use pricewatch_scraper::{
    BatchLimits, FailureKind, FetchOutcome, FetchResult, FetchStrategy,
};
use rust_decimal::Decimal;

use crate::error::NotifyError;
use crate::notify::{Notifier, PriceAlert};
use crate::repository::ItemRepository;

/// Builds an item with no marketplace identifiers.
#[must_use]
pub fn item(id: i64, name: &str, priority: PriorityTier) -> Item {
    Item {
        id,
        market_name: name.to_string(),
        display_name: name.to_string(),
        priority,
        primary_exchange_id: None,
        secondary_market_id: None,
    }
}

#[derive(Default)]
struct RepoState {
    items: BTreeMap<i64, Item>,
    history: Vec<PriceHistoryRecord>,
    failing: bool,
    failing_writes: bool,
}

/// Mutex-backed [`ItemRepository`].
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<RepoState>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn insert_item(&self, item: Item) {
        self.lock().items.insert(item.id, item);
    }

    #[must_use]
    pub fn item(&self, id: i64) -> Option<Item> {
        self.lock().items.get(&id).cloned()
    }

    /// Stores a past observation for `item_id`.
    pub fn seed_price(&self, item_id: i64, marketplace: Marketplace, price: Decimal) {
        let mut state = self.lock();
        let id = i64::try_from(state.history.len()).unwrap_or(i64::MAX) + 1;
        state.history.push(PriceHistoryRecord {
            id,
            item_id,
            marketplace,
            price,
            volume: 0,
            captured_at: Utc::now() - chrono::Duration::hours(1),
        });
    }

    #[must_use]
    pub fn history(&self) -> Vec<PriceHistoryRecord> {
        self.lock().history.clone()
    }

    /// Makes every call fail with a data-store error until reset.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Makes only price-history writes fail until reset.
    pub fn set_failing_writes(&self, failing: bool) {
        self.lock().failing_writes = failing;
    }

    fn check(state: &RepoState) -> Result<(), DbError> {
        if state.failing {
            return Err(DbError::InvalidValue {
                column: "testkit",
                value: "repository unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ItemRepository for MemoryRepository {
    async fn get_items_by_ids(&self, ids: &[i64]) -> Result<Vec<Item>, DbError> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(ids.iter().filter_map(|id| state.items.get(id).cloned()).collect())
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>, DbError> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state.items.get(&id).cloned())
    }

    async fn get_latest_price_history(
        &self,
        item_id: i64,
        marketplace: Marketplace,
    ) -> Result<Option<PriceHistoryRecord>, DbError> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state
            .history
            .iter()
            .filter(|r| r.item_id == item_id && r.marketplace == marketplace)
            .max_by_key(|r| (r.captured_at, r.id))
            .cloned())
    }

    async fn append_price_history_batch(&self, records: &[NewPriceRecord]) -> Result<u64, DbError> {
        let mut state = self.lock();
        Self::check(&state)?;
        if state.failing_writes {
            return Err(DbError::InvalidValue {
                column: "price",
                value: "numeric field overflow".to_string(),
            });
        }
        for record in records {
            let id = i64::try_from(state.history.len()).unwrap_or(i64::MAX) + 1;
            state.history.push(PriceHistoryRecord {
                id,
                item_id: record.item_id,
                marketplace: record.marketplace,
                price: record.price,
                volume: record.volume,
                captured_at: record.captured_at,
            });
        }
        Ok(u64::try_from(records.len()).unwrap_or(u64::MAX))
    }

    async fn update_item_marketplace_id(
        &self,
        item_id: i64,
        marketplace: Marketplace,
        identifier: i64,
    ) -> Result<bool, DbError> {
        let mut state = self.lock();
        Self::check(&state)?;
        match state.items.get_mut(&item_id) {
            Some(item) => {
                item.set_marketplace_id(marketplace, identifier);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_item_ids_by_tier(&self, tier: PriorityTier) -> Result<Vec<i64>, DbError> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state
            .items
            .values()
            .filter(|item| item.priority == tier)
            .map(|item| item.id)
            .collect())
    }

    async fn ping(&self) -> Result<(), DbError> {
        Self::check(&self.lock())
    }
}

/// Collects alerts instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<PriceAlert>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<PriceAlert> {
        self.alerts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Polls until at least `count` alerts arrived or `timeout` passed.
    /// Alerts are dispatched on background tasks.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<PriceAlert> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let alerts = self.alerts();
            if alerts.len() >= count || tokio::time::Instant::now() >= deadline {
                return alerts;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_price_alert(&self, alert: &PriceAlert) -> Result<(), NotifyError> {
        self.alerts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(alert.clone());
        Ok(())
    }
}

/// Canned reply of a [`ScriptedStrategy`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Success {
        identifier: Option<i64>,
        price: Decimal,
        volume: i64,
    },
    Failure(FailureKind),
}

/// Strategy that answers from a table; unknown keys fail with `fallback`.
pub struct ScriptedStrategy {
    marketplace: Marketplace,
    replies: HashMap<FetchKey, Scripted>,
    fallback: FailureKind,
    calls: Mutex<Vec<FetchKey>>,
}

impl ScriptedStrategy {
    #[must_use]
    pub fn new(marketplace: Marketplace) -> Self {
        Self {
            marketplace,
            replies: HashMap::new(),
            fallback: FailureKind::NotFound,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn reply(mut self, key: FetchKey, reply: Scripted) -> Self {
        self.replies.insert(key, reply);
        self
    }

    #[must_use]
    pub fn fallback(mut self, kind: FailureKind) -> Self {
        self.fallback = kind;
        self
    }

    /// Keys looked up so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<FetchKey> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FetchStrategy for ScriptedStrategy {
    fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            concurrency: 4,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
        }
    }

    async fn fetch_price(&self, key: &FetchKey) -> FetchResult {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(key.clone());

        let known_id = match key {
            FetchKey::Id(id) => Some(*id),
            FetchKey::Name(_) => None,
        };
        let outcome = match self.replies.get(key) {
            Some(Scripted::Success {
                identifier,
                price,
                volume,
            }) => {
                return FetchResult::success(
                    self.marketplace,
                    key.clone(),
                    identifier.or(known_id),
                    *price,
                    *volume,
                );
            }
            Some(Scripted::Failure(kind)) => *kind,
            None => self.fallback,
        };
        FetchResult {
            marketplace: self.marketplace,
            query: key.clone(),
            identifier: known_id,
            outcome: FetchOutcome::Failed {
                kind: outcome,
                reason: format!("scripted {outcome}"),
            },
        }
    }
}
