//! Data-store seam used by the reconciler, workers and producer.

use async_trait::async_trait;
use pricewatch_core::{Item, Marketplace, NewPriceRecord, PriceHistoryRecord, PriorityTier};
use pricewatch_db::DbError;
use sqlx::PgPool;

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn get_items_by_ids(&self, ids: &[i64]) -> Result<Vec<Item>, DbError>;

    async fn get_item(&self, id: i64) -> Result<Option<Item>, DbError>;

    async fn get_latest_price_history(
        &self,
        item_id: i64,
        marketplace: Marketplace,
    ) -> Result<Option<PriceHistoryRecord>, DbError>;

    async fn append_price_history_batch(&self, records: &[NewPriceRecord]) -> Result<u64, DbError>;

    /// Returns whether a row was updated.
    async fn update_item_marketplace_id(
        &self,
        item_id: i64,
        marketplace: Marketplace,
        identifier: i64,
    ) -> Result<bool, DbError>;

    async fn list_item_ids_by_tier(&self, tier: PriorityTier) -> Result<Vec<i64>, DbError>;

    /// Round-trip to the backing store.
    async fn ping(&self) -> Result<(), DbError>;
}

/// Postgres-backed repository.
#[derive(Clone)]
pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn get_items_by_ids(&self, ids: &[i64]) -> Result<Vec<Item>, DbError> {
        pricewatch_db::get_items_by_ids(&self.pool, ids).await
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>, DbError> {
        match pricewatch_db::get_item_by_id(&self.pool, id).await {
            Ok(item) => Ok(Some(item)),
            Err(DbError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_latest_price_history(
        &self,
        item_id: i64,
        marketplace: Marketplace,
    ) -> Result<Option<PriceHistoryRecord>, DbError> {
        pricewatch_db::get_latest_price_history(&self.pool, item_id, marketplace).await
    }

    async fn append_price_history_batch(&self, records: &[NewPriceRecord]) -> Result<u64, DbError> {
        pricewatch_db::append_price_history_batch(&self.pool, records).await
    }

    async fn update_item_marketplace_id(
        &self,
        item_id: i64,
        marketplace: Marketplace,
        identifier: i64,
    ) -> Result<bool, DbError> {
        pricewatch_db::update_item_marketplace_id(&self.pool, item_id, marketplace, identifier)
            .await
    }

    async fn list_item_ids_by_tier(&self, tier: PriorityTier) -> Result<Vec<i64>, DbError> {
        pricewatch_db::list_item_ids_by_tier(&self.pool, tier).await
    }

    async fn ping(&self) -> Result<(), DbError> {
        pricewatch_db::health_check(&self.pool).await
    }
}
