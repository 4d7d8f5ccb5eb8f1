//! Database operations for `items`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pricewatch_core::{Item, Marketplace, PriorityTier};

use crate::DbError;

/// A row from the `items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub id: i64,
    pub market_name: String,
    pub display_name: String,
    /// `0` common, `1` hot, `2` cold.
    pub priority: i16,
    pub primary_exchange_id: Option<i64>,
    pub secondary_market_id: Option<i64>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            market_name: row.market_name,
            display_name: row.display_name,
            priority: PriorityTier::from_code(row.priority),
            primary_exchange_id: row.primary_exchange_id,
            secondary_market_id: row.secondary_market_id,
        }
    }
}

const ITEM_COLUMNS: &str = "id, market_name, display_name, priority, primary_exchange_id, \
     secondary_market_id, is_deleted, created_at, updated_at";

/// Column holding the discovered identifier for `marketplace`, or `None`
/// for marketplaces queried by name only.
fn identifier_column(marketplace: Marketplace) -> Option<&'static str> {
    match marketplace {
        Marketplace::PrimaryExchange => Some("primary_exchange_id"),
        Marketplace::SecondaryMarket => Some("secondary_market_id"),
        Marketplace::AlternateMarket => None,
    }
}

/// Loads the non-deleted items whose ids appear in `ids`.
///
/// Missing or soft-deleted ids are silently absent from the result; order
/// follows `id`, not the input.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_items_by_ids(pool: &PgPool, ids: &[i64]) -> Result<Vec<Item>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items \
         WHERE id = ANY($1) AND is_deleted = FALSE \
         ORDER BY id"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Item::from).collect())
}

/// Loads one non-deleted item.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no such item exists, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_item_by_id(pool: &PgPool, id: i64) -> Result<Item, DbError> {
    sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 AND is_deleted = FALSE"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(Item::from)
    .ok_or(DbError::NotFound)
}

/// Stores a discovered marketplace identifier on an item.
///
/// Returns `false` when nothing was written: either the marketplace is
/// name-keyed or the item does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_item_marketplace_id(
    pool: &PgPool,
    item_id: i64,
    marketplace: Marketplace,
    identifier: i64,
) -> Result<bool, DbError> {
    let Some(column) = identifier_column(marketplace) else {
        return Ok(false);
    };

    let result = sqlx::query(&format!(
        "UPDATE items SET {column} = $2, updated_at = NOW() WHERE id = $1"
    ))
    .bind(item_id)
    .bind(identifier)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Lists ids of non-deleted items in a priority tier, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_item_ids_by_tier(pool: &PgPool, tier: PriorityTier) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM items \
         WHERE priority = $1 AND is_deleted = FALSE \
         ORDER BY id",
    )
    .bind(tier.code())
    .fetch_all(pool)
    .await?;

    Ok(ids)
}
