//! Database operations for the append-only `price_history` table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use pricewatch_core::{Marketplace, NewPriceRecord, PriceHistoryRecord};

use crate::DbError;

/// A row from the `price_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceHistoryRow {
    pub id: i64,
    pub item_id: i64,
    pub marketplace: String,
    pub price: Decimal,
    pub volume: i64,
    pub captured_at: DateTime<Utc>,
}

impl TryFrom<PriceHistoryRow> for PriceHistoryRecord {
    type Error = DbError;

    fn try_from(row: PriceHistoryRow) -> Result<Self, Self::Error> {
        let marketplace =
            row.marketplace
                .parse::<Marketplace>()
                .map_err(|_| DbError::InvalidValue {
                    column: "price_history.marketplace",
                    value: row.marketplace.clone(),
                })?;

        Ok(PriceHistoryRecord {
            id: row.id,
            item_id: row.item_id,
            marketplace,
            price: row.price,
            volume: row.volume,
            captured_at: row.captured_at,
        })
    }
}

/// Returns the most recent record for `(item_id, marketplace)`.
///
/// Ordered by `captured_at DESC, id DESC` so the first row is the latest even
/// when two observations share a timestamp.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidValue`] if the stored marketplace name is unknown.
pub async fn get_latest_price_history(
    pool: &PgPool,
    item_id: i64,
    marketplace: Marketplace,
) -> Result<Option<PriceHistoryRecord>, DbError> {
    let row = sqlx::query_as::<_, PriceHistoryRow>(
        "SELECT id, item_id, marketplace, price, volume, captured_at \
         FROM price_history \
         WHERE item_id = $1 AND marketplace = $2 \
         ORDER BY captured_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(item_id)
    .bind(marketplace.name())
    .fetch_optional(pool)
    .await?;

    row.map(PriceHistoryRecord::try_from).transpose()
}

/// Appends a batch of records in a single statement.
///
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails; no row of the batch is
/// written in that case.
pub async fn append_price_history_batch(
    pool: &PgPool,
    records: &[NewPriceRecord],
) -> Result<u64, DbError> {
    if records.is_empty() {
        return Ok(0);
    }

    let item_ids: Vec<i64> = records.iter().map(|r| r.item_id).collect();
    let marketplaces: Vec<&str> = records.iter().map(|r| r.marketplace.name()).collect();
    let prices: Vec<Decimal> = records.iter().map(|r| r.price).collect();
    let volumes: Vec<i64> = records.iter().map(|r| r.volume).collect();
    let captured: Vec<DateTime<Utc>> = records.iter().map(|r| r.captured_at).collect();

    let result = sqlx::query(
        "INSERT INTO price_history (item_id, marketplace, price, volume, captured_at) \
         SELECT * FROM UNNEST($1::bigint[], $2::text[], $3::numeric[], $4::bigint[], \
                              $5::timestamptz[])",
    )
    .bind(&item_ids)
    .bind(&marketplaces)
    .bind(&prices)
    .bind(&volumes)
    .bind(&captured)
    .execute(pool)
    .await?;

    tracing::debug!(rows = result.rows_affected(), "appended price history");
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(marketplace: &str) -> PriceHistoryRow {
        PriceHistoryRow {
            id: 1,
            item_id: 42,
            marketplace: marketplace.to_string(),
            price: Decimal::new(10_000, 2),
            volume: 12,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn row_with_known_marketplace_converts() {
        let record = PriceHistoryRecord::try_from(row("SecondaryMarket")).unwrap();
        assert_eq!(record.marketplace, Marketplace::SecondaryMarket);
        assert_eq!(record.price, Decimal::new(10_000, 2));
    }

    #[test]
    fn row_with_unknown_marketplace_is_rejected() {
        let err = PriceHistoryRecord::try_from(row("MarketX")).unwrap_err();
        assert!(matches!(err, DbError::InvalidValue { ref value, .. } if value == "MarketX"));
    }
}
