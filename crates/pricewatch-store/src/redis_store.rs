use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::num::NonZeroUsize;

use crate::{SharedStore, StoreError};

/// [`SharedStore`] over a `deadpool-redis` connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Builds a pool for `url`. No connection is opened until first use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Pool`] if the URL cannot be turned into a pool.
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

fn to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn push_back(&self, key: &str, values: &[String]) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        if values.is_empty() {
            let len: i64 = conn.llen(key).await?;
            return Ok(to_usize(len));
        }
        let len: i64 = conn.rpush(key, values).await?;
        Ok(to_usize(len))
    }

    async fn pop_front(&self, key: &str, count: usize) -> Result<Vec<String>, StoreError> {
        let Some(count) = NonZeroUsize::new(count) else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn().await?;
        // LPOP with a count replies nil for a missing key, which decodes as empty.
        let values: Vec<String> = conn.lpop(key, Some(count)).await?;
        Ok(values)
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let len: i64 = conn.llen(key).await?;
        Ok(to_usize(len))
    }

    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.conn().await?;
        let entries: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(entries.into_iter().collect())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hash_remove(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }

    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        let value: i64 = conn.hincr(key, field, by).await?;
        Ok(value)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
