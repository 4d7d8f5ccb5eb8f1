//! Shared list/hash store and the two structures built on it: the
//! three-lane [`PriorityTaskQueue`] and the region-keyed [`ProxyPool`].
//!
//! Every operation maps to a single atomic store command, so any number of
//! workers (in this process or others) can share one backend without an
//! in-process lock.

pub mod memory;
pub mod proxy;
pub mod queue;
pub mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use proxy::{ProxyEntry, ProxyPool};
pub use queue::{LaneLengths, PriorityTaskQueue, RequeueOutcome};
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("redis pool unavailable: {0}")]
    Pool(String),

    #[error("malformed value under {key}: {value}")]
    Malformed { key: String, value: String },
}

/// Minimal list + hash command set the queue and proxy pool are written
/// against.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Appends `values` to the tail of the list at `key`; returns the new length.
    async fn push_back(&self, key: &str, values: &[String]) -> Result<usize, StoreError>;

    /// Pops up to `count` values from the head of the list at `key`.
    /// A missing or empty list yields an empty vector.
    async fn pop_front(&self, key: &str, count: usize) -> Result<Vec<String>, StoreError>;

    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    /// All `(field, value)` pairs of the hash at `key`.
    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, String)>, StoreError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `field`; returns whether it was present.
    async fn hash_remove(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    /// Atomically adds `by` to an integer hash field and returns the result.
    async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
