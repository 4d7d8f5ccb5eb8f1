//! Three-lane FIFO task queue of item ids.

use std::sync::Arc;

use pricewatch_core::Lane;
use serde::Serialize;

use crate::{SharedStore, StoreError};

/// Lengths of every lane plus the dead-letter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LaneLengths {
    pub hot: usize,
    pub common: usize,
    pub cold: usize,
    pub dead: usize,
}

/// Result of a cold-lane rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequeueOutcome {
    pub requeued: Vec<i64>,
    pub dead_lettered: Vec<i64>,
}

/// Hot/common/cold lanes over a [`SharedStore`].
///
/// Lane pop is the only coordination between workers: each pop is a single
/// store command, so concurrent pollers never receive the same entry.
#[derive(Clone)]
pub struct PriorityTaskQueue {
    store: Arc<dyn SharedStore>,
    namespace: String,
    max_rollbacks: u32,
}

impl PriorityTaskQueue {
    pub fn new(store: Arc<dyn SharedStore>, namespace: impl Into<String>, max_rollbacks: u32) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            max_rollbacks,
        }
    }

    fn lane_key(&self, lane: Lane) -> String {
        format!("{}:queue:{}", self.namespace, lane.as_str())
    }

    fn dead_key(&self) -> String {
        format!("{}:queue:dead", self.namespace)
    }

    fn rollbacks_key(&self) -> String {
        format!("{}:queue:rollbacks", self.namespace)
    }

    /// Appends `item_ids` to the tail of `lane`; returns the lane's new length.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store command fails.
    pub async fn enqueue(&self, lane: Lane, item_ids: &[i64]) -> Result<usize, StoreError> {
        let values: Vec<String> = item_ids.iter().map(ToString::to_string).collect();
        let len = self.store.push_back(&self.lane_key(lane), &values).await?;
        tracing::debug!(lane = %lane, count = item_ids.len(), len, "enqueued items");
        Ok(len)
    }

    /// Pops at most `max` ids from the head of `lane` without blocking.
    ///
    /// An empty lane returns an empty vector. Entries that are not integers
    /// are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store command fails.
    pub async fn dequeue_batch(&self, lane: Lane, max: usize) -> Result<Vec<i64>, StoreError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let raw = self.store.pop_front(&self.lane_key(lane), max).await?;
        Ok(parse_ids(lane, raw))
    }

    /// Pops a batch from the first non-empty lane in hot, common, cold order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a store command fails.
    pub async fn dequeue_next(&self, max: usize) -> Result<Option<(Lane, Vec<i64>)>, StoreError> {
        for lane in Lane::PRIORITY_ORDER {
            let ids = self.dequeue_batch(lane, max).await?;
            if !ids.is_empty() {
                return Ok(Some((lane, ids)));
            }
        }
        Ok(None)
    }

    /// # Errors
    ///
    /// Returns [`StoreError`] if the store command fails.
    pub async fn len(&self, lane: Lane) -> Result<usize, StoreError> {
        self.store.list_len(&self.lane_key(lane)).await
    }

    /// # Errors
    ///
    /// Returns [`StoreError`] if a store command fails.
    pub async fn lengths(&self) -> Result<LaneLengths, StoreError> {
        Ok(LaneLengths {
            hot: self.len(Lane::Hot).await?,
            common: self.len(Lane::Common).await?,
            cold: self.len(Lane::Cold).await?,
            dead: self.store.list_len(&self.dead_key()).await?,
        })
    }

    /// Rolls items back to the cold lane.
    ///
    /// Each rollback bumps the item's counter; once it exceeds
    /// `max_rollbacks` the item goes to the dead-letter list instead and its
    /// counter is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a store command fails. Items handled before
    /// the failure stay where they were written.
    pub async fn requeue_cold(&self, item_ids: &[i64]) -> Result<RequeueOutcome, StoreError> {
        let rollbacks_key = self.rollbacks_key();
        let mut outcome = RequeueOutcome::default();

        for &id in item_ids {
            let field = id.to_string();
            let count = self.store.hash_incr(&rollbacks_key, &field, 1).await?;
            if count > i64::from(self.max_rollbacks) {
                outcome.dead_lettered.push(id);
                self.store.hash_remove(&rollbacks_key, &field).await?;
            } else {
                outcome.requeued.push(id);
            }
        }

        if !outcome.requeued.is_empty() {
            self.enqueue(Lane::Cold, &outcome.requeued).await?;
        }
        if !outcome.dead_lettered.is_empty() {
            let values: Vec<String> = outcome.dead_lettered.iter().map(ToString::to_string).collect();
            self.store.push_back(&self.dead_key(), &values).await?;
            tracing::warn!(
                count = outcome.dead_lettered.len(),
                max_rollbacks = self.max_rollbacks,
                "items exceeded rollback limit; moved to dead-letter list"
            );
        }

        Ok(outcome)
    }

    /// Forgets the rollback history of items that were fetched successfully.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a store command fails.
    pub async fn clear_rollbacks(&self, item_ids: &[i64]) -> Result<(), StoreError> {
        let key = self.rollbacks_key();
        for id in item_ids {
            self.store.hash_remove(&key, &id.to_string()).await?;
        }
        Ok(())
    }
}

fn parse_ids(lane: Lane, raw: Vec<String>) -> Vec<i64> {
    raw.into_iter()
        .filter_map(|value| match value.trim().parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(lane = %lane, value, "dropping malformed queue entry");
                None
            }
        })
        .collect()
}
