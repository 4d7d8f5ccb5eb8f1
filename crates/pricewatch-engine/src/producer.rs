//! Periodic lane top-up from the item table.

use std::sync::Arc;

use pricewatch_core::{AppConfig, Lane, PriorityTier};
use pricewatch_store::PriorityTaskQueue;

use crate::error::EngineError;
use crate::repository::ItemRepository;

/// Per-lane backlog above which a top-up is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogLimits {
    pub hot: usize,
    pub common: usize,
    pub cold: usize,
}

impl BacklogLimits {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            hot: config.backlog_hot,
            common: config.backlog_common,
            cold: config.backlog_cold,
        }
    }

    #[must_use]
    pub fn for_lane(&self, lane: Lane) -> usize {
        match lane {
            Lane::Hot => self.hot,
            Lane::Common => self.common,
            Lane::Cold => self.cold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopUp {
    /// The lane still held `backlog` entries; nothing was added.
    Skipped { backlog: usize },
    Enqueued { count: usize },
}

#[derive(Clone)]
pub struct TaskProducer {
    repository: Arc<dyn ItemRepository>,
    queue: PriorityTaskQueue,
    limits: BacklogLimits,
}

impl TaskProducer {
    #[must_use]
    pub fn new(
        repository: Arc<dyn ItemRepository>,
        queue: PriorityTaskQueue,
        limits: BacklogLimits,
    ) -> Self {
        Self {
            repository,
            queue,
            limits,
        }
    }

    /// Enqueues every item of the lane's priority tier, unless the lane is
    /// still backed up from the previous round.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the item listing or a queue command fails.
    pub async fn top_up(&self, lane: Lane) -> Result<TopUp, EngineError> {
        let backlog = self.queue.len(lane).await?;
        let limit = self.limits.for_lane(lane);
        if backlog > limit {
            tracing::warn!(lane = %lane, backlog, limit, "lane backlog too high, skipping top-up");
            return Ok(TopUp::Skipped { backlog });
        }

        let ids = self
            .repository
            .list_item_ids_by_tier(PriorityTier::for_lane(lane))
            .await?;
        if !ids.is_empty() {
            self.queue.enqueue(lane, &ids).await?;
        }
        tracing::info!(lane = %lane, count = ids.len(), backlog, "lane topped up");
        Ok(TopUp::Enqueued { count: ids.len() })
    }
}
