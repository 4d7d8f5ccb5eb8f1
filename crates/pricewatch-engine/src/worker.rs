//! Fixed pool of queue consumers.
//!
//! Each worker loops: respect the circuit breaker, pop a batch from the
//! first non-empty lane, fetch it on every configured marketplace, hand the
//! results to the reconciler, then pause. The breaker is asked again before
//! every lookup; items it leaves unchecked go to the cold lane. A batch that fails for a
//! data-store or queue reason is rolled back to the cold lane whole.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::{AppConfig, FetchKey, Item, Lane, Marketplace};
use pricewatch_scraper::{FetchResult, FetchStrategy, StrategyRegistry};
use pricewatch_store::PriorityTaskQueue;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::circuit::CircuitBreaker;
use crate::error::EngineError;
use crate::reconciler::{ReconcileReport, ResultReconciler};
use crate::repository::ItemRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub worker_count: usize,
    pub batch_size: usize,
    pub idle_sleep: Duration,
    pub batch_pause_min_ms: u64,
    pub batch_pause_max_ms: u64,
    /// Marketplaces every batch is fetched on, in order.
    pub marketplaces: Vec<Marketplace>,
}

impl WorkerSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            batch_size: config.worker_batch_size,
            idle_sleep: Duration::from_millis(config.worker_idle_sleep_ms),
            batch_pause_min_ms: config.worker_batch_pause_min_ms,
            batch_pause_max_ms: config.worker_batch_pause_max_ms,
            marketplaces: config.worker_marketplaces.clone(),
        }
    }

    fn batch_pause(&self) -> Duration {
        let (min, max) = (self.batch_pause_min_ms, self.batch_pause_max_ms);
        let ms = if max > min {
            rand::random_range(min..=max)
        } else {
            min
        };
        Duration::from_millis(ms)
    }
}

/// Summary of one processed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub lane: Lane,
    pub dequeued: usize,
    /// Dequeued ids that resolved to live items.
    pub items: usize,
    /// Marketplaces whose whole sub-batch failed.
    pub total_failures: Vec<Marketplace>,
    /// Items left unchecked because the breaker opened mid-batch; rolled back.
    pub interrupted: Vec<i64>,
    pub report: ReconcileReport,
}

/// What a single [`WorkerPool::run_once`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStep {
    CircuitOpen(Duration),
    Idle,
    Processed(BatchSummary),
    RolledBack { lane: Lane, items: usize, reason: String },
}

struct WorkerContext {
    queue: PriorityTaskQueue,
    strategies: Vec<Arc<dyn FetchStrategy>>,
    repository: Arc<dyn ItemRepository>,
    reconciler: Arc<ResultReconciler>,
    circuit: Arc<CircuitBreaker>,
    settings: WorkerSettings,
}

#[derive(Clone)]
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
}

impl WorkerPool {
    /// Resolves the configured marketplaces once, up front.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registry`] if a configured marketplace has no
    /// registered strategy.
    pub fn new(
        queue: PriorityTaskQueue,
        registry: &StrategyRegistry,
        repository: Arc<dyn ItemRepository>,
        reconciler: Arc<ResultReconciler>,
        circuit: Arc<CircuitBreaker>,
        settings: WorkerSettings,
    ) -> Result<Self, EngineError> {
        let strategies = settings
            .marketplaces
            .iter()
            .map(|m| registry.get(*m))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            ctx: Arc::new(WorkerContext {
                queue,
                strategies,
                repository,
                reconciler,
                circuit,
                settings,
            }),
        })
    }

    /// Runs one iteration of the worker loop without sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the dequeue itself, or the rollback
    /// of a failed batch, fails.
    pub async fn run_once(&self) -> Result<WorkerStep, EngineError> {
        let ctx = &self.ctx;
        if let Some(remaining) = ctx.circuit.remaining() {
            return Ok(WorkerStep::CircuitOpen(remaining));
        }

        let Some((lane, ids)) = ctx.queue.dequeue_next(ctx.settings.batch_size).await? else {
            return Ok(WorkerStep::Idle);
        };
        tracing::info!(lane = %lane, count = ids.len(), "dequeued batch");

        match self.process_batch(lane, &ids).await {
            Ok(summary) => Ok(WorkerStep::Processed(summary)),
            Err(e) => {
                tracing::error!(lane = %lane, count = ids.len(), error = %e, "batch failed, rolling back to cold lane");
                ctx.queue.requeue_cold(&ids).await?;
                Ok(WorkerStep::RolledBack {
                    lane,
                    items: ids.len(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn process_batch(&self, lane: Lane, ids: &[i64]) -> Result<BatchSummary, EngineError> {
        let ctx = &self.ctx;
        let items = ctx.repository.get_items_by_ids(ids).await?;
        if items.len() < ids.len() {
            tracing::debug!(
                dequeued = ids.len(),
                found = items.len(),
                "dropping ids with no live item"
            );
        }

        let mut results: Vec<FetchResult> = Vec::new();
        let mut total_failures = Vec::new();
        // Items that got a lookup, and items whose lookup the breaker withheld.
        let mut checked: HashSet<i64> = HashSet::new();
        let mut withheld: HashSet<i64> = HashSet::new();
        let circuit = &ctx.circuit;

        for (index, strategy) in ctx.strategies.iter().enumerate() {
            if circuit.is_open() {
                tracing::warn!(
                    skipped_marketplaces = ctx.strategies.len() - index,
                    "circuit breaker opened mid-batch"
                );
                for rest in &ctx.strategies[index..] {
                    withheld.extend(
                        items
                            .iter()
                            .filter(|item| rest.key_for(item).is_some())
                            .map(|item| item.id),
                    );
                }
                break;
            }
            let marketplace = strategy.marketplace();
            let keys = batch_keys(strategy.as_ref(), &items);
            if keys.is_empty() {
                continue;
            }

            let batch = strategy
                .fetch_batch_until(keys, &|| circuit.is_open())
                .await;
            let skipped: HashSet<FetchKey> = batch.skipped.into_iter().collect();
            for item in &items {
                match strategy.key_for(item) {
                    Some(key) if skipped.contains(&key) => {
                        withheld.insert(item.id);
                    }
                    Some(_) => {
                        checked.insert(item.id);
                    }
                    None => {}
                }
            }

            if batch.outcome.is_total_failure() {
                tracing::warn!(
                    %marketplace,
                    lane = %lane,
                    "batch-wide failure, unsuccessful items roll back to cold lane"
                );
                total_failures.push(marketplace);
            }
            results.extend(batch.outcome.into_results());
        }

        let report = ctx.reconciler.reconcile(&items, &results).await?;

        let interrupted: Vec<i64> = items
            .iter()
            .map(|item| item.id)
            .filter(|id| withheld.contains(id) && !checked.contains(id))
            .collect();
        if !interrupted.is_empty() {
            tracing::warn!(
                lane = %lane,
                count = interrupted.len(),
                "rolling back items the circuit breaker left unchecked"
            );
            ctx.queue.requeue_cold(&interrupted).await?;
        }

        Ok(BatchSummary {
            lane,
            dequeued: ids.len(),
            items: items.len(),
            total_failures,
            interrupted,
            report,
        })
    }

    /// Loops until `shutdown` flips to `true`.
    pub async fn run_worker(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker_id, "worker started");
        let settings = &self.ctx.settings;

        while !*shutdown.borrow() {
            let pause = match self.run_once().await {
                Ok(WorkerStep::CircuitOpen(remaining)) => {
                    tracing::debug!(worker_id, remaining_secs = remaining.as_secs(), "circuit open, waiting");
                    remaining
                }
                Ok(WorkerStep::Idle) => settings.idle_sleep,
                Ok(WorkerStep::Processed(_) | WorkerStep::RolledBack { .. }) => settings.batch_pause(),
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "worker iteration failed");
                    settings.idle_sleep
                }
            };

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!(worker_id, "worker stopped");
    }

    /// Spawns `worker_count` workers sharing this pool.
    #[must_use]
    pub fn spawn(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.ctx.settings.worker_count)
            .map(|worker_id| {
                let pool = self.clone();
                let rx = shutdown.clone();
                tokio::spawn(async move { pool.run_worker(worker_id, rx).await })
            })
            .collect()
    }
}

/// One key per distinct lookup.
fn batch_keys(strategy: &dyn FetchStrategy, items: &[Item]) -> Vec<FetchKey> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(|item| strategy.key_for(item))
        .filter(|key| seen.insert(key.clone()))
        .collect()
}
