//! Background job scheduler.
//!
//! Registers the recurring lane top-up jobs that feed the worker pool.

use std::sync::Arc;

use pricewatch_core::Lane;
use pricewatch_engine::{TaskProducer, TopUp};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Cron schedule (with seconds) for each lane's top-up.
const LANE_SCHEDULES: [(Lane, &str); 3] = [
    (Lane::Hot, "0 */5 * * * *"),
    (Lane::Common, "0 0 */4 * * *"),
    (Lane::Cold, "0 0 */12 * * *"),
];

/// Builds and starts the scheduler.
///
/// The returned handle must be kept alive for the lifetime of the process;
/// dropping it stops all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(producer: TaskProducer) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let producer = Arc::new(producer);

    for (lane, schedule) in LANE_SCHEDULES {
        register_top_up_job(&scheduler, Arc::clone(&producer), lane, schedule).await?;
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_top_up_job(
    scheduler: &JobScheduler,
    producer: Arc<TaskProducer>,
    lane: Lane,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let producer = Arc::clone(&producer);
        Box::pin(async move {
            run_top_up(&producer, lane).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(lane = %lane, schedule, "scheduler: registered lane top-up");
    Ok(())
}

async fn run_top_up(producer: &TaskProducer, lane: Lane) {
    match producer.top_up(lane).await {
        Ok(TopUp::Enqueued { count }) => {
            tracing::info!(lane = %lane, count, "scheduler: lane top-up complete");
        }
        Ok(TopUp::Skipped { backlog }) => {
            tracing::info!(lane = %lane, backlog, "scheduler: lane top-up skipped");
        }
        Err(e) => {
            tracing::error!(lane = %lane, error = %e, "scheduler: lane top-up failed");
        }
    }
}

/// Enqueues every lane once, so a fresh deployment starts with work.
pub async fn prime_lanes(producer: &TaskProducer) {
    for (lane, _) in LANE_SCHEDULES {
        run_top_up(producer, lane).await;
    }
}
