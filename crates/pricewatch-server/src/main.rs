mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use pricewatch_engine::{
    AlertPolicy, BacklogLimits, CircuitBreaker, ItemRepository, LogNotifier, Monitor, Notifier,
    PgItemRepository, PushPlusNotifier, ResultReconciler, TaskProducer, WorkerPool,
    WorkerSettings,
};
use pricewatch_scraper::StrategyRegistry;
use pricewatch_store::{PriorityTaskQueue, ProxyPool, RedisStore, SharedStore};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(pricewatch_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!(config = ?config, "starting pricewatch-server");

    let pool_config = pricewatch_db::PoolConfig::from_app_config(&config);
    let pool = pricewatch_db::connect_pool(&config.database_url, pool_config).await?;
    pricewatch_db::run_migrations(&pool).await?;
    let repository: Arc<dyn ItemRepository> = Arc::new(PgItemRepository::new(pool));

    let store: Arc<dyn SharedStore> = Arc::new(RedisStore::connect(&config.redis_url)?);
    let proxies = ProxyPool::new(Arc::clone(&store), config.key_namespace.clone());
    let queue = PriorityTaskQueue::new(
        Arc::clone(&store),
        config.key_namespace.clone(),
        config.max_rollbacks,
    );

    let registry = StrategyRegistry::from_app_config(&config, &proxies);
    let circuit = Arc::new(CircuitBreaker::new(
        config.circuit_failure_threshold,
        Duration::from_secs(config.circuit_cooldown_secs),
    ));
    let notifier: Arc<dyn Notifier> = match &config.pushplus_token {
        Some(token) => Arc::new(PushPlusNotifier::new(token.clone())?),
        None => {
            tracing::warn!("PRICEWATCH_PUSHPLUS_TOKEN not set; price alerts are logged only");
            Arc::new(LogNotifier)
        }
    };
    let reconciler = Arc::new(ResultReconciler::new(
        Arc::clone(&repository),
        queue.clone(),
        Arc::clone(&circuit),
        notifier,
        AlertPolicy::from_app_config(&config),
    ));

    let workers = WorkerPool::new(
        queue.clone(),
        &registry,
        Arc::clone(&repository),
        Arc::clone(&reconciler),
        Arc::clone(&circuit),
        WorkerSettings::from_app_config(&config),
    )?;
    let producer = TaskProducer::new(
        Arc::clone(&repository),
        queue.clone(),
        BacklogLimits::from_app_config(&config),
    );
    scheduler::prime_lanes(&producer).await;
    let mut job_scheduler = scheduler::build_scheduler(producer).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handles = workers.spawn(&shutdown_rx);
    tracing::info!(workers = worker_handles.len(), "worker pool started");

    let monitor = Arc::new(Monitor::new(
        Arc::clone(&repository),
        registry,
        reconciler,
    ));
    let auth = AuthState::from_env(matches!(
        config.env,
        pricewatch_core::Environment::Development
    ))?;
    let app = build_app(
        AppState {
            repository,
            store,
            queue,
            circuit,
            monitor,
        },
        auth,
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "http server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Workers finish their in-flight batch, then exit.
    shutdown_tx.send(true).ok();
    job_scheduler.shutdown().await?;
    for handle in worker_handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "worker task panicked");
        }
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
