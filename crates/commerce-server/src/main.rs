//! Composition root. Wires the store, the outbox, the task queue and the
//! stream broker together and spawns every background worker as its own
//! task, the way `analytics-service::main` does it minus the HTTP/gRPC
//! surface — this workspace has none, every crate here is a library meant
//! to be called in-process or driven by the workers below.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use db_pool::{create_pool, DbConfig};
use inventory_engine::{HashSplitAssigner, InventoryEngine};
use payment_coordinator::{MockProvider, PaymentCoordinator};
use redis_utils::RedisPool;
use store::InventoryRepository;
use stream_broker::RedisStreamBroker;
use task_queue::SqlxTaskQueueRepository;
use tokio_util::sync::CancellationToken;
use transactional_outbox::{OutboxProcessor, SqlxOutboxRepository};
use uuid::Uuid;
use workers::{AlwaysHealthyBroker, HealthMonitor, SearchIndex, SearchIndexingWorker};

/// No external search provider lives in this workspace. Logs what would be
/// indexed/deleted so the worker's queue-draining behavior is exercised
/// without inventing a fake third-party dependency.
struct LoggingSearchIndex;

#[async_trait::async_trait]
impl SearchIndex for LoggingSearchIndex {
    async fn index(&self, product_id: Uuid) -> anyhow::Result<()> {
        tracing::info!(%product_id, "search index: upsert");
        Ok(())
    }

    async fn delete(&self, product_id: Uuid) -> anyhow::Result<()> {
        tracing::info!(%product_id, "search index: delete");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,commerce_server=debug".into()),
        )
        .init();

    tracing::info!("starting commerce-server");

    let db_config = DbConfig::from_env("commerce-server").map_err(anyhow::Error::msg)?;
    let pool = create_pool(db_config)
        .await
        .context("failed to create database pool")?;

    store::MIGRATOR.run(&pool).await.context("failed to run migrations")?;

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let redis_pool = RedisPool::connect(&redis_url, None)
        .await
        .context("failed to connect to redis")?;

    let outbox_config = config_core::OutboxConfig::from_env();
    let payment_config = config_core::PaymentConfig::from_env();
    let search_config = config_core::SearchIndexingConfig::from_env();
    let monitoring_config = config_core::MonitoringConfig::from_env();
    let inventory_config = config_core::InventoryConfig::from_env();

    let outbox_repo = Arc::new(SqlxOutboxRepository::new(pool.clone()));
    let broker = Arc::new(RedisStreamBroker::new(redis_pool.manager()));
    let task_queue = Arc::new(SqlxTaskQueueRepository::new(pool.clone()));

    let payment_provider = Arc::new(MockProvider::new(
        std::env::var("PAYMENT_WEBHOOK_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
    ));
    let payment_coordinator = Arc::new(PaymentCoordinator::new(
        pool.clone(),
        payment_provider,
        outbox_repo.clone(),
    ));

    let inventory_assigner = HashSplitAssigner::new(0.5);
    let inventory_engine = Arc::new(InventoryEngine::new(
        pool.clone(),
        outbox_repo.clone(),
        inventory_assigner,
        inventory_config.optimistic_cas_retries,
    ));
    let inventory_repository = InventoryRepository::new(pool.clone());

    let shutdown = CancellationToken::new();

    // Outbox publisher. `OutboxProcessor::start` has no cooperative-shutdown
    // hook of its own, so its handle is aborted directly rather than raced
    // against the token.
    let outbox_processor = OutboxProcessor::new(
        outbox_repo.clone(),
        broker.clone(),
        outbox_config.batch_size as i32,
        Duration::from_millis(outbox_config.polling_interval_ms),
        outbox_config.max_attempts,
    );
    let outbox_handle = tokio::spawn(async move {
        if let Err(e) = outbox_processor.start().await {
            tracing::error!(error = ?e, "outbox publisher exited");
        }
    });

    let reconciliation_handle = tokio::spawn(workers::reconciliation::run_forever(
        task_queue.clone(),
        payment_coordinator.clone(),
        payment_config.reconciliation_concurrency as i32,
        Duration::from_secs(30),
        shutdown.child_token(),
    ));

    let webhook_retry_handle = tokio::spawn(workers::webhook_retry::run_forever(
        task_queue.clone(),
        payment_coordinator.clone(),
        payment_config.webhook_retry_concurrency as i32,
        payment_config.webhook_retry_base_ms as i64,
        payment_config.webhook_retry_cap_ms as i64,
        Duration::from_secs(5),
        shutdown.child_token(),
    ));

    let order_cancellation_consumer = workers::OrderCancellationReleaseConsumer::new(
        broker.clone(),
        idempotent_consumer::IdempotencyGuard::new(pool.clone(), Duration::from_secs(7 * 86_400)),
        inventory_engine.clone(),
        inventory_repository,
        "commerce-server-inventory-release",
    );
    let order_cancellation_handle = tokio::spawn(
        order_cancellation_consumer.run_forever(50, Duration::from_secs(5), shutdown.child_token()),
    );

    let health_monitor = HealthMonitor::new(
        pool.clone(),
        task_queue.clone(),
        Arc::new(AlwaysHealthyBroker),
        "commerce-server",
        vec![
            workers::webhook_retry::QUEUE.to_string(),
            workers::reconciliation::QUEUE.to_string(),
            workers::search_indexing::QUEUE.to_string(),
        ],
        monitoring_config,
    );
    let monitoring_handle = tokio::spawn(health_monitor.run_forever(shutdown.child_token()));

    let sweeper_engine = inventory_engine.clone();
    let sweeper_shutdown = shutdown.child_token();
    let inventory_sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = sweeper_shutdown.cancelled() => break,
            }
            match sweeper_engine.sweep_expired(100).await {
                Ok(n) if n > 0 => tracing::info!(released = n, "swept expired reservations"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "inventory sweep failed"),
            }
        }
    });

    let search_index = Arc::new(LoggingSearchIndex);
    let search_worker = Arc::new(SearchIndexingWorker::new(
        pool.clone(),
        search_index,
        outbox_repo.clone(),
        &search_config,
    ));
    let search_task_queue = task_queue.clone();
    let search_shutdown = shutdown.child_token();
    let search_indexing_handle = tokio::spawn(async move {
        search_worker
            .run_forever(search_task_queue, 10, Duration::from_secs(5), search_shutdown)
            .await
    });

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received, stopping workers");
    shutdown.cancel();
    outbox_handle.abort();

    let _ = tokio::join!(
        reconciliation_handle,
        webhook_retry_handle,
        order_cancellation_handle,
        monitoring_handle,
        inventory_sweep_handle,
        search_indexing_handle,
    );

    Ok(())
}
