//! Herald - Notification Delivery Engine
//!
//! Composition root: loads configuration, wires stores, channels and the
//! event bus into the core services, then runs until Ctrl+C.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use herald_api_rpc::{RpcHandler, RpcServer};
use herald_core::application::constants::{
    ERROR_RECOVERY_SLEEP_DURATION, RETRY_SWEEP_JOB_NAME,
};
use herald_core::application::{
    command_queue, shutdown_channel, DeliveryOrchestrator, DeliveryWorker, EventRouter,
    JobActionTable, JobScheduler, RetryReconciler, RetrySweepAction,
};
use herald_core::domain::JobDefinition;
use herald_core::port::{SystemTimeProvider, UuidProvider};
use herald_infra_delivery::{FcmPushChannel, SmtpEmailChannel};
use herald_infra_nats::NatsEventBus;
use herald_infra_sqlite::{create_pool, run_migrations, SqliteJobStore, SqliteNotificationStore};

use crate::config::HeraldConfig;
use crate::telemetry::LogFormat;

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging first so configuration errors are reported through it
    let _log_guard = telemetry::init_logging(LogFormat::from_env())?;
    info!("Herald v{} starting...", herald_core::VERSION);

    // 2. Configuration
    let config = HeraldConfig::load()?;

    // 3. Database
    info!(database_url = %config.database.url, "Initializing database...");
    let pool = create_pool(&config.database.url)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 4. Adapters
    let time_provider = Arc::new(SystemTimeProvider);
    let notification_store = Arc::new(SqliteNotificationStore::new(pool.clone()));
    let job_store = Arc::new(SqliteJobStore::new(pool.clone()));
    let push = Arc::new(FcmPushChannel::new(&config.push).context("Push channel setup failed")?);
    let email =
        Arc::new(SmtpEmailChannel::new(&config.smtp).context("Email channel setup failed")?);
    let bus = Arc::new(
        NatsEventBus::connect(&config.nats)
            .await
            .context("Event bus connection failed")?,
    );

    // 5. Core services
    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        notification_store.clone(),
        push,
        email,
        time_provider.clone(),
        Arc::new(UuidProvider),
        config.retry.policy(),
        config.delivery_timeout(),
    ));
    let reconciler = Arc::new(RetryReconciler::new(
        notification_store.clone(),
        orchestrator.clone(),
        time_provider.clone(),
        config.retry.grace_period_ms,
        config.retry.batch_size,
    ));

    let actions = JobActionTable::new().register(
        RETRY_SWEEP_JOB_NAME,
        Arc::new(RetrySweepAction::new(reconciler.clone())),
    );
    let mut bootstrap = Vec::new();
    if config.scheduler.bootstrap_retry_sweep {
        bootstrap.push(
            JobDefinition::new(RETRY_SWEEP_JOB_NAME, &config.scheduler.retry_sweep_schedule)
                .with_description("Re-drive pending and failed notifications"),
        );
    }
    let scheduler = Arc::new(
        JobScheduler::new(job_store, actions, time_provider.clone()).with_bootstrap(bootstrap),
    );
    let installed = scheduler.start().await.context("Scheduler start failed")?;
    info!(installed_jobs = installed, "Scheduler started");

    // 6. Event intake: router -> bounded queue -> worker
    let (shutdown_tx, shutdown_token) = shutdown_channel();
    let (commands_tx, commands_rx) = command_queue(config.delivery.queue_capacity);

    let router = EventRouter::new(
        bus,
        config.subjects.subject_map(),
        commands_tx,
        time_provider.clone(),
    );
    let router_handle = tokio::spawn(async move {
        let exit = router
            .supervise(shutdown_token, ERROR_RECOVERY_SLEEP_DURATION)
            .await;
        info!(exit = ?exit, "Event router finished");
    });

    let worker = DeliveryWorker::new(orchestrator, config.delivery.max_concurrent);
    let worker_token = shutdown_tx.token();
    let worker_handle = tokio::spawn(async move {
        let handled = worker.run(commands_rx, worker_token).await;
        info!(handled_commands = handled, "Delivery worker finished");
    });

    // Interval sweep only when the scheduler does not own it
    let sweep_handle = if config.scheduler.bootstrap_retry_sweep {
        None
    } else {
        let reconciler = reconciler.clone();
        let every = config.sweep_interval();
        let token = shutdown_tx.token();
        Some(tokio::spawn(async move { reconciler.run(every, token).await }))
    };

    // 7. Admin RPC
    let rpc_server = RpcServer::new(
        config.rpc.clone(),
        RpcHandler::new(scheduler.clone(), reconciler, notification_store),
    );
    let (rpc_addr, rpc_handle) = rpc_server.start().await.context("RPC server start failed")?;

    info!(rpc_addr = %rpc_addr, "System ready. Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown
    shutdown_tx.shutdown();
    scheduler.stop().await;
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }

    let joined = tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, async {
        let _ = router_handle.await;
        let _ = worker_handle.await;
        if let Some(handle) = sweep_handle {
            let _ = handle.await;
        }
    })
    .await;
    if joined.is_err() {
        warn!("Background tasks did not finish in time");
    }

    pool.close().await;
    telemetry::shutdown();
    info!("Shutdown complete.");
    Ok(())
}
