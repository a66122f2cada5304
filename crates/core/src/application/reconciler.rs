// Retry Reconciler
// Re-drives notifications stuck in pending, failed or stale in_flight state

use crate::application::orchestrator::DeliveryOrchestrator;
use crate::application::shutdown::ShutdownToken;
use crate::error::Result;
use crate::port::{NotificationStore, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub struct RetryReconciler {
    store: Arc<dyn NotificationStore>,
    orchestrator: Arc<DeliveryOrchestrator>,
    time_provider: Arc<dyn TimeProvider>,
    grace_period_ms: i64,
    batch_size: i64,
}

impl RetryReconciler {
    /// # Arguments
    /// * `grace_period_ms` - Age after which pending and in_flight records count as orphaned
    /// * `batch_size` - Maximum candidates examined per sweep
    pub fn new(
        store: Arc<dyn NotificationStore>,
        orchestrator: Arc<DeliveryOrchestrator>,
        time_provider: Arc<dyn TimeProvider>,
        grace_period_ms: i64,
        batch_size: i64,
    ) -> Self {
        Self {
            store,
            orchestrator,
            time_provider,
            grace_period_ms,
            batch_size,
        }
    }

    /// One reconciliation pass.
    ///
    /// Every candidate is claimed with a conditional update before it is
    /// re-driven, so overlapping sweeps never deliver the same record twice.
    ///
    /// # Returns
    /// Number of records re-driven
    pub async fn sweep(&self) -> Result<usize> {
        let now = self.time_provider.now_millis();
        let cutoff = now - self.grace_period_ms;
        let policy = self.orchestrator.retry_policy();

        let candidates = self
            .store
            .find_redelivery_candidates(cutoff, policy.max_retries, self.batch_size)
            .await?;

        debug!(
            candidates = candidates.len(),
            cutoff = cutoff,
            "Reconciliation sweep started"
        );

        let mut redriven = 0;
        for mut record in candidates {
            if !policy.is_due(&record, now) {
                continue;
            }

            let claimed = self
                .store
                .try_claim(&record.id, record.status, record.retry_count, now)
                .await?;
            if !claimed {
                debug!(notification_id = %record.id, "Claim lost to a concurrent sweep");
                continue;
            }

            let previous = record.status;
            record.claim(now);
            redriven += 1;

            match self.orchestrator.redeliver(record).await {
                Ok(outcome) => info!(
                    notification_id = %outcome.notification_id,
                    previous_status = %previous,
                    "Redelivery succeeded"
                ),
                Err(e) => warn!(error = %e, previous_status = %previous, "Redelivery failed"),
            }
        }

        let abandoned = self
            .store
            .abandon_exhausted(policy.max_retries, cutoff)
            .await?;
        if abandoned > 0 {
            warn!(abandoned = abandoned, "Abandoned notifications with exhausted retries");
        }

        info!(redriven = redriven, abandoned = abandoned, "Reconciliation sweep complete");
        Ok(redriven)
    }

    /// Sweep on a fixed interval until shutdown
    pub async fn run(&self, every: Duration, mut shutdown: ShutdownToken) {
        info!(interval_ms = every.as_millis() as u64, "Reconciliation loop started");

        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Reconciliation sweep failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Reconciliation loop shutting down");
                    break;
                }
            }
        }
    }
}
