//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::to_rpc_error;
use crate::types::{
    DeleteJobResponse, JobIdRequest, JobRequest, JobResponse, ListJobsRequest, ListJobsResponse,
    RunJobResponse, StatsRequest, StatsResponse, SweepRequest, SweepResponse,
};
use herald_core::application::{FireOutcome, JobScheduler, RetryReconciler};
use herald_core::domain::{JobId, NotificationStatus, ScheduledJob};
use herald_core::error::AppError;
use herald_core::port::NotificationStore;
use jsonrpsee::types::ErrorObjectOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    scheduler: Arc<JobScheduler>,
    reconciler: Arc<RetryReconciler>,
    notification_store: Arc<dyn NotificationStore>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(
        scheduler: Arc<JobScheduler>,
        reconciler: Arc<RetryReconciler>,
        notification_store: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            scheduler,
            reconciler,
            notification_store,
            start_time: std::time::Instant::now(),
        }
    }

    async fn live_ids(&self) -> HashSet<JobId> {
        self.scheduler
            .live_handles()
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    async fn describe(&self, job: ScheduledJob) -> JobResponse {
        let scheduled = self.live_ids().await.contains(&job.id);
        JobResponse { job, scheduled }
    }

    /// jobs.add.v1
    pub async fn add_job(&self, params: JobRequest) -> Result<JobResponse, ErrorObjectOwned> {
        let job = self.scheduler.add_job(params).await.map_err(to_rpc_error)?;
        info!(job_id = job.id, name = %job.name, "Job saved via RPC");
        Ok(self.describe(job).await)
    }

    /// jobs.update.v1
    pub async fn update_job(&self, params: JobRequest) -> Result<JobResponse, ErrorObjectOwned> {
        let job = self
            .scheduler
            .update_job(params)
            .await
            .map_err(to_rpc_error)?;
        Ok(self.describe(job).await)
    }

    /// jobs.get.v1
    pub async fn get_job(&self, params: JobIdRequest) -> Result<JobResponse, ErrorObjectOwned> {
        let job = self
            .scheduler
            .get_job(params.id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| to_rpc_error(AppError::NotFound(format!("Job {} not found", params.id))))?;
        Ok(self.describe(job).await)
    }

    /// jobs.list.v1
    pub async fn list_jobs(
        &self,
        _params: ListJobsRequest,
    ) -> Result<ListJobsResponse, ErrorObjectOwned> {
        let live = self.live_ids().await;
        let jobs = self
            .scheduler
            .list_jobs()
            .await
            .map_err(to_rpc_error)?
            .into_iter()
            .map(|job| JobResponse {
                scheduled: live.contains(&job.id),
                job,
            })
            .collect();
        Ok(ListJobsResponse { jobs })
    }

    /// jobs.delete.v1
    pub async fn delete_job(
        &self,
        params: JobIdRequest,
    ) -> Result<DeleteJobResponse, ErrorObjectOwned> {
        let deleted = self
            .scheduler
            .remove_job(params.id)
            .await
            .map_err(to_rpc_error)?;
        Ok(DeleteJobResponse {
            id: params.id,
            deleted,
        })
    }

    /// jobs.run.v1
    pub async fn run_job(&self, params: JobIdRequest) -> Result<RunJobResponse, ErrorObjectOwned> {
        let outcome = self
            .scheduler
            .run_job_now(params.id)
            .await
            .map_err(to_rpc_error)?;
        let outcome = match outcome {
            FireOutcome::Executed => "executed",
            FireOutcome::Skipped => "skipped",
            FireOutcome::Deleted => "deleted",
        };
        Ok(RunJobResponse {
            id: params.id,
            outcome: outcome.to_string(),
        })
    }

    /// notifications.sweep.v1
    pub async fn sweep(&self, _params: SweepRequest) -> Result<SweepResponse, ErrorObjectOwned> {
        let redriven = self.reconciler.sweep().await.map_err(to_rpc_error)?;
        Ok(SweepResponse { redriven })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let count = |status| async move {
            self.notification_store
                .count_by_status(status)
                .await
                .map_err(to_rpc_error)
        };

        let jobs = self.scheduler.list_jobs().await.map_err(to_rpc_error)?;

        Ok(StatsResponse {
            pending: count(NotificationStatus::Pending).await?,
            in_flight: count(NotificationStatus::InFlight).await?,
            sent: count(NotificationStatus::Sent).await?,
            failed: count(NotificationStatus::Failed).await?,
            abandoned: count(NotificationStatus::Abandoned).await?,
            scheduled_jobs: jobs.len(),
            live_handles: self.scheduler.live_handles().await.len(),
            scheduler_running: self.scheduler.is_running(),
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }
}
