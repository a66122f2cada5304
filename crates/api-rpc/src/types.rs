//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use herald_core::domain::{JobDefinition, JobId, ScheduledJob};
use serde::{Deserialize, Serialize};

/// jobs.add.v1 / jobs.update.v1 - the body is a job definition
pub type JobRequest = JobDefinition;

/// jobs.get.v1, jobs.delete.v1, jobs.run.v1
#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub job: ScheduledJob,
    /// Whether a firing handle is live for this id after the call
    pub scheduled: bool,
}

/// jobs.list.v1
#[derive(Debug, Deserialize)]
pub struct ListJobsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteJobResponse {
    pub id: JobId,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobResponse {
    pub id: JobId,
    /// executed, skipped or deleted
    pub outcome: String,
}

/// notifications.sweep.v1 - run one retry sweep now
#[derive(Debug, Deserialize)]
pub struct SweepRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub redriven: usize,
}

/// admin.stats.v1 - Get system statistics
#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub pending: i64,
    pub in_flight: i64,
    pub sent: i64,
    pub failed: i64,
    pub abandoned: i64,
    pub scheduled_jobs: usize,
    pub live_handles: usize,
    pub scheduler_running: bool,
    pub uptime_seconds: i64,
}
