// Engine constants (no magic values)
use std::time::Duration;

/// Retry cutoff: records reaching this retry_count are abandoned
pub const DEFAULT_MAX_RETRIES: i32 = 5;

/// Backoff base delay (30s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 30_000;

pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Age after which pending/in_flight records are considered orphaned (5 minutes)
pub const DEFAULT_GRACE_PERIOD_MS: i64 = 5 * 60 * 1000;

/// Upper bound on a single channel send; must stay below the grace period
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Records examined per sweep
pub const DEFAULT_SWEEP_BATCH_SIZE: i64 = 100;

/// Interval of the standalone sweep loop
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Bounded command queue between router and worker
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 1024;

pub const DEFAULT_MAX_CONCURRENT_DELIVERIES: usize = 32;

/// Sleep after a failed bus subscription before retrying (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Bootstrap job driving the reconciliation sweep
pub const RETRY_SWEEP_JOB_NAME: &str = "retry_pending_notifications";

/// Every 2 minutes, on the minute
pub const RETRY_SWEEP_JOB_SCHEDULE: &str = "0 */2 * * * *";

/// Bounded wait for in-flight deliveries after shutdown (10s)
pub const DEFAULT_WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
