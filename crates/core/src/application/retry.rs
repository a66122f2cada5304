// Retry policy: exponential backoff with a hard retry cutoff
use crate::application::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS,
};
use crate::domain::{NotificationRecord, NotificationStatus};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry once the backoff delay (ms, from the last attempt) has elapsed
    Retry(i64),
    /// retry_count reached max_retries; the record is to be abandoned
    Exhausted,
}

/// Determines whether and when a failed notification is re-driven:
/// - attempts stop once `retry_count >= max_retries`
/// - `delay = base_delay * backoff_factor ^ retry_count`, ±10% jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub base_delay_ms: i64,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: i32, base_delay_ms: i64, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            backoff_factor,
        }
    }

    pub fn should_retry(&self, record: &NotificationRecord) -> RetryDecision {
        if record.retries_exhausted(self.max_retries) {
            warn!(
                notification_id = %record.id,
                retry_count = record.retry_count,
                max_retries = self.max_retries,
                "Max retry attempts reached"
            );
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry(self.backoff_delay_ms(&record.id, record.retry_count))
    }

    /// Backoff before attempt `retry_count + 1`
    pub fn backoff_delay_ms(&self, id: &str, retry_count: i32) -> i64 {
        let base = self.base_delay_ms as f64 * self.backoff_factor.powi(retry_count);

        // Deterministic per-record jitter spreads retries of a burst
        let jitter_seed = id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        (base * jitter_factor) as i64
    }

    /// Failed records wait out their backoff; other candidates are due immediately
    pub fn is_due(&self, record: &NotificationRecord, now_millis: i64) -> bool {
        if record.status != NotificationStatus::Failed {
            return true;
        }
        match self.should_retry(record) {
            RetryDecision::Retry(delay_ms) => {
                let last_attempt = record.last_attempt_at.unwrap_or(record.created_at);
                now_millis >= last_attempt + delay_ms
            }
            RetryDecision::Exhausted => false,
        }
    }
}
