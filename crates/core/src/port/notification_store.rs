// Notification Store Port (Interface)

use crate::domain::{NotificationRecord, NotificationStatus};
use crate::error::Result;
use async_trait::async_trait;

/// `last_error` given to an exhausted record whose final attempt never reported back
pub const INTERRUPTED_ERROR: &str = "final delivery attempt interrupted";

/// Persistence interface for notification delivery records
///
/// Rows are never deleted through this port. Concurrent writes to distinct
/// rows must be tolerated.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a new record
    async fn save(&self, record: &NotificationRecord) -> Result<()>;

    /// Overwrite the mutable delivery fields of an existing record
    async fn update(&self, record: &NotificationRecord) -> Result<()>;

    /// Find record by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<NotificationRecord>>;

    /// Records the reconciler may re-drive, oldest first:
    /// - `pending` created at or before `cutoff`
    /// - `failed` (backoff is checked by the caller)
    /// - `in_flight` whose `last_attempt_at` is at or before `cutoff`
    ///
    /// all with `retry_count < max_retries`.
    async fn find_redelivery_candidates(
        &self,
        cutoff: i64,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>>;

    /// Optimistic claim: moves the record to `in_flight`, bumps `retry_count`
    /// and stamps `last_attempt_at` only if status and retry count still match.
    ///
    /// Returns `true` for the single winning claimer.
    async fn try_claim(
        &self,
        id: &str,
        expected_status: NotificationStatus,
        expected_retry_count: i32,
        now_millis: i64,
    ) -> Result<bool>;

    /// Move records with `retry_count >= max_retries` to `abandoned`: every
    /// `failed` one, and `in_flight` ones whose last attempt is at or before
    /// `stale_cutoff` (their final re-drive never finished)
    async fn abandon_exhausted(&self, max_retries: i32, stale_cutoff: i64) -> Result<u64>;

    /// Count records by status
    async fn count_by_status(&self, status: NotificationStatus) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard};

    /// HashMap-backed store with failure injection
    #[derive(Default)]
    pub struct InMemoryNotificationStore {
        records: Mutex<HashMap<String, NotificationRecord>>,
        fail_saves: AtomicBool,
        fail_updates: AtomicBool,
        claim_calls: AtomicUsize,
    }

    impl InMemoryNotificationStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_saves(&self, fail: bool) {
            self.fail_saves.store(fail, Ordering::SeqCst);
        }

        pub fn fail_updates(&self, fail: bool) {
            self.fail_updates.store(fail, Ordering::SeqCst);
        }

        /// Insert bypassing failure injection (test setup)
        pub fn seed(&self, record: NotificationRecord) {
            self.lock().insert(record.id.clone(), record);
        }

        pub fn get(&self, id: &str) -> Option<NotificationRecord> {
            self.lock().get(id).cloned()
        }

        pub fn all(&self) -> Vec<NotificationRecord> {
            self.lock().values().cloned().collect()
        }

        pub fn len(&self) -> usize {
            self.lock().len()
        }

        pub fn is_empty(&self) -> bool {
            self.lock().is_empty()
        }

        pub fn claim_calls(&self) -> usize {
            self.claim_calls.load(Ordering::SeqCst)
        }

        fn lock(&self) -> MutexGuard<'_, HashMap<String, NotificationRecord>> {
            self.records.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    #[async_trait]
    impl NotificationStore for InMemoryNotificationStore {
        async fn save(&self, record: &NotificationRecord) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(AppError::Database("injected save failure".to_string()));
            }
            let mut records = self.lock();
            if records.contains_key(&record.id) {
                return Err(AppError::Database(format!(
                    "duplicate notification id: {}",
                    record.id
                )));
            }
            records.insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn update(&self, record: &NotificationRecord) -> Result<()> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(AppError::Database("injected update failure".to_string()));
            }
            let mut records = self.lock();
            match records.get_mut(&record.id) {
                Some(existing) => {
                    *existing = record.clone();
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("notification {}", record.id))),
            }
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<NotificationRecord>> {
            Ok(self.get(id))
        }

        async fn find_redelivery_candidates(
            &self,
            cutoff: i64,
            max_retries: i32,
            limit: i64,
        ) -> Result<Vec<NotificationRecord>> {
            let mut candidates: Vec<NotificationRecord> = self
                .lock()
                .values()
                .filter(|r| r.retry_count < max_retries)
                .filter(|r| match r.status {
                    NotificationStatus::Pending => r.created_at <= cutoff,
                    NotificationStatus::Failed => true,
                    NotificationStatus::InFlight => {
                        r.last_attempt_at.unwrap_or(r.created_at) <= cutoff
                    }
                    _ => false,
                })
                .cloned()
                .collect();
            candidates.sort_by_key(|r| r.created_at);
            candidates.truncate(limit.max(0) as usize);
            Ok(candidates)
        }

        async fn try_claim(
            &self,
            id: &str,
            expected_status: NotificationStatus,
            expected_retry_count: i32,
            now_millis: i64,
        ) -> Result<bool> {
            self.claim_calls.fetch_add(1, Ordering::SeqCst);
            let mut records = self.lock();
            match records.get_mut(id) {
                Some(r) if r.status == expected_status && r.retry_count == expected_retry_count => {
                    r.claim(now_millis);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn abandon_exhausted(&self, max_retries: i32, stale_cutoff: i64) -> Result<u64> {
            let mut count = 0;
            for r in self.lock().values_mut() {
                if r.retry_count < max_retries {
                    continue;
                }
                let stale = r.last_attempt_at.unwrap_or(r.created_at) <= stale_cutoff;
                match r.status {
                    NotificationStatus::Failed => {}
                    NotificationStatus::InFlight if stale => {
                        r.last_error.get_or_insert_with(|| INTERRUPTED_ERROR.to_string());
                    }
                    _ => continue,
                }
                r.status = NotificationStatus::Abandoned;
                count += 1;
            }
            Ok(count)
        }

        async fn count_by_status(&self, status: NotificationStatus) -> Result<i64> {
            Ok(self.lock().values().filter(|r| r.status == status).count() as i64)
        }
    }
}
