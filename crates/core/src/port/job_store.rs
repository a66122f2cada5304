// Job Store Port (Interface)

use crate::domain::{JobId, ScheduledJob};
use crate::error::Result;
use async_trait::async_trait;

/// Durable registry of scheduled-job definitions
#[async_trait]
pub trait JobStore: Send + Sync {
    /// All definitions, ordered by id
    async fn list(&self) -> Result<Vec<ScheduledJob>>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<ScheduledJob>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<ScheduledJob>>;

    /// Upsert by id. `id == 0` inserts and assigns a fresh id.
    ///
    /// Returns the stored row (with its assigned id).
    async fn save(&self, job: &ScheduledJob) -> Result<ScheduledJob>;

    /// Returns `false` if no row had that id
    async fn delete(&self, id: JobId) -> Result<bool>;

    /// Stamp `last_executed_at`. Returns `false` if the job no longer exists.
    async fn mark_executed(&self, id: JobId, executed_at: i64) -> Result<bool>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, MutexGuard};
    use std::time::Duration;

    #[derive(Default)]
    pub struct InMemoryJobStore {
        jobs: Mutex<BTreeMap<JobId, ScheduledJob>>,
        fail_mark_executed: AtomicBool,
        slow_save: Mutex<Option<(String, Duration)>>,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_mark_executed(&self, fail: bool) {
            self.fail_mark_executed.store(fail, Ordering::SeqCst);
        }

        /// Saves of a definition with this schedule return only after `delay`
        pub fn delay_save_of(&self, schedule: &str, delay: Duration) {
            *self.slow_save.lock().unwrap_or_else(|e| e.into_inner()) =
                Some((schedule.to_string(), delay));
        }

        pub fn get(&self, id: JobId) -> Option<ScheduledJob> {
            self.lock().get(&id).cloned()
        }

        fn lock(&self) -> MutexGuard<'_, BTreeMap<JobId, ScheduledJob>> {
            self.jobs.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn list(&self) -> Result<Vec<ScheduledJob>> {
            Ok(self.lock().values().cloned().collect())
        }

        async fn find_by_id(&self, id: JobId) -> Result<Option<ScheduledJob>> {
            Ok(self.get(id))
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<ScheduledJob>> {
            Ok(self.lock().values().find(|j| j.name == name).cloned())
        }

        async fn save(&self, job: &ScheduledJob) -> Result<ScheduledJob> {
            let stored = {
                let mut jobs = self.lock();
                let mut stored = job.clone();
                if stored.id == 0 {
                    stored.id = jobs.keys().next_back().copied().unwrap_or(0) + 1;
                }
                jobs.insert(stored.id, stored.clone());
                stored
            };

            let delay = self
                .slow_save
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
                .filter(|(schedule, _)| *schedule == job.schedule)
                .map(|(_, delay)| *delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(stored)
        }

        async fn delete(&self, id: JobId) -> Result<bool> {
            Ok(self.lock().remove(&id).is_some())
        }

        async fn mark_executed(&self, id: JobId, executed_at: i64) -> Result<bool> {
            if self.fail_mark_executed.load(Ordering::SeqCst) {
                return Err(AppError::Database("injected mark_executed failure".to_string()));
            }
            match self.lock().get_mut(&id) {
                Some(job) => {
                    job.last_executed_at = Some(executed_at);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }
}
