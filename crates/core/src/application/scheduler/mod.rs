// Job Scheduler
// Loads job definitions and keeps one live firing handle per active job

pub mod actions;

pub use actions::{JobAction, JobActionTable, RetrySweepAction};

use crate::domain::{CronSchedule, JobDefinition, JobId, ScheduledJob};
use crate::error::{AppError, Result};
use crate::port::{JobStore, TimeProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// What a single fire did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Body was started (or the name had no registered action)
    Executed,
    /// Definition is inactive; nothing ran
    Skipped,
    /// Definition no longer exists
    Deleted,
}

/// Live registration of one job
struct FiringHandle {
    schedule: String,
    generation: u64,
    cancel: watch::Sender<bool>,
}

impl FiringHandle {
    fn retire(self) {
        let _ = self.cancel.send(true);
    }
}

struct SchedulerInner {
    store: Arc<dyn JobStore>,
    actions: JobActionTable,
    time_provider: Arc<dyn TimeProvider>,
    /// Held across store writes and the registry update that follows them
    ops: Mutex<()>,
    registry: Mutex<HashMap<JobId, FiringHandle>>,
    running: AtomicBool,
    next_generation: AtomicU64,
}

/// Owned scheduler with an explicit start/stop lifecycle.
///
/// Definition changes (save then install/retire) are serialized by `ops`, so the
/// last write to the store is also the handle left installed. Firing loops take
/// only the registry lock, and only to retire themselves.
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
    bootstrap: Vec<JobDefinition>,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        actions: JobActionTable,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                actions,
                time_provider,
                ops: Mutex::new(()),
                registry: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                next_generation: AtomicU64::new(1),
            }),
            bootstrap: Vec::new(),
        }
    }

    /// Default jobs created on `start` when no job with the same name exists
    pub fn with_bootstrap(mut self, jobs: Vec<JobDefinition>) -> Self {
        self.bootstrap = jobs;
        self
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Bootstrap defaults, load every definition and install active ones.
    ///
    /// # Returns
    /// Number of handles installed
    pub async fn start(&self) -> Result<usize> {
        let _ops = self.inner.ops.lock().await;
        let now = self.inner.time_provider.now_millis();
        for def in &self.bootstrap {
            if self.inner.store.find_by_name(&def.name).await?.is_none() {
                let job = self.inner.store.save(&def.clone().into_job(now)).await?;
                info!(job_id = job.id, job_name = %job.name, schedule = %job.schedule, "Bootstrapped default job");
            }
        }

        self.inner.running.store(true, Ordering::SeqCst);

        let mut installed = 0;
        for job in self.inner.store.list().await? {
            if job.is_active && self.inner.install(&job).await {
                installed += 1;
            }
        }

        info!(installed = installed, "Job scheduler started");
        Ok(installed)
    }

    /// Signal every handle to stop firing. Bodies already running are not cancelled.
    pub async fn stop(&self) {
        let _ops = self.inner.ops.lock().await;
        self.inner.running.store(false, Ordering::SeqCst);
        let mut registry = self.inner.registry.lock().await;
        let count = registry.len();
        for (_, handle) in registry.drain() {
            handle.retire();
        }
        info!(retired = count, "Job scheduler stopped");
    }

    /// Persist a definition (upsert by id) and (re)install its handle.
    ///
    /// An invalid schedule is persisted but not installed; the error is logged.
    pub async fn add_job(&self, def: JobDefinition) -> Result<ScheduledJob> {
        def.validate()?;
        let _ops = self.inner.ops.lock().await;
        self.save_and_install(def).await
    }

    /// Same as `add_job` for an existing id
    pub async fn update_job(&self, def: JobDefinition) -> Result<ScheduledJob> {
        let id = def
            .id
            .ok_or_else(|| AppError::Validation("update requires a job id".to_string()))?;
        def.validate()?;
        let _ops = self.inner.ops.lock().await;
        if self.inner.store.find_by_id(id).await?.is_none() {
            return Err(AppError::NotFound(format!("job {}", id)));
        }
        self.save_and_install(def).await
    }

    /// Delete the definition and retire its handle
    pub async fn remove_job(&self, id: JobId) -> Result<bool> {
        let _ops = self.inner.ops.lock().await;
        let deleted = self.inner.store.delete(id).await?;
        self.inner.retire(id).await;
        info!(job_id = id, deleted = deleted, "Job removed");
        Ok(deleted)
    }

    /// Caller holds `ops`
    async fn save_and_install(&self, def: JobDefinition) -> Result<ScheduledJob> {
        let now = self.inner.time_provider.now_millis();

        let existing = match def.id {
            Some(id) => self.inner.store.find_by_id(id).await?,
            None => None,
        };
        let job = match existing {
            Some(mut job) => {
                job.apply(&def, now);
                job
            }
            None => def.into_job(now),
        };
        let saved = self.inner.store.save(&job).await?;

        info!(
            job_id = saved.id,
            job_name = %saved.name,
            schedule = %saved.schedule,
            is_active = saved.is_active,
            "Job definition saved"
        );

        if self.is_running() {
            if saved.is_active {
                self.inner.install(&saved).await;
            } else {
                self.inner.retire(saved.id).await;
            }
        }
        Ok(saved)
    }

    pub async fn list_jobs(&self) -> Result<Vec<ScheduledJob>> {
        self.inner.store.list().await
    }

    pub async fn get_job(&self, id: JobId) -> Result<Option<ScheduledJob>> {
        self.inner.store.find_by_id(id).await
    }

    /// Fire a job immediately (missed-run detection skipped)
    pub async fn run_job_now(&self, id: JobId) -> Result<FireOutcome> {
        let fire_at = self.inner.time_provider.now_millis();
        match self.inner.fire(id, fire_at, false).await? {
            FireOutcome::Deleted => Err(AppError::NotFound(format!("job {}", id))),
            outcome => Ok(outcome),
        }
    }

    /// (id, schedule) of every installed handle, ordered by id
    pub async fn live_handles(&self) -> Vec<(JobId, String)> {
        let registry = self.inner.registry.lock().await;
        let mut handles: Vec<(JobId, String)> = registry
            .iter()
            .map(|(id, handle)| (*id, handle.schedule.clone()))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles
    }
}

impl SchedulerInner {
    /// Install a handle for `job`, atomically retiring any previous one.
    /// Returns `false` if the schedule does not parse.
    async fn install(self: &Arc<Self>, job: &ScheduledJob) -> bool {
        let schedule = match CronSchedule::parse(&job.schedule) {
            Ok(schedule) => schedule,
            Err(e) => {
                let err = AppError::from(e);
                error!(job_id = job.id, job_name = %job.name, error = %err, "Job not scheduled");
                self.retire(job.id).await;
                return false;
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let (cancel, cancelled) = watch::channel(false);

        let mut registry = self.registry.lock().await;
        tokio::spawn(Arc::clone(self).firing_loop(job.id, schedule, generation, cancelled));
        let previous = registry.insert(
            job.id,
            FiringHandle {
                schedule: job.schedule.clone(),
                generation,
                cancel,
            },
        );
        if let Some(previous) = previous {
            debug!(
                job_id = job.id,
                old_schedule = %previous.schedule,
                new_schedule = %job.schedule,
                "Replacing firing handle"
            );
            previous.retire();
        }

        info!(job_id = job.id, job_name = %job.name, schedule = %job.schedule, "Job scheduled");
        true
    }

    async fn retire(&self, id: JobId) {
        if let Some(handle) = self.registry.lock().await.remove(&id) {
            handle.retire();
            debug!(job_id = id, "Firing handle retired");
        }
    }

    /// Remove the handle only if it still belongs to `generation`
    async fn retire_generation(&self, id: JobId, generation: u64) {
        let mut registry = self.registry.lock().await;
        if registry.get(&id).map(|h| h.generation) == Some(generation) {
            if let Some(handle) = registry.remove(&id) {
                handle.retire();
            }
        }
    }

    async fn firing_loop(
        self: Arc<Self>,
        id: JobId,
        schedule: CronSchedule,
        generation: u64,
        mut cancelled: watch::Receiver<bool>,
    ) {
        loop {
            let now = self.time_provider.now_millis();
            let Some(fire_at) = schedule.next_after(now) else {
                warn!(job_id = id, schedule = %schedule.expression(), "Schedule has no upcoming fire time");
                self.retire_generation(id, generation).await;
                return;
            };

            let wait = Duration::from_millis((fire_at - now).max(0) as u64);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancelled.changed() => return,
            }
            if *cancelled.borrow() {
                return;
            }

            match self.fire(id, fire_at, true).await {
                Ok(FireOutcome::Deleted) => {
                    info!(job_id = id, "Job deleted from store, retiring handle");
                    self.retire_generation(id, generation).await;
                    return;
                }
                Ok(_) => {}
                Err(e) => error!(job_id = id, error = %e, "Job fire failed"),
            }
        }
    }

    /// Fire path shared by the firing loop and `run_job_now`
    async fn fire(&self, id: JobId, fire_at: i64, detect_missed: bool) -> Result<FireOutcome> {
        let Some(job) = self.store.find_by_id(id).await? else {
            return Ok(FireOutcome::Deleted);
        };
        if !job.is_active {
            debug!(job_id = id, job_name = %job.name, "Job inactive, skipping fire");
            return Ok(FireOutcome::Skipped);
        }

        if detect_missed {
            if let Ok(schedule) = CronSchedule::parse(&job.schedule) {
                if let Some(missed) = schedule.missed_runs(job.last_executed_at, fire_at) {
                    warn!(
                        job_id = id,
                        job_name = %job.name,
                        missed_runs = missed.count,
                        expected_at = missed.expected_at,
                        "Missed scheduled runs detected, not catching up"
                    );
                }
            }
        }

        // Recorded before the body so its outcome never affects scheduling
        if !self.store.mark_executed(id, fire_at).await? {
            return Ok(FireOutcome::Deleted);
        }

        let Some(action) = self.actions.get(&job.name) else {
            warn!(job_id = id, job_name = %job.name, "Unknown job, nothing to run");
            return Ok(FireOutcome::Executed);
        };

        info!(job_id = id, job_name = %job.name, "Running job");
        let body_job = job.clone();
        let body = tokio::spawn(async move { action.run(&body_job).await });
        match body.await {
            Ok(Ok(())) => info!(job_id = id, job_name = %job.name, "Job completed"),
            Ok(Err(e)) => error!(job_id = id, job_name = %job.name, error = %e, "Job failed"),
            Err(join_err) => {
                if join_err.is_panic() {
                    error!(job_id = id, job_name = %job.name, "Job panicked: {:?}", join_err);
                } else {
                    error!(job_id = id, job_name = %job.name, "Job cancelled: {:?}", join_err);
                }
            }
        }
        Ok(FireOutcome::Executed)
    }
}

#[cfg(test)]
mod tests {
    use super::actions::mocks::{ActionBehavior, RecordingAction};
    use super::*;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::SystemTimeProvider;

    const EVERY_SECOND: &str = "* * * * * *";
    const YEARLY: &str = "0 0 0 1 1 *";

    fn scheduler(store: Arc<InMemoryJobStore>, action: Arc<RecordingAction>) -> JobScheduler {
        let actions = JobActionTable::new().register("cleanup", action);
        JobScheduler::new(store, actions, Arc::new(SystemTimeProvider))
    }

    #[tokio::test]
    async fn test_add_twice_keeps_one_handle_with_second_schedule() {
        let store = Arc::new(InMemoryJobStore::new());
        let sched = scheduler(store.clone(), Arc::new(RecordingAction::new_success()));
        sched.start().await.unwrap();

        sched
            .add_job(JobDefinition::new("cleanup", "*/5 * * * *").with_id(1))
            .await
            .unwrap();
        sched
            .add_job(JobDefinition::new("cleanup", "0 * * * *").with_id(1))
            .await
            .unwrap();

        assert_eq!(
            sched.live_handles().await,
            vec![(1, "0 * * * *".to_string())]
        );
        assert_eq!(store.get(1).unwrap().schedule, "0 * * * *");
        sched.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_adds_install_last_saved_schedule() {
        let store = Arc::new(InMemoryJobStore::new());
        store.delay_save_of("*/5 * * * *", Duration::from_millis(200));
        let sched = Arc::new(scheduler(
            store.clone(),
            Arc::new(RecordingAction::new_success()),
        ));
        sched.start().await.unwrap();

        let first = {
            let sched = sched.clone();
            tokio::spawn(async move {
                sched
                    .add_job(JobDefinition::new("cleanup", "*/5 * * * *").with_id(1))
                    .await
            })
        };
        // Second add lands while the first is between save and install
        tokio::time::sleep(Duration::from_millis(50)).await;
        sched
            .add_job(JobDefinition::new("cleanup", "0 * * * *").with_id(1))
            .await
            .unwrap();
        first.await.unwrap().unwrap();

        let stored = store.get(1).unwrap().schedule;
        assert_eq!(stored, "0 * * * *");
        assert_eq!(sched.live_handles().await, vec![(1, stored)]);
        sched.stop().await;
    }

    #[tokio::test]
    async fn test_fires_on_schedule() {
        let store = Arc::new(InMemoryJobStore::new());
        let action = Arc::new(RecordingAction::new_success());
        let sched = scheduler(store.clone(), action.clone());
        sched.start().await.unwrap();
        sched
            .add_job(JobDefinition::new("cleanup", EVERY_SECOND))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(3), async {
            while action.runs() == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("job should fire");
        assert!(store.get(1).unwrap().last_executed_at.is_some());
        sched.stop().await;
    }

    #[tokio::test]
    async fn test_replaced_handle_stops_firing() {
        let store = Arc::new(InMemoryJobStore::new());
        let action = Arc::new(RecordingAction::new_success());
        let sched = scheduler(store.clone(), action.clone());
        sched.start().await.unwrap();
        sched
            .add_job(JobDefinition::new("cleanup", EVERY_SECOND).with_id(1))
            .await
            .unwrap();
        sched
            .add_job(JobDefinition::new("cleanup", YEARLY).with_id(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let settled = action.runs();
        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert_eq!(action.runs(), settled);
        sched.stop().await;
    }

    #[tokio::test]
    async fn test_last_executed_recorded_even_when_body_fails() {
        for behavior in [
            ActionBehavior::Fail("boom".into()),
            ActionBehavior::Panic("kaboom".into()),
        ] {
            let store = Arc::new(InMemoryJobStore::new());
            let sched = scheduler(store.clone(), Arc::new(RecordingAction::new(behavior)));
            let job = sched
                .add_job(JobDefinition::new("cleanup", YEARLY))
                .await
                .unwrap();

            let outcome = sched.run_job_now(job.id).await.unwrap();
            assert_eq!(outcome, FireOutcome::Executed);
            assert!(store.get(job.id).unwrap().last_executed_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_unknown_job_name_is_noop() {
        let store = Arc::new(InMemoryJobStore::new());
        let action = Arc::new(RecordingAction::new_success());
        let sched = scheduler(store.clone(), action.clone());
        let job = sched
            .add_job(JobDefinition::new("mystery", YEARLY))
            .await
            .unwrap();

        assert_eq!(
            sched.run_job_now(job.id).await.unwrap(),
            FireOutcome::Executed
        );
        assert_eq!(action.runs(), 0);
        assert!(store.get(job.id).unwrap().last_executed_at.is_some());
    }

    #[tokio::test]
    async fn test_inactive_job_not_installed_and_skipped() {
        let store = Arc::new(InMemoryJobStore::new());
        let action = Arc::new(RecordingAction::new_success());
        let sched = scheduler(store.clone(), action.clone());
        sched.start().await.unwrap();
        let job = sched
            .add_job(JobDefinition::new("cleanup", YEARLY).inactive())
            .await
            .unwrap();

        assert!(sched.live_handles().await.is_empty());
        assert_eq!(
            sched.run_job_now(job.id).await.unwrap(),
            FireOutcome::Skipped
        );
        assert_eq!(action.runs(), 0);
    }

    #[tokio::test]
    async fn test_invalid_schedule_saved_but_not_installed() {
        let store = Arc::new(InMemoryJobStore::new());
        let sched = scheduler(store.clone(), Arc::new(RecordingAction::new_success()));
        sched.start().await.unwrap();
        sched
            .add_job(JobDefinition::new("cleanup", YEARLY).with_id(3))
            .await
            .unwrap();
        sched
            .add_job(JobDefinition::new("cleanup", "every tuesday").with_id(3))
            .await
            .unwrap();

        assert!(sched.live_handles().await.is_empty());
        assert_eq!(store.get(3).unwrap().schedule, "every tuesday");
    }

    #[tokio::test]
    async fn test_remove_and_deleted_in_store() {
        let store = Arc::new(InMemoryJobStore::new());
        let sched = scheduler(store.clone(), Arc::new(RecordingAction::new_success()));
        sched.start().await.unwrap();
        let job = sched
            .add_job(JobDefinition::new("cleanup", YEARLY))
            .await
            .unwrap();

        assert!(sched.remove_job(job.id).await.unwrap());
        assert!(sched.live_handles().await.is_empty());
        assert!(matches!(
            sched.run_job_now(job.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_job_self_retires() {
        let store = Arc::new(InMemoryJobStore::new());
        let action = Arc::new(RecordingAction::new_success());
        let sched = scheduler(store.clone(), action.clone());
        sched.start().await.unwrap();
        let job = sched
            .add_job(JobDefinition::new("cleanup", EVERY_SECOND))
            .await
            .unwrap();

        // Deleted behind the scheduler's back; the next fire observes it
        store.delete(job.id).await.unwrap();
        tokio::time::timeout(Duration::from_secs(3), async {
            while !sched.live_handles().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("handle should retire itself");
        assert_eq!(action.runs(), 0);
    }

    #[tokio::test]
    async fn test_start_bootstraps_missing_defaults_once() {
        let store = Arc::new(InMemoryJobStore::new());
        let sched = scheduler(store.clone(), Arc::new(RecordingAction::new_success()))
            .with_bootstrap(vec![JobDefinition::new("cleanup", YEARLY)]);

        assert_eq!(sched.start().await.unwrap(), 1);
        sched.stop().await;
        assert!(!sched.is_running());
        assert!(sched.live_handles().await.is_empty());

        assert_eq!(sched.start().await.unwrap(), 1);
        assert_eq!(sched.list_jobs().await.unwrap().len(), 1);
        sched.stop().await;
    }

    #[tokio::test]
    async fn test_update_requires_existing_id() {
        let store = Arc::new(InMemoryJobStore::new());
        let sched = scheduler(store, Arc::new(RecordingAction::new_success()));
        assert!(matches!(
            sched
                .update_job(JobDefinition::new("cleanup", YEARLY).with_id(99))
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            sched.update_job(JobDefinition::new("cleanup", YEARLY)).await,
            Err(AppError::Validation(_))
        ));
    }
}
