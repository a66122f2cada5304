// Job actions: closed table of job bodies keyed by job name

use crate::application::reconciler::RetryReconciler;
use crate::domain::ScheduledJob;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Body executed when a job fires
#[async_trait]
pub trait JobAction: Send + Sync {
    async fn run(&self, job: &ScheduledJob) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct JobActionTable {
    actions: HashMap<String, Arc<dyn JobAction>>,
}

impl JobActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, action: Arc<dyn JobAction>) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobAction>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }
}

/// `retry_pending_notifications`: one reconciliation sweep per fire
pub struct RetrySweepAction {
    reconciler: Arc<RetryReconciler>,
}

impl RetrySweepAction {
    pub fn new(reconciler: Arc<RetryReconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl JobAction for RetrySweepAction {
    async fn run(&self, _job: &ScheduledJob) -> Result<()> {
        self.reconciler.sweep().await.map(|_| ())
    }
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    pub enum ActionBehavior {
        Success,
        Fail(String),
        Panic(String),
    }

    /// Counts invocations and plays a fixed behavior
    pub struct RecordingAction {
        behavior: ActionBehavior,
        runs: AtomicUsize,
    }

    impl RecordingAction {
        pub fn new(behavior: ActionBehavior) -> Self {
            Self {
                behavior,
                runs: AtomicUsize::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(ActionBehavior::Success)
        }

        pub fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobAction for RecordingAction {
        async fn run(&self, _job: &ScheduledJob) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                ActionBehavior::Success => Ok(()),
                ActionBehavior::Fail(msg) => Err(AppError::Internal(msg.clone())),
                ActionBehavior::Panic(msg) => panic!("{}", msg),
            }
        }
    }
}
