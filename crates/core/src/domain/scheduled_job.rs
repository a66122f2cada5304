// Scheduled Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Job identity (store-assigned, stable across reschedules)
pub type JobId = i64;

/// Persisted definition of a recurring maintenance job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub name: String,
    pub schedule: String,
    pub is_active: bool,
    pub description: String,
    pub last_executed_at: Option<i64>, // epoch ms
    pub created_at: i64,
    pub updated_at: i64,
}

impl ScheduledJob {
    /// Apply an add/update request on top of the stored row
    pub fn apply(&mut self, def: &JobDefinition, now_millis: i64) {
        self.name = def.name.clone();
        self.schedule = def.schedule.clone();
        self.is_active = def.is_active;
        self.description = def.description.clone();
        self.updated_at = now_millis;
    }
}

/// Input of add/update operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    #[serde(default)]
    pub id: Option<JobId>,
    pub name: String,
    pub schedule: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub description: String,
}

fn default_active() -> bool {
    true
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            schedule: schedule.into(),
            is_active: true,
            description: String::new(),
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Name must be non-empty; the schedule is checked separately at install time
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "job name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Materialize a brand new row (id 0 until the store assigns one)
    pub fn into_job(self, now_millis: i64) -> ScheduledJob {
        ScheduledJob {
            id: self.id.unwrap_or(0),
            name: self.name,
            schedule: self.schedule,
            is_active: self.is_active,
            description: self.description,
            last_executed_at: None,
            created_at: now_millis,
            updated_at: now_millis,
        }
    }
}
