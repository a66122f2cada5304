//! Daemon configuration
//!
//! Layered with the `config` crate: optional file named by `HERALD_CONFIG`,
//! then `HERALD__SECTION__KEY` environment variables.

use anyhow::{bail, Context, Result};
use herald_api_rpc::RpcServerConfig;
use herald_core::application::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_COMMAND_QUEUE_CAPACITY, DEFAULT_DELIVERY_TIMEOUT,
    DEFAULT_GRACE_PERIOD_MS, DEFAULT_MAX_CONCURRENT_DELIVERIES, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_SWEEP_BATCH_SIZE, DEFAULT_SWEEP_INTERVAL,
    RETRY_SWEEP_JOB_SCHEDULE,
};
use herald_core::application::{RetryPolicy, SubjectMap};
use herald_core::domain::EventKind;
use herald_infra_delivery::{FcmConfig, SmtpConfig};
use herald_infra_nats::NatsConfig;
use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "HERALD";
const ENV_SEPARATOR: &str = "__";
const CONFIG_FILE_ENV: &str = "HERALD_CONFIG";
const DEFAULT_DATABASE_URL: &str = "sqlite://herald.db";

#[derive(Debug, Clone, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub subjects: SubjectsConfig,
    pub push: FcmConfig,
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rpc: RpcServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

/// Bus subject per event kind
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubjectsConfig {
    pub authentication: String,
    pub asset: String,
    pub password_reset: String,
}

impl Default for SubjectsConfig {
    fn default() -> Self {
        Self {
            authentication: EventKind::Authentication.default_subject().to_string(),
            asset: EventKind::Asset.default_subject().to_string(),
            password_reset: EventKind::PasswordReset.default_subject().to_string(),
        }
    }
}

impl SubjectsConfig {
    fn entries(&self) -> [(&str, EventKind); 3] {
        [
            (self.authentication.as_str(), EventKind::Authentication),
            (self.asset.as_str(), EventKind::Asset),
            (self.password_reset.as_str(), EventKind::PasswordReset),
        ]
    }

    pub fn subject_map(&self) -> SubjectMap {
        SubjectMap::new(
            self.entries()
                .into_iter()
                .map(|(subject, kind)| (subject.to_string(), kind)),
        )
    }

    fn validate(&self) -> Result<()> {
        let entries = self.entries();
        for (i, (subject, kind)) in entries.iter().enumerate() {
            if subject.trim().is_empty() {
                bail!("subjects.{} must not be empty", kind);
            }
            if entries[..i].iter().any(|(other, _)| other == subject) {
                bail!("subject '{}' is mapped to more than one event kind", subject);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Upper bound on one provider call
    pub timeout_ms: u64,
    pub max_concurrent: usize,
    pub queue_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_DELIVERY_TIMEOUT.as_millis() as u64,
            max_concurrent: DEFAULT_MAX_CONCURRENT_DELIVERIES,
            queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: i32,
    pub base_delay_ms: i64,
    pub backoff_factor: f64,
    /// Age after which pending/in_flight rows are treated as orphaned
    pub grace_period_ms: i64,
    pub batch_size: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_delay_ms, self.backoff_factor)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seed the `retry_pending_notifications` job on start.
    /// When false the sweep runs on a plain interval instead.
    pub bootstrap_retry_sweep: bool,
    pub retry_sweep_schedule: String,
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            bootstrap_retry_sweep: true,
            retry_sweep_schedule: RETRY_SWEEP_JOB_SCHEDULE.to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl HeraldConfig {
    /// Load from the optional file and the environment, then validate
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let settings = builder.build().context("Failed to read configuration")?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: config::Config) -> Result<Self> {
        let config: HeraldConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.subjects.validate()?;
        // A send still running when the sweep considers the row orphaned would be duplicated
        if self.delivery.timeout_ms as i64 >= self.retry.grace_period_ms {
            bail!(
                "delivery.timeout_ms ({}) must be shorter than retry.grace_period_ms ({})",
                self.delivery.timeout_ms,
                self.retry.grace_period_ms
            );
        }
        if self.delivery.max_concurrent == 0 {
            bail!("delivery.max_concurrent must be at least 1");
        }
        if self.delivery.queue_capacity == 0 {
            bail!("delivery.queue_capacity must be at least 1");
        }
        if self.retry.max_retries < 1 {
            bail!("retry.max_retries must be at least 1");
        }
        if self.retry.backoff_factor < 1.0 {
            bail!("retry.backoff_factor must be >= 1.0");
        }
        if self.retry.batch_size < 1 {
            bail!("retry.batch_size must be at least 1");
        }
        Ok(())
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery.timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.sweep_interval_secs.max(1))
    }
}
