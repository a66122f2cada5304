// Domain Layer - Pure business logic and entities

pub mod error;
pub mod event;
pub mod notification;
pub mod schedule;
pub mod scheduled_job;

// Re-exports
pub use error::DomainError;
pub use event::{ChannelKind, EventKind, ResourceEventType};
pub use notification::{
    DeliveryRequest, DisplayAttributes, NotificationId, NotificationRecord, NotificationStatus,
    Payload,
};
pub use schedule::{CronSchedule, MissedRuns};
pub use scheduled_job::{JobDefinition, JobId, ScheduledJob};
