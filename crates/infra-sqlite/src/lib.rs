// Herald Infrastructure - SQLite Adapter
// Implements: NotificationStore, JobStore

mod connection;
mod error;
mod job_store;
mod migration;
mod notification_store;

pub use connection::create_pool;
pub use job_store::SqliteJobStore;
pub use migration::{current_version, run_migrations};
pub use notification_store::SqliteNotificationStore;
