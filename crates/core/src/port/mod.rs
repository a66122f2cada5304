// Port Layer - Interfaces for external dependencies

pub mod delivery_channel;
pub mod event_bus;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod notification_store;
pub mod time_provider;

// Re-exports
pub use delivery_channel::{
    EmailChannel, PasswordResetVars, PushChannel, PushMessage, PushReceipt, SendError,
};
pub use event_bus::{EventBus, EventSubscription, InboundMessage};
pub use id_provider::{IdProvider, UuidProvider};
pub use job_store::JobStore;
pub use notification_store::NotificationStore;
pub use time_provider::{SystemTimeProvider, TimeProvider};
