// Application Layer - Use Cases and Business Logic

pub mod constants;
pub mod orchestrator;
pub mod reconciler;
pub mod retry;
pub mod router;
pub mod scheduler;
pub mod shutdown;

// Re-exports
pub use orchestrator::{
    classify, DecoderTable, DeliveryOrchestrator, DispatchError, DispatchOutcome, FailureClass,
};
pub use reconciler::RetryReconciler;
pub use retry::{RetryDecision, RetryPolicy};
pub use router::{
    command_queue, DeliveryCommand, DeliveryWorker, EventRouter, RouterExit, SubjectMap,
};
pub use scheduler::{FireOutcome, JobAction, JobActionTable, JobScheduler, RetrySweepAction};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
