// Event Router & Delivery Worker
//
// bus subscription -> EventRouter -> bounded command queue -> DeliveryWorker
// -> DeliveryOrchestrator (one spawned task per command, semaphore-bounded)

use crate::application::constants::DEFAULT_WORKER_DRAIN_TIMEOUT;
use crate::application::orchestrator::{DeliveryOrchestrator, DispatchError};
use crate::application::shutdown::ShutdownToken;
use crate::domain::EventKind;
use crate::error::Result;
use crate::port::{EventBus, InboundMessage, TimeProvider};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// One inbound event awaiting dispatch
#[derive(Debug, Clone)]
pub struct DeliveryCommand {
    pub kind: EventKind,
    pub subject: String,
    pub payload: Vec<u8>,
    pub received_at: i64,
}

/// Bounded queue between router and worker (a full queue blocks the router)
pub fn command_queue(
    capacity: usize,
) -> (mpsc::Sender<DeliveryCommand>, mpsc::Receiver<DeliveryCommand>) {
    mpsc::channel(capacity.max(1))
}

/// Subject -> event kind resolution
#[derive(Debug, Clone)]
pub struct SubjectMap {
    subjects: HashMap<String, EventKind>,
}

impl SubjectMap {
    pub fn new(entries: impl IntoIterator<Item = (String, EventKind)>) -> Self {
        Self {
            subjects: entries.into_iter().collect(),
        }
    }

    /// `authentication`, `asset`, `forgot_password`
    pub fn standard() -> Self {
        Self::new(
            EventKind::ALL
                .into_iter()
                .map(|kind| (kind.default_subject().to_string(), kind)),
        )
    }

    pub fn resolve(&self, subject: &str) -> Option<EventKind> {
        self.subjects.get(subject).copied()
    }

    /// Subscribed subjects, sorted
    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self.subjects.keys().cloned().collect();
        subjects.sort();
        subjects
    }
}

impl Default for SubjectMap {
    fn default() -> Self {
        Self::standard()
    }
}

/// Why `EventRouter::run` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterExit {
    Shutdown,
    /// Subscription ended; a new subscription may succeed
    BusClosed,
    /// Worker dropped its receiver; nothing can consume further events
    QueueClosed,
}

impl RouterExit {
    /// Whether a supervisor should subscribe again
    pub fn is_restartable(self) -> bool {
        self == RouterExit::BusClosed
    }
}

pub struct EventRouter {
    bus: Arc<dyn EventBus>,
    subjects: SubjectMap,
    commands: mpsc::Sender<DeliveryCommand>,
    time_provider: Arc<dyn TimeProvider>,
}

impl EventRouter {
    pub fn new(
        bus: Arc<dyn EventBus>,
        subjects: SubjectMap,
        commands: mpsc::Sender<DeliveryCommand>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            bus,
            subjects,
            commands,
            time_provider,
        }
    }

    /// Consume the bus until shutdown, the bus closes, or the worker goes away.
    ///
    /// Messages are acknowledged on receipt; dispatch failures are not redelivered.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<RouterExit> {
        let subjects = self.subjects.subjects();
        let mut subscription = self.bus.subscribe(&subjects).await?;
        info!(subjects = ?subjects, "Event router subscribed");

        let exit = loop {
            let message = tokio::select! {
                _ = shutdown.wait() => {
                    info!("Event router shutting down");
                    break RouterExit::Shutdown;
                }
                message = subscription.next() => message,
            };

            let Some(message) = message else {
                warn!("Event bus subscription closed");
                break RouterExit::BusClosed;
            };

            let Some(command) = self.to_command(message) else {
                continue;
            };

            let subject = command.subject.clone();
            tokio::select! {
                _ = shutdown.wait() => {
                    warn!(subject = %subject, "Shutdown while queue full, event dropped");
                    break RouterExit::Shutdown;
                }
                sent = self.commands.send(command) => {
                    if sent.is_err() {
                        warn!(subject = %subject, "Command queue closed, event dropped");
                        break RouterExit::QueueClosed;
                    }
                }
            }
        };

        info!(exit = ?exit, "Event router stopped");
        Ok(exit)
    }

    /// Re-run the router after a failed subscribe or a closed bus, waiting
    /// `retry_delay` in between. Returns once shutdown is signalled or the
    /// command queue is gone.
    pub async fn supervise(&self, shutdown: ShutdownToken, retry_delay: Duration) -> RouterExit {
        let mut waiter = shutdown.clone();
        loop {
            match self.run(shutdown.clone()).await {
                Ok(exit) if !exit.is_restartable() => return exit,
                Ok(exit) => warn!(exit = ?exit, "Event router exited, resubscribing"),
                Err(e) => error!(error = %e, "Event router failed"),
            }
            if shutdown.is_shutdown() {
                return RouterExit::Shutdown;
            }
            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {}
                _ = waiter.wait() => return RouterExit::Shutdown,
            }
        }
    }

    /// Unknown subjects are logged and dropped
    fn to_command(&self, message: InboundMessage) -> Option<DeliveryCommand> {
        match self.subjects.resolve(&message.subject) {
            Some(kind) => Some(DeliveryCommand {
                kind,
                subject: message.subject,
                payload: message.payload,
                received_at: self.time_provider.now_millis(),
            }),
            None => {
                warn!(subject = %message.subject, "No event kind for subject, dropping");
                None
            }
        }
    }
}

pub struct DeliveryWorker {
    orchestrator: Arc<DeliveryOrchestrator>,
    semaphore: Arc<Semaphore>,
    drain_timeout: Duration,
}

impl DeliveryWorker {
    pub fn new(orchestrator: Arc<DeliveryOrchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            drain_timeout: DEFAULT_WORKER_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Drain the command queue until shutdown or until every sender is gone.
    ///
    /// # Returns
    /// Number of commands handed to the orchestrator
    pub async fn run(
        &self,
        mut commands: mpsc::Receiver<DeliveryCommand>,
        mut shutdown: ShutdownToken,
    ) -> usize {
        info!(
            max_concurrent = self.semaphore.available_permits(),
            "Delivery worker started"
        );
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut accepted = 0;

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let command = loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => break None,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        Self::log_join(joined);
                    }
                    command = commands.recv() => break command,
                }
            };
            let Some(command) = command else {
                break;
            };

            accepted += 1;
            let orchestrator = Arc::clone(&self.orchestrator);
            // Spawned for panic isolation; the permit is held until the dispatch finishes
            tasks.spawn(async move {
                let _permit = permit;
                Self::handle(&orchestrator, command).await;
            });
        }

        info!(in_flight = tasks.len(), "Delivery worker draining");
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                Self::log_join(joined);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                "Drain timeout reached, aborting in-flight deliveries"
            );
            tasks.abort_all();
        }

        info!(accepted = accepted, "Delivery worker stopped");
        accepted
    }

    async fn handle(orchestrator: &DeliveryOrchestrator, command: DeliveryCommand) {
        match orchestrator.dispatch(command.kind, &command.payload).await {
            Ok(outcome) => debug!(
                notification_id = %outcome.notification_id,
                subject = %command.subject,
                "Command dispatched"
            ),
            Err(e @ DispatchError::Delivery { .. }) => {
                // Already persisted as failed/abandoned; the reconciler owns it now
                warn!(subject = %command.subject, error = %e, "Delivery failed");
            }
            Err(e) => {
                error!(
                    subject = %command.subject,
                    kind = %command.kind,
                    received_at = command.received_at,
                    error = %e,
                    "Event dropped"
                );
            }
        }
    }

    fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = ?e, "Delivery task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::RetryPolicy;
    use crate::application::shutdown::shutdown_channel;
    use crate::domain::NotificationStatus;
    use crate::port::delivery_channel::mocks::{MockBehavior, MockEmailChannel, MockPushChannel};
    use crate::port::event_bus::mocks::InMemoryEventBus;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::notification_store::mocks::InMemoryNotificationStore;
    use crate::port::time_provider::mocks::ManualClock;

    const AUTH_EVENT: &str = r#"{"target_token":"tok","title":"t","body":"b","platform":"android",
        "service_source":"auth","event_type":"assign_user_resource",
        "payload":{"access_token":"at","refresh_token":"rt"}}"#;

    fn orchestrator(
        store: Arc<InMemoryNotificationStore>,
        push: Arc<MockPushChannel>,
    ) -> Arc<DeliveryOrchestrator> {
        Arc::new(DeliveryOrchestrator::new(
            store,
            push,
            Arc::new(MockEmailChannel::new_success()),
            Arc::new(ManualClock::new(1_000)),
            Arc::new(SequentialIdProvider::new("n")),
            RetryPolicy::default(),
            Duration::from_secs(5),
        ))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn test_standard_subjects() {
        let map = SubjectMap::standard();
        assert_eq!(
            map.subjects(),
            vec!["asset", "authentication", "forgot_password"]
        );
        assert_eq!(map.resolve("forgot_password"), Some(EventKind::PasswordReset));
        assert_eq!(map.resolve("billing"), None);
    }

    #[test]
    fn test_unknown_subject_dropped() {
        let (tx, _rx) = command_queue(1);
        let router = EventRouter::new(
            Arc::new(InMemoryEventBus::new()),
            SubjectMap::standard(),
            tx,
            Arc::new(ManualClock::new(0)),
        );
        let message = InboundMessage {
            subject: "billing".into(),
            payload: b"{}".to_vec(),
        };
        assert!(router.to_command(message).is_none());
    }

    #[tokio::test]
    async fn test_router_forwards_subscribed_subjects() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, mut rx) = command_queue(8);
        let router = EventRouter::new(
            bus.clone(),
            SubjectMap::standard(),
            tx,
            Arc::new(ManualClock::new(42)),
        );
        let (stop, token) = shutdown_channel();
        let handle = tokio::spawn(async move { router.run(token).await });

        // Subscription is live once a subscribed subject reaches it
        wait_until({
            let bus = bus.clone();
            move || bus.publish("asset", AUTH_EVENT) == 1
        })
        .await;

        let command = rx.recv().await.unwrap();
        assert_eq!(command.kind, EventKind::Asset);
        assert_eq!(command.subject, "asset");
        assert_eq!(command.received_at, 42);

        stop.shutdown();
        assert_eq!(handle.await.unwrap().unwrap(), RouterExit::Shutdown);
        assert!(rx.try_recv().is_err());
    }

    fn router_on(bus: Arc<InMemoryEventBus>, tx: mpsc::Sender<DeliveryCommand>) -> EventRouter {
        EventRouter::new(bus, SubjectMap::standard(), tx, Arc::new(ManualClock::new(0)))
    }

    #[tokio::test]
    async fn test_router_stops_when_queue_closed() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, rx) = command_queue(1);
        drop(rx);
        let router = router_on(bus.clone(), tx);
        let (_stop, token) = shutdown_channel();
        let handle = tokio::spawn(async move { router.run(token).await });

        wait_until({
            let bus = bus.clone();
            move || bus.publish("asset", AUTH_EVENT) == 1
        })
        .await;

        let exit = handle.await.unwrap().unwrap();
        assert_eq!(exit, RouterExit::QueueClosed);
        assert!(!exit.is_restartable());
    }

    #[tokio::test]
    async fn test_router_reports_bus_closed() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, _rx) = command_queue(1);
        let router = router_on(bus.clone(), tx);
        let (_stop, token) = shutdown_channel();
        let handle = tokio::spawn(async move { router.run(token).await });

        wait_until({
            let bus = bus.clone();
            move || bus.publish("asset", AUTH_EVENT) == 1
        })
        .await;
        bus.close();

        let exit = handle.await.unwrap().unwrap();
        assert_eq!(exit, RouterExit::BusClosed);
        assert!(exit.is_restartable());
    }

    #[tokio::test]
    async fn test_supervise_gives_up_on_closed_queue() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, rx) = command_queue(1);
        drop(rx);
        let router = router_on(bus.clone(), tx);
        let (_stop, token) = shutdown_channel();
        let handle = tokio::spawn(async move {
            router.supervise(token, Duration::from_millis(10)).await
        });

        wait_until({
            let bus = bus.clone();
            move || bus.publish("asset", AUTH_EVENT) == 1
        })
        .await;

        let exit = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("supervisor kept resubscribing")
            .unwrap();
        assert_eq!(exit, RouterExit::QueueClosed);
    }

    #[tokio::test]
    async fn test_supervise_resubscribes_after_bus_close() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, mut rx) = command_queue(8);
        let router = router_on(bus.clone(), tx);
        let (stop, token) = shutdown_channel();
        let handle = tokio::spawn(async move {
            router.supervise(token, Duration::from_millis(10)).await
        });

        wait_until({
            let bus = bus.clone();
            move || bus.publish("asset", AUTH_EVENT) == 1
        })
        .await;
        assert!(rx.recv().await.is_some());

        bus.close();
        wait_until({
            let bus = bus.clone();
            move || bus.publish("asset", AUTH_EVENT) == 1
        })
        .await;
        assert!(rx.recv().await.is_some());

        stop.shutdown();
        assert_eq!(handle.await.unwrap(), RouterExit::Shutdown);
    }

    #[tokio::test]
    async fn test_shutdown_while_queue_full() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, mut rx) = command_queue(1);
        let router = router_on(bus.clone(), tx);
        let (stop, token) = shutdown_channel();
        let handle = tokio::spawn(async move { router.run(token).await });

        wait_until({
            let bus = bus.clone();
            move || bus.publish("asset", AUTH_EVENT) == 1
        })
        .await;
        // Second event blocks on the full queue
        assert_eq!(bus.publish("asset", AUTH_EVENT), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop.shutdown();
        assert_eq!(handle.await.unwrap().unwrap(), RouterExit::Shutdown);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_worker_dispatches_commands() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let push = Arc::new(MockPushChannel::new_success());
        let worker = DeliveryWorker::new(orchestrator(store.clone(), push.clone()), 4);
        let (tx, rx) = command_queue(8);
        let (_stop, token) = shutdown_channel();

        for _ in 0..3 {
            tx.send(DeliveryCommand {
                kind: EventKind::Authentication,
                subject: "authentication".into(),
                payload: AUTH_EVENT.as_bytes().to_vec(),
                received_at: 0,
            })
            .await
            .unwrap();
        }
        drop(tx);

        let accepted = worker.run(rx, token).await;
        assert_eq!(accepted, 3);
        assert_eq!(push.call_count(), 3);
        assert!(store
            .all()
            .iter()
            .all(|r| r.status == NotificationStatus::Sent));
        assert_eq!(push.sent()[0].data["type"], "system");
    }

    #[tokio::test]
    async fn test_worker_survives_panicking_delivery() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let push = Arc::new(MockPushChannel::new_success());
        push.push_behavior(MockBehavior::Panic("provider exploded".into()));
        let worker = DeliveryWorker::new(orchestrator(store.clone(), push.clone()), 1);
        let (tx, rx) = command_queue(8);
        let (_stop, token) = shutdown_channel();

        for _ in 0..2 {
            tx.send(DeliveryCommand {
                kind: EventKind::Authentication,
                subject: "authentication".into(),
                payload: AUTH_EVENT.as_bytes().to_vec(),
                received_at: 0,
            })
            .await
            .unwrap();
        }
        drop(tx);

        assert_eq!(worker.run(rx, token).await, 2);
        assert_eq!(push.call_count(), 2);
        let statuses: Vec<_> = store.all().into_iter().map(|r| r.status).collect();
        assert!(statuses.contains(&NotificationStatus::Sent));
        // The panicked dispatch leaves its record pending for the reconciler
        assert!(statuses.contains(&NotificationStatus::Pending));
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let push = Arc::new(MockPushChannel::new_success());
        let worker = DeliveryWorker::new(orchestrator(store, push), 2);
        let (_tx, rx) = command_queue(8);
        let (stop, token) = shutdown_channel();

        stop.shutdown();
        let accepted = tokio::time::timeout(Duration::from_secs(1), worker.run(rx, token))
            .await
            .expect("worker should stop");
        assert_eq!(accepted, 0);
    }
}
