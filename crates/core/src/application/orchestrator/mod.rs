// Delivery Orchestrator
// decode -> persist -> send -> finalize for one event

pub mod decode;

pub use decode::{Decoder, DecoderTable};

use crate::application::retry::RetryPolicy;
use crate::domain::{ChannelKind, DeliveryRequest, EventKind, NotificationRecord, NotificationStatus};
use crate::port::{
    EmailChannel, IdProvider, NotificationStore, PasswordResetVars, PushChannel, PushMessage,
    SendError, TimeProvider,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Whether a delivery failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Transient,
    Permanent,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Transient => f.write_str("transient"),
            FailureClass::Permanent => f.write_str("permanent"),
        }
    }
}

/// Transport errors and provider 429/5xx are transient, everything else permanent
pub fn classify(err: &SendError) -> FailureClass {
    match err {
        SendError::Transport(_) => FailureClass::Transient,
        SendError::Provider { status, .. } if *status == 429 || *status >= 500 => {
            FailureClass::Transient
        }
        _ => FailureClass::Permanent,
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported event: {0}")]
    UnsupportedEvent(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Delivery of {notification_id} failed ({class}): {message}")]
    Delivery {
        notification_id: String,
        class: FailureClass,
        message: String,
    },
}

/// Result of a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub notification_id: String,
    pub status: NotificationStatus,
    /// Provider receipt (push only)
    pub receipt: Option<String>,
}

pub struct DeliveryOrchestrator {
    store: Arc<dyn NotificationStore>,
    push: Arc<dyn PushChannel>,
    email: Arc<dyn EmailChannel>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    decoders: DecoderTable,
    retry_policy: RetryPolicy,
    delivery_timeout: Duration,
}

impl DeliveryOrchestrator {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        push: Arc<dyn PushChannel>,
        email: Arc<dyn EmailChannel>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
        retry_policy: RetryPolicy,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            push,
            email,
            time_provider,
            id_provider,
            decoders: DecoderTable::standard(),
            retry_policy,
            delivery_timeout,
        }
    }

    /// Replace the decoder table
    pub fn with_decoders(mut self, decoders: DecoderTable) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Handle one inbound event end to end.
    ///
    /// Rejected events (`Decode`, `UnsupportedEvent`) never create a record.
    /// The record is persisted before the send; a failed save aborts the send.
    pub async fn dispatch(
        &self,
        kind: EventKind,
        raw: &[u8],
    ) -> Result<DispatchOutcome, DispatchError> {
        let decoder = self.decoders.get(kind).ok_or_else(|| {
            DispatchError::UnsupportedEvent(format!("no decoder registered for {}", kind))
        })?;
        let request = decoder(raw)?;

        let now = self.time_provider.now_millis();
        let mut record = NotificationRecord::new(self.id_provider.generate_id(), now, &request);

        self.store
            .save(&record)
            .await
            .map_err(|e| DispatchError::Persistence(e.to_string()))?;

        info!(
            notification_id = %record.id,
            kind = %kind,
            channel = %request.channel(),
            event_type = %record.event_type,
            "Notification persisted, sending"
        );

        self.deliver(&mut record, &request).await
    }

    /// Re-drive a record already claimed by the reconciler
    pub async fn redeliver(
        &self,
        mut record: NotificationRecord,
    ) -> Result<DispatchOutcome, DispatchError> {
        let request = DeliveryRequest::from_record(&record);
        info!(
            notification_id = %record.id,
            retry_count = record.retry_count,
            "Redelivering notification"
        );
        self.deliver(&mut record, &request).await
    }

    async fn deliver(
        &self,
        record: &mut NotificationRecord,
        request: &DeliveryRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        match self.send(request).await {
            Ok(receipt) => {
                let now = self.time_provider.now_millis();
                record
                    .mark_sent(now)
                    .map_err(|e| DispatchError::Persistence(e.to_string()))?;
                self.persist(record).await?;

                info!(
                    notification_id = %record.id,
                    receipt = receipt.as_deref().unwrap_or("-"),
                    "Notification sent"
                );
                Ok(DispatchOutcome {
                    notification_id: record.id.clone(),
                    status: record.status,
                    receipt,
                })
            }
            Err(send_err) => {
                let class = classify(&send_err);
                let message = send_err.to_string();
                let exhausted = record.retries_exhausted(self.retry_policy.max_retries);

                let transition = if class == FailureClass::Permanent || exhausted {
                    record.abandon(message.clone())
                } else {
                    record.mark_failed(message.clone())
                };
                transition.map_err(|e| DispatchError::Persistence(e.to_string()))?;
                self.persist(record).await?;

                warn!(
                    notification_id = %record.id,
                    class = %class,
                    status = %record.status,
                    retry_count = record.retry_count,
                    error = %message,
                    "Notification delivery failed"
                );
                Err(DispatchError::Delivery {
                    notification_id: record.id.clone(),
                    class,
                    message,
                })
            }
        }
    }

    /// Send on the channel implied by the request, bounded by the delivery timeout
    async fn send(&self, request: &DeliveryRequest) -> Result<Option<String>, SendError> {
        let send = async {
            match request.channel() {
                ChannelKind::Push => {
                    let message = PushMessage {
                        token: request.target.clone(),
                        title: request.title.clone(),
                        body: request.body.clone(),
                        data: request.payload.clone(),
                        display: request.display.clone(),
                        priority: request.priority.clone(),
                    };
                    self.push
                        .send(&message)
                        .await
                        .map(|receipt| Some(receipt.message_id))
                }
                ChannelKind::Email => {
                    let field = |key: &str| request.payload.get(key).cloned().unwrap_or_default();
                    let vars = PasswordResetVars {
                        full_name: field("full_name"),
                        url: field("url"),
                    };
                    self.email.send(&request.target, &vars).await.map(|()| None)
                }
            }
        };

        match tokio::time::timeout(self.delivery_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Transport(format!(
                "delivery timed out after {}ms",
                self.delivery_timeout.as_millis()
            ))),
        }
    }

    async fn persist(&self, record: &NotificationRecord) -> Result<(), DispatchError> {
        self.store.update(record).await.map_err(|e| {
            error!(
                notification_id = %record.id,
                status = %record.status,
                error = %e,
                "Failed to persist delivery outcome"
            );
            DispatchError::Persistence(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::delivery_channel::mocks::{MockBehavior, MockEmailChannel, MockPushChannel};
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::notification_store::mocks::InMemoryNotificationStore;
    use crate::port::time_provider::mocks::ManualClock;

    const ASSET_EVENT: &str = r#"{"target_token":"tok","title":"t","body":"b","platform":"android",
        "service_source":"asset","event_type":"assign_user_resource","payload":{"asset_id":"1"}}"#;

    struct Harness {
        store: Arc<InMemoryNotificationStore>,
        push: Arc<MockPushChannel>,
        email: Arc<MockEmailChannel>,
        orchestrator: DeliveryOrchestrator,
    }

    fn harness(push: MockPushChannel) -> Harness {
        let store = Arc::new(InMemoryNotificationStore::new());
        let push = Arc::new(push);
        let email = Arc::new(MockEmailChannel::new_success());
        let orchestrator = DeliveryOrchestrator::new(
            store.clone(),
            push.clone(),
            email.clone(),
            Arc::new(ManualClock::new(1_000)),
            Arc::new(SequentialIdProvider::new("n")),
            RetryPolicy::default(),
            Duration::from_millis(200),
        );
        Harness {
            store,
            push,
            email,
            orchestrator,
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            classify(&SendError::Transport("reset".into())),
            FailureClass::Transient
        );
        assert_eq!(
            classify(&SendError::Provider {
                status: 429,
                message: "quota".into()
            }),
            FailureClass::Transient
        );
        assert_eq!(
            classify(&SendError::Provider {
                status: 503,
                message: "unavailable".into()
            }),
            FailureClass::Transient
        );
        assert_eq!(
            classify(&SendError::Provider {
                status: 404,
                message: "unregistered".into()
            }),
            FailureClass::Permanent
        );
        assert_eq!(
            classify(&SendError::InvalidRecipient("bad".into())),
            FailureClass::Permanent
        );
    }

    #[tokio::test]
    async fn test_dispatch_success_marks_sent() {
        let h = harness(MockPushChannel::new_success());
        let outcome = h
            .orchestrator
            .dispatch(EventKind::Asset, ASSET_EVENT.as_bytes())
            .await
            .unwrap();

        assert_eq!(outcome.status, NotificationStatus::Sent);
        assert_eq!(outcome.notification_id, "n-1");
        let record = h.store.get("n-1").unwrap();
        assert_eq!(record.status, NotificationStatus::Sent);
        assert_eq!(record.sent_at, Some(1_000));
        assert_eq!(h.push.call_count(), 1);
        assert_eq!(h.push.sent()[0].data["asset_id"], "1");
    }

    #[tokio::test]
    async fn test_missing_decoder_is_unsupported() {
        let h = harness(MockPushChannel::new_success());
        let orchestrator = h.orchestrator.with_decoders(DecoderTable::empty());
        let err = orchestrator
            .dispatch(EventKind::Asset, ASSET_EVENT.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedEvent(_)));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_aborts_before_send() {
        let h = harness(MockPushChannel::new_success());
        h.store.fail_saves(true);
        let err = h
            .orchestrator
            .dispatch(EventKind::Asset, ASSET_EVENT.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Persistence(_)));
        assert_eq!(h.push.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_marks_failed() {
        let h = harness(MockPushChannel::new_fail(SendError::Provider {
            status: 503,
            message: "unavailable".into(),
        }));
        let err = h
            .orchestrator
            .dispatch(EventKind::Asset, ASSET_EVENT.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Delivery {
                class: FailureClass::Transient,
                ..
            }
        ));
        let record = h.store.get("n-1").unwrap();
        assert_eq!(record.status, NotificationStatus::Failed);
        assert!(record.last_error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_permanent_failure_abandons() {
        let h = harness(MockPushChannel::new_fail(SendError::InvalidRecipient(
            "unregistered token".into(),
        )));
        let _ = h
            .orchestrator
            .dispatch(EventKind::Asset, ASSET_EVENT.as_bytes())
            .await;
        let record = h.store.get("n-1").unwrap();
        assert_eq!(record.status, NotificationStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let h = harness(MockPushChannel::new(MockBehavior::Delay(
            Duration::from_secs(5),
        )));
        let err = h
            .orchestrator
            .dispatch(EventKind::Asset, ASSET_EVENT.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Delivery {
                class: FailureClass::Transient,
                ..
            }
        ));
        assert_eq!(
            h.store.get("n-1").unwrap().status,
            NotificationStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_password_reset_goes_to_email() {
        let h = harness(MockPushChannel::new_success());
        let raw = r#"{"to":"a@example.com","full_name":"Ana","url":"https://x/r","subject":"Reset Your Password"}"#;
        let outcome = h
            .orchestrator
            .dispatch(EventKind::PasswordReset, raw.as_bytes())
            .await
            .unwrap();
        assert_eq!(outcome.status, NotificationStatus::Sent);
        assert!(outcome.receipt.is_none());
        assert_eq!(h.push.call_count(), 0);
        let sent = h.email.sent();
        assert_eq!(sent[0].0, "a@example.com");
        assert_eq!(sent[0].1.url, "https://x/r");
    }

    #[tokio::test]
    async fn test_redeliver_exhausted_transient_abandons() {
        let h = harness(MockPushChannel::new_fail(SendError::Transport(
            "connection reset".into(),
        )));
        let _ = h
            .orchestrator
            .dispatch(EventKind::Asset, ASSET_EVENT.as_bytes())
            .await;

        let mut record = h.store.get("n-1").unwrap();
        record.retry_count = h.orchestrator.retry_policy().max_retries - 1;
        record.claim(2_000);
        h.store.seed(record.clone());

        let _ = h.orchestrator.redeliver(record).await;
        assert_eq!(
            h.store.get("n-1").unwrap().status,
            NotificationStatus::Abandoned
        );
    }
}
