// Event Bus Port (Interface)
//
// Delivery is implicit-ack: a message is considered consumed once `next`
// returns it. Losing the process mid-dispatch loses that message.

use crate::error::Result;
use async_trait::async_trait;

/// Raw message received on a subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Subscribe to every subject in `subjects` on a single merged stream
    async fn subscribe(&self, subjects: &[String]) -> Result<Box<dyn EventSubscription>>;
}

#[async_trait]
pub trait EventSubscription: Send {
    /// Next message, or `None` once the bus connection is closed
    async fn next(&mut self) -> Option<InboundMessage>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    type Subscriber = (Vec<String>, mpsc::UnboundedSender<InboundMessage>);

    /// Process-local bus: `publish` fans out to matching subscriptions
    #[derive(Default)]
    pub struct InMemoryEventBus {
        subscribers: Mutex<Vec<Subscriber>>,
    }

    impl InMemoryEventBus {
        pub fn new() -> Self {
            Self::default()
        }

        /// Returns the number of subscriptions that received the message
        pub fn publish(&self, subject: &str, payload: impl Into<Vec<u8>>) -> usize {
            let payload = payload.into();
            let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            subscribers.retain(|(_, tx)| !tx.is_closed());

            let mut delivered = 0;
            for (subjects, tx) in subscribers.iter() {
                if subjects.iter().any(|s| s == subject) {
                    let msg = InboundMessage {
                        subject: subject.to_string(),
                        payload: payload.clone(),
                    };
                    if tx.send(msg).is_ok() {
                        delivered += 1;
                    }
                }
            }
            delivered
        }

        /// Close every subscription (their streams end after draining)
        pub fn close(&self) {
            self.subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
        }
    }

    struct InMemorySubscription {
        rx: mpsc::UnboundedReceiver<InboundMessage>,
    }

    #[async_trait]
    impl EventBus for InMemoryEventBus {
        async fn subscribe(&self, subjects: &[String]) -> Result<Box<dyn EventSubscription>> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((subjects.to_vec(), tx));
            Ok(Box::new(InMemorySubscription { rx }))
        }
    }

    #[async_trait]
    impl EventSubscription for InMemorySubscription {
        async fn next(&mut self) -> Option<InboundMessage> {
            self.rx.recv().await
        }
    }
}
