// Delivery Channel Ports (push provider, email provider)

use crate::domain::{DisplayAttributes, Payload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exactly the fields a push provider needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: Payload,
    pub display: DisplayAttributes,
    pub priority: String,
}

/// Provider acknowledgment (FCM returns the message resource name)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReceipt {
    pub message_id: String,
}

/// Substitutions for the password reset template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetVars {
    pub full_name: String,
    pub url: String,
}

/// Send errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Connect, timeout or IO failure before a provider verdict
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Push messaging provider
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<PushReceipt, SendError>;
}

/// Transactional email provider (password reset template)
#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send(&self, to: &str, vars: &PasswordResetVars) -> Result<(), SendError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock channel behavior once the script is exhausted
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        Success,
        Fail(SendError),
        /// Sleep before succeeding (timeout and overlap testing)
        Delay(Duration),
        Panic(String),
    }

    struct Script {
        queued: VecDeque<MockBehavior>,
        fallback: MockBehavior,
    }

    impl Script {
        fn new(fallback: MockBehavior) -> Self {
            Self {
                queued: VecDeque::new(),
                fallback,
            }
        }

        fn next(&mut self) -> MockBehavior {
            self.queued
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    async fn play(behavior: MockBehavior) -> Result<(), SendError> {
        match behavior {
            MockBehavior::Success => Ok(()),
            MockBehavior::Fail(err) => Err(err),
            MockBehavior::Delay(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            MockBehavior::Panic(msg) => panic!("{}", msg),
        }
    }

    /// Scripted push channel that records every message it is asked to send
    pub struct MockPushChannel {
        script: Mutex<Script>,
        sent: Mutex<Vec<PushMessage>>,
        call_count: AtomicUsize,
    }

    impl MockPushChannel {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                script: Mutex::new(Script::new(behavior)),
                sent: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(err: SendError) -> Self {
            Self::new(MockBehavior::Fail(err))
        }

        /// Queue a one-shot behavior ahead of the fallback
        pub fn push_behavior(&self, behavior: MockBehavior) {
            self.script
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .queued
                .push_back(behavior);
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn sent(&self) -> Vec<PushMessage> {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl PushChannel for MockPushChannel {
        async fn send(&self, message: &PushMessage) -> Result<PushReceipt, SendError> {
            let n = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(message.clone());
            let behavior = self.script.lock().unwrap_or_else(|e| e.into_inner()).next();
            play(behavior).await?;
            Ok(PushReceipt {
                message_id: format!("projects/mock/messages/{}", n),
            })
        }
    }

    /// Scripted email channel recording (to, vars) pairs
    pub struct MockEmailChannel {
        script: Mutex<Script>,
        sent: Mutex<Vec<(String, PasswordResetVars)>>,
        call_count: AtomicUsize,
    }

    impl MockEmailChannel {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                script: Mutex::new(Script::new(behavior)),
                sent: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(err: SendError) -> Self {
            Self::new(MockBehavior::Fail(err))
        }

        pub fn push_behavior(&self, behavior: MockBehavior) {
            self.script
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .queued
                .push_back(behavior);
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn sent(&self) -> Vec<(String, PasswordResetVars)> {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl EmailChannel for MockEmailChannel {
        async fn send(&self, to: &str, vars: &PasswordResetVars) -> Result<(), SendError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((to.to_string(), vars.clone()));
            let behavior = self.script.lock().unwrap_or_else(|e| e.into_inner()).next();
            play(behavior).await
        }
    }
}
