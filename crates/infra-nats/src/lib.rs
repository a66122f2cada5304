// Herald Infrastructure - NATS Adapter
// Implements: EventBus (core NATS subjects, implicit ack)

use async_trait::async_trait;
use futures::stream::{self, BoxStream, SelectAll, StreamExt};
use herald_core::error::{AppError, Result};
use herald_core::port::{EventBus, EventSubscription, InboundMessage};
use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Connection name shown in server monitoring
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

fn default_url() -> String {
    DEFAULT_NATS_URL.to_string()
}

fn default_client_name() -> String {
    "herald".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            client_name: default_client_name(),
        }
    }
}

pub struct NatsEventBus {
    client: async_nats::Client,
}

impl NatsEventBus {
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        let client = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::Internal(format!("NATS connect {}: {}", config.url, e)))?;

        info!(url = %config.url, "Connected to NATS");
        Ok(Self { client })
    }

    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    pub async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| AppError::Internal(format!("NATS publish {}: {}", subject, e)))
    }
}

fn validate_subjects(subjects: &[String]) -> Result<()> {
    if subjects.is_empty() {
        return Err(AppError::Validation(
            "at least one subject is required".to_string(),
        ));
    }
    if let Some(blank) = subjects.iter().find(|s| s.trim().is_empty()) {
        return Err(AppError::Validation(format!("invalid subject '{}'", blank)));
    }
    Ok(())
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn subscribe(&self, subjects: &[String]) -> Result<Box<dyn EventSubscription>> {
        validate_subjects(subjects)?;

        let mut streams: Vec<BoxStream<'static, async_nats::Message>> =
            Vec::with_capacity(subjects.len());
        for subject in subjects {
            let subscriber = self
                .client
                .subscribe(subject.clone())
                .await
                .map_err(|e| AppError::Internal(format!("NATS subscribe {}: {}", subject, e)))?;
            info!(subject = %subject, "Subscribed");
            streams.push(subscriber.boxed());
        }

        Ok(Box::new(NatsSubscription {
            inner: stream::select_all(streams),
        }))
    }
}

/// All subject subscriptions merged into one stream
struct NatsSubscription {
    inner: SelectAll<BoxStream<'static, async_nats::Message>>,
}

#[async_trait]
impl EventSubscription for NatsSubscription {
    async fn next(&mut self) -> Option<InboundMessage> {
        let message = self.inner.next().await;
        if message.is_none() {
            warn!("NATS subscriptions closed");
        }
        message.map(|m| InboundMessage {
            subject: m.subject.to_string(),
            payload: m.payload.to_vec(),
        })
    }
}
