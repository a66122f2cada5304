// Event decoders: raw bus payload -> DeliveryRequest

use super::DispatchError;
use crate::domain::notification::DEFAULT_PRIORITY;
use crate::domain::{DeliveryRequest, DisplayAttributes, EventKind, Payload, ResourceEventType};
use serde::Deserialize;
use std::collections::HashMap;

pub const DEFAULT_RESET_SUBJECT: &str = "Reset Your Password";

/// Decoder for one event kind
pub type Decoder = fn(&[u8]) -> Result<DeliveryRequest, DispatchError>;

/// Closed table of decoders, one per event kind
#[derive(Clone)]
pub struct DecoderTable {
    decoders: HashMap<EventKind, Decoder>,
}

impl DecoderTable {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Decoders for every kind the engine ships with
    pub fn standard() -> Self {
        Self::empty()
            .register(EventKind::Authentication, decode_authentication)
            .register(EventKind::Asset, decode_asset)
            .register(EventKind::PasswordReset, decode_password_reset)
    }

    pub fn register(mut self, kind: EventKind, decoder: Decoder) -> Self {
        self.decoders.insert(kind, decoder);
        self
    }

    pub fn get(&self, kind: EventKind) -> Option<Decoder> {
        self.decoders.get(&kind).copied()
    }
}

impl Default for DecoderTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Push envelope shared by the authentication and asset subjects
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    #[serde(default)]
    target_token: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    platform: String,
    #[serde(default)]
    service_source: String,
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    payload: Payload,
    #[serde(default)]
    color: String,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    click_action: String,
}

#[derive(Debug, Deserialize)]
struct PasswordResetEnvelope {
    #[serde(default)]
    to: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    subject: String,
}

fn parse_push(raw: &[u8]) -> Result<PushEnvelope, DispatchError> {
    let envelope: PushEnvelope =
        serde_json::from_slice(raw).map_err(|e| DispatchError::Decode(e.to_string()))?;

    envelope
        .event_type
        .parse::<ResourceEventType>()
        .map_err(|_| {
            DispatchError::UnsupportedEvent(format!(
                "unsupported event type: {}",
                envelope.event_type
            ))
        })?;

    if envelope.target_token.is_empty() {
        return Err(DispatchError::Decode("target_token is required".to_string()));
    }
    Ok(envelope)
}

fn push_request(kind: EventKind, envelope: PushEnvelope, payload: Payload) -> DeliveryRequest {
    let priority = if envelope.priority.is_empty() {
        DEFAULT_PRIORITY.to_string()
    } else {
        envelope.priority
    };
    DeliveryRequest {
        kind,
        display: DisplayAttributes::from_event(&envelope.color, &envelope.click_action),
        target: envelope.target_token,
        title: envelope.title,
        body: envelope.body,
        platform: envelope.platform,
        priority,
        service_source: envelope.service_source,
        event_type: envelope.event_type,
        payload,
    }
}

/// Session credentials: the delivered data map is reduced to
/// `{type: system, access_token, refresh_token}`
pub fn decode_authentication(raw: &[u8]) -> Result<DeliveryRequest, DispatchError> {
    let mut envelope = parse_push(raw)?;

    let mut take = |key: &str| {
        envelope
            .payload
            .remove(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DispatchError::Decode(format!("payload.{} is required", key)))
    };
    let access_token = take("access_token")?;
    let refresh_token = take("refresh_token")?;

    let data = Payload::from([
        ("type".to_string(), "system".to_string()),
        ("access_token".to_string(), access_token),
        ("refresh_token".to_string(), refresh_token),
    ]);
    Ok(push_request(EventKind::Authentication, envelope, data))
}

/// Resource assignment: payload forwarded unchanged
pub fn decode_asset(raw: &[u8]) -> Result<DeliveryRequest, DispatchError> {
    let mut envelope = parse_push(raw)?;
    let data = std::mem::take(&mut envelope.payload);
    Ok(push_request(EventKind::Asset, envelope, data))
}

pub fn decode_password_reset(raw: &[u8]) -> Result<DeliveryRequest, DispatchError> {
    let envelope: PasswordResetEnvelope =
        serde_json::from_slice(raw).map_err(|e| DispatchError::Decode(e.to_string()))?;

    if envelope.to.is_empty() {
        return Err(DispatchError::Decode("to is required".to_string()));
    }
    if envelope.url.is_empty() {
        return Err(DispatchError::Decode("url is required".to_string()));
    }

    let title = if envelope.subject.is_empty() {
        DEFAULT_RESET_SUBJECT.to_string()
    } else {
        envelope.subject
    };

    Ok(DeliveryRequest {
        kind: EventKind::PasswordReset,
        target: envelope.to,
        title,
        body: String::new(),
        platform: "email".to_string(),
        priority: DEFAULT_PRIORITY.to_string(),
        service_source: "auth".to_string(),
        event_type: "forgot_password".to_string(),
        payload: Payload::from([
            ("full_name".to_string(), envelope.full_name),
            ("url".to_string(), envelope.url),
        ]),
        display: DisplayAttributes::default(),
    })
}
