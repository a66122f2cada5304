// Notification Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::event::{ChannelKind, EventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Notification ID (UUID v4)
pub type NotificationId = String;

/// String-keyed data delivered alongside a notification (order irrelevant)
pub type Payload = HashMap<String, String>;

pub const DEFAULT_COLOR: &str = "#000000";
pub const DEFAULT_CLICK_ACTION: &str = "OPEN_APP";
pub const DEFAULT_ICON: &str = "default";
pub const DEFAULT_SOUND: &str = "default";
pub const DEFAULT_PRIORITY: &str = "high";

/// Delivery status of a notification.
///
/// `pending -> in_flight` happens only through a claim by the reconciler.
/// `sent` and `abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    InFlight,
    Sent,
    Failed,
    Abandoned,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::InFlight => "in_flight",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NotificationStatus::Sent | NotificationStatus::Abandoned)
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "in_flight" => Ok(NotificationStatus::InFlight),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            "abandoned" => Ok(NotificationStatus::Abandoned),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Android-style display block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayAttributes {
    pub color: String,
    pub click_action: String,
    pub icon: String,
    pub sound: String,
}

impl Default for DisplayAttributes {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            click_action: DEFAULT_CLICK_ACTION.to_string(),
            icon: DEFAULT_ICON.to_string(),
            sound: DEFAULT_SOUND.to_string(),
        }
    }
}

impl DisplayAttributes {
    /// Build from event fields; empty values fall back to the defaults
    pub fn from_event(color: &str, click_action: &str) -> Self {
        let mut display = Self::default();
        if !color.is_empty() {
            display.color = color.to_string();
        }
        if !click_action.is_empty() {
            display.click_action = click_action.to_string();
        }
        display
    }
}

/// Canonical, channel-agnostic form of a decoded event
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    pub kind: EventKind,
    pub target: String,
    pub title: String,
    pub body: String,
    pub platform: String,
    pub priority: String,
    pub service_source: String,
    pub event_type: String,
    pub payload: Payload,
    pub display: DisplayAttributes,
}

impl DeliveryRequest {
    pub fn channel(&self) -> ChannelKind {
        self.kind.channel()
    }

    /// Rebuild the request a stored record was created from
    pub fn from_record(record: &NotificationRecord) -> Self {
        Self {
            kind: record.kind,
            target: record.target.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
            platform: record.platform.clone(),
            priority: record.priority.clone(),
            service_source: record.service_source.clone(),
            event_type: record.event_type.clone(),
            payload: record.payload.clone(),
            display: record.display.clone(),
        }
    }
}

/// Durable delivery record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub kind: EventKind,
    pub target: String,
    pub title: String,
    pub body: String,
    pub platform: String,
    pub priority: String,
    pub status: NotificationStatus,
    pub service_source: String,
    pub event_type: String,
    pub payload: Payload,
    pub display: DisplayAttributes,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: i64, // epoch ms
    pub sent_at: Option<i64>,
    pub last_attempt_at: Option<i64>,
}

impl NotificationRecord {
    /// Create a pending record for a decoded request
    ///
    /// # Arguments
    ///
    /// * `id` - Unique notification ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `request` - Decoded delivery request
    pub fn new(id: impl Into<String>, created_at: i64, request: &DeliveryRequest) -> Self {
        Self {
            id: id.into(),
            kind: request.kind,
            target: request.target.clone(),
            title: request.title.clone(),
            body: request.body.clone(),
            platform: request.platform.clone(),
            priority: request.priority.clone(),
            status: NotificationStatus::Pending,
            service_source: request.service_source.clone(),
            event_type: request.event_type.clone(),
            payload: request.payload.clone(),
            display: request.display.clone(),
            retry_count: 0,
            last_error: None,
            created_at,
            sent_at: None,
            last_attempt_at: Some(created_at),
        }
    }

    /// Transition to Sent with explicit timestamp
    pub fn mark_sent(&mut self, now_millis: i64) -> Result<()> {
        self.ensure_deliverable("sent")?;
        self.status = NotificationStatus::Sent;
        self.sent_at = Some(now_millis);
        self.last_error = None;
        Ok(())
    }

    /// Transition to Failed (retry-eligible)
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.ensure_deliverable("failed")?;
        self.status = NotificationStatus::Failed;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Transition to Abandoned (permanently failed, never swept again)
    pub fn abandon(&mut self, error: impl Into<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: NotificationStatus::Abandoned.to_string(),
            });
        }
        self.status = NotificationStatus::Abandoned;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Apply a successful claim (mirrors the store's conditional update)
    pub fn claim(&mut self, now_millis: i64) {
        self.status = NotificationStatus::InFlight;
        self.retry_count += 1;
        self.last_attempt_at = Some(now_millis);
    }

    pub fn retries_exhausted(&self, max_retries: i32) -> bool {
        self.retry_count >= max_retries
    }

    fn ensure_deliverable(&self, to: &str) -> Result<()> {
        match self.status {
            NotificationStatus::Pending | NotificationStatus::InFlight => Ok(()),
            other => Err(DomainError::InvalidStateTransition {
                from: other.to_string(),
                to: to.to_string(),
            }),
        }
    }
}
