// Event kinds accepted from the event bus

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Outbound mechanism used for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Push,
    Email,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Push => "push",
            ChannelKind::Email => "email",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of notification-triggering events.
///
/// Each kind has exactly one decoder registered in the orchestrator and maps to
/// one delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Session credentials assigned/revoked (push, `type=system` data)
    Authentication,
    /// Resource assignment changes (push, payload forwarded as-is)
    Asset,
    /// Forgotten password (email)
    PasswordReset,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::Authentication,
        EventKind::Asset,
        EventKind::PasswordReset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Authentication => "authentication",
            EventKind::Asset => "asset",
            EventKind::PasswordReset => "password_reset",
        }
    }

    /// Bus subject this kind is published on unless overridden by config
    pub fn default_subject(&self) -> &'static str {
        match self {
            EventKind::Authentication => "authentication",
            EventKind::Asset => "asset",
            EventKind::PasswordReset => "forgot_password",
        }
    }

    pub fn channel(&self) -> ChannelKind {
        match self {
            EventKind::Authentication | EventKind::Asset => ChannelKind::Push,
            EventKind::PasswordReset => ChannelKind::Email,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.default_subject() == s)
            .ok_or_else(|| DomainError::UnknownEventKind(s.to_string()))
    }
}

/// Inner `event_type` accepted on push envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEventType {
    AssignUserResource,
    RemoveUserResource,
}

impl ResourceEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceEventType::AssignUserResource => "assign_user_resource",
            ResourceEventType::RemoveUserResource => "remove_user_resource",
        }
    }
}

impl FromStr for ResourceEventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assign_user_resource" => Ok(ResourceEventType::AssignUserResource),
            "remove_user_resource" => Ok(ResourceEventType::RemoveUserResource),
            other => Err(DomainError::UnknownEventKind(other.to_string())),
        }
    }
}
