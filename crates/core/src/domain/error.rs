// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid notification state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Unknown notification status: {0}")]
    UnknownStatus(String),

    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
