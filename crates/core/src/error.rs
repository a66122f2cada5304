// Central Error Type for the Application

use crate::domain::DomainError;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(DomainError),

    #[error("Invalid schedule: {0}")]
    Schedule(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Cron parse failures surface as AppError::Schedule so callers can log-and-skip them
impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidSchedule { .. } => AppError::Schedule(err.to_string()),
            DomainError::ValidationError(msg) => AppError::Validation(msg),
            other => AppError::Domain(other),
        }
    }
}

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::Database(String)

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_schedule_maps_to_schedule_error() {
        let err: AppError = DomainError::InvalidSchedule {
            expression: "bogus".to_string(),
            reason: "bad field".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Schedule(ref msg) if msg.contains("bogus")));
    }

    #[test]
    fn test_validation_error_is_flattened() {
        let err: AppError = DomainError::ValidationError("empty name".to_string()).into();
        assert!(matches!(err, AppError::Validation(ref msg) if msg == "empty name"));
    }
}
