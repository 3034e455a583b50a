//! Error types for the email service

use dfmail_core::ServiceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmailError {
    /// Missing or invalid service configuration; fatal at construction
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The transport or provider refused or failed the send
    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EmailError {
    /// Wrap an internal failure with context, as `"{context} {error}"`.
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        EmailError::Internal(format!("{} {}", context, err))
    }
}

impl From<serde_json::Error> for EmailError {
    fn from(err: serde_json::Error) -> Self {
        EmailError::Internal(format!("Serialization error: {}", err))
    }
}

impl From<std::io::Error> for EmailError {
    fn from(err: std::io::Error) -> Self {
        EmailError::Internal(format!("I/O error: {}", err))
    }
}

impl From<ServiceError> for EmailError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { resource } => EmailError::NotFound(resource),
            ServiceError::Validation { message } => EmailError::Validation(message),
            ServiceError::PermissionDenied { action } => EmailError::Forbidden(action),
            ServiceError::Configuration { message } => EmailError::Configuration(message),
            other => EmailError::Internal(other.to_string()),
        }
    }
}
