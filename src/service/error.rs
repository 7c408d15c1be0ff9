use thiserror::Error;

use crate::error::{ErrorMessage, HttpError};

/// Coarse classification of a failure, used to pick the entry point of
/// the degraded-variant chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Timeout,
    Network,
    Data,
    Unknown,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Algorithm '{algorithm}' failed: {message}")]
    AlgorithmFault {
        algorithm: String,
        message: String,
        class: ErrorClass,
    },

    #[error("Travel-time provider unavailable")]
    TravelUnavailable,

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Webhook delivery failed: {0}")]
    Webhook(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::AlgorithmFault { class, .. } => *class,
            ServiceError::TravelUnavailable => ErrorClass::Network,
            ServiceError::Queue(_) | ServiceError::Cache(_) => ErrorClass::Network,
            ServiceError::Serialization(_) | ServiceError::InvalidInput(_) => ErrorClass::Data,
            ServiceError::Database(_) | ServiceError::Persistence(_) => ErrorClass::Data,
            ServiceError::Webhook(_) => ErrorClass::Network,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::InvalidInput(_) => HttpError::bad_request(error.to_string()),
            ServiceError::Queue(_) => {
                HttpError::service_unavailable(ErrorMessage::QueueUnavailable.to_str())
            }
            _ => HttpError::server_error(error.to_string()),
        }
    }
}
