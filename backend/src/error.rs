//! Error handling for the CropSense monitoring service

use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unknown crop: {0}")]
    UnknownCrop(String),

    #[error("Unknown soil class: {0}")]
    UnknownSoilClass(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Cycle {0} is not active")]
    CycleNotActive(Uuid),

    #[error("Owner {0} already has an active cycle")]
    CycleAlreadyActive(Uuid),

    // External service errors
    #[error("Weather gateway timed out")]
    GatewayTimeout,

    #[error("Weather gateway error: {0}")]
    GatewayError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error")]
    InternalError(#[from] anyhow::Error),
}

impl From<shared::ModelError> for AppError {
    fn from(err: shared::ModelError) -> Self {
        match err {
            shared::ModelError::UnknownCrop(crop) => AppError::UnknownCrop(crop),
        }
    }
}

impl From<shared::UnknownSoilClassError> for AppError {
    fn from(err: shared::UnknownSoilClassError) -> Self {
        AppError::UnknownSoilClass(err.0)
    }
}

impl AppError {
    /// True for transient upstream failures worth retrying on a later tick
    pub fn is_gateway_failure(&self) -> bool {
        matches!(self, AppError::GatewayTimeout | AppError::GatewayError(_))
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;
