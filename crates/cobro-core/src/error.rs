//! # Error Types
//!
//! Typed error handling for the cobro payment-link service.
//! All record and processor operations return `Result<T, CobroError>`.

use crate::record::PaymentStatus;
use thiserror::Error;

/// Core error type for all payment-link operations
#[derive(Debug, Error)]
pub enum CobroError {
    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data (bad amount, unsupported currency, empty ids)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A record with this order id already exists
    #[error("Duplicate key: record already exists for order {order_id}")]
    DuplicateKey { order_id: String },

    /// Record or processor payment not found
    #[error("Not found: {id}")]
    NotFound { id: String },

    /// Conditional write refused: the stored status does not admit the transition
    #[error("Conflicting state: record is {current}, cannot apply {attempted}")]
    ConflictingState {
        current: PaymentStatus,
        attempted: PaymentStatus,
    },

    /// Notification referenced an order with no record
    #[error("Unknown record: {reference}")]
    UnknownRecord { reference: String },

    /// Webhook payload that could not be decoded
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Processor transport failure (timeout, connection error, 5xx)
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CobroError {
    /// Returns true if retrying the operation could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CobroError::UpstreamUnavailable { .. })
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CobroError::Configuration(_) => 500,
            CobroError::InvalidRequest(_) => 400,
            CobroError::DuplicateKey { .. } => 409,
            CobroError::NotFound { .. } => 404,
            CobroError::ConflictingState { .. } => 409,
            CobroError::UnknownRecord { .. } => 404,
            CobroError::MalformedPayload(_) => 400,
            CobroError::UpstreamUnavailable { .. } => 502,
            CobroError::Serialization(_) => 500,
            CobroError::Internal(_) => 500,
        }
    }
}

/// Result type alias for payment-link operations
pub type CobroResult<T> = Result<T, CobroError>;
