//! Error types for the price prediction service.
//!
//! This module provides a unified error type [`PriceError`] for every stage of the
//! pipeline, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Validation**: a request or dataset row is missing a field or carries a bad value.
//!   Recoverable, reported to the caller with the offending field.
//! - **Schema mismatch**: the encoded vector disagrees with the column layout a model
//!   was trained on. Fatal to the request; indicates training/serving drift.
//! - **Model not found**: unknown version tag or an unreadable artifact. Recoverable
//!   at the request level.
//! - **Monitoring**: telemetry sampling or publishing failed. Never fatal.
//! - **Configuration / IO / Serialization**: ambient failures.
//!
//! # Example
//!
//! ```rust
//! use autoprice::error::{PriceError, Result};
//!
//! fn require_mileage(value: Option<f64>) -> Result<f64> {
//!     value.ok_or_else(|| PriceError::missing_field("mileage"))
//! }
//!
//! let err = require_mileage(None).unwrap_err();
//! assert_eq!(err.status_code(), 400);
//! assert!(err.is_recoverable());
//! ```

use std::io;
use thiserror::Error;

/// Main error type for prediction, encoding and monitoring operations.
#[derive(Error, Debug)]
pub enum PriceError {
    // Request validation errors
    #[error("{reason}: {field}")]
    Validation { field: String, reason: String },

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Request body too large: limit is {limit} bytes")]
    BodyTooLarge { limit: usize },

    // Encoding errors
    #[error("Schema mismatch: expected {expected} columns, got {actual} ({detail})")]
    SchemaMismatch {
        expected: usize,
        actual: usize,
        detail: String,
    },

    // Model resolution errors
    #[error("Model not found: {version}: {reason}")]
    ModelNotFound { version: String, reason: String },

    // Telemetry errors
    #[error("Monitoring error: {0}")]
    Monitoring(String),

    // Evaluation errors
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PriceError {
    /// A required field was absent from the request.
    pub fn missing_field(field: &str) -> Self {
        PriceError::Validation {
            field: field.to_string(),
            reason: "Missing required field".to_string(),
        }
    }

    /// A field was present but its value was unusable.
    pub fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        PriceError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// The model for `version` could not be resolved.
    pub fn model_not_found(version: &str, reason: impl Into<String>) -> Self {
        PriceError::ModelNotFound {
            version: version.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the offending field for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            PriceError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// HTTP status code for the error when surfaced by the prediction service.
    pub fn status_code(&self) -> u16 {
        match self {
            PriceError::Validation { .. } | PriceError::InvalidBody(_) => 400,
            PriceError::ModelNotFound { .. } => 404,
            PriceError::BodyTooLarge { .. } => 413,
            PriceError::SchemaMismatch { .. } => 500,
            PriceError::Network(_) => 503,
            _ => 500,
        }
    }

    /// Errors that are reported back to the caller rather than treated as bugs.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PriceError::Validation { .. }
                | PriceError::InvalidBody(_)
                | PriceError::BodyTooLarge { .. }
                | PriceError::ModelNotFound { .. }
                | PriceError::Monitoring(_)
        )
    }

    /// Errors that must stop the request and be logged at error severity.
    pub fn is_fatal_to_request(&self) -> bool {
        matches!(
            self,
            PriceError::SchemaMismatch { .. } | PriceError::Internal(_)
        )
    }
}

impl From<serde_json::Error> for PriceError {
    fn from(e: serde_json::Error) -> Self {
        PriceError::Serialization(e.to_string())
    }
}

impl From<prometheus::Error> for PriceError {
    fn from(e: prometheus::Error) -> Self {
        PriceError::Monitoring(e.to_string())
    }
}

/// Result type alias for price prediction operations.
pub type Result<T> = std::result::Result<T, PriceError>;
