//! Prediction request parsing and response payloads.

use crate::error::{PriceError, Result};
use crate::features::FeatureRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle of one prediction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Validated,
    Encoded,
    Predicted,
    Responded,
    Errored,
}

impl RequestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStage::Received => "received",
            RequestStage::Validated => "validated",
            RequestStage::Encoded => "encoded",
            RequestStage::Predicted => "predicted",
            RequestStage::Responded => "responded",
            RequestStage::Errored => "errored",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStage::Responded | RequestStage::Errored)
    }

    /// The stage reached on success, or `None` from a terminal stage.
    pub fn next(&self) -> Option<RequestStage> {
        match self {
            RequestStage::Received => Some(RequestStage::Validated),
            RequestStage::Validated => Some(RequestStage::Encoded),
            RequestStage::Encoded => Some(RequestStage::Predicted),
            RequestStage::Predicted => Some(RequestStage::Responded),
            RequestStage::Responded | RequestStage::Errored => None,
        }
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a raw request body into a validated record.
///
/// The body must be a JSON object; field checks are those of
/// [`FeatureRecord::from_fields`].
pub fn parse_predict_body(body: &[u8]) -> Result<FeatureRecord> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(PriceError::InvalidBody("Request body is empty".to_string()));
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PriceError::InvalidBody(format!("Request body is not valid JSON: {}", e)))?;

    match value {
        Value::Object(object) => FeatureRecord::from_fields(&object),
        _ => Err(PriceError::InvalidBody(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

/// Successful prediction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub success: bool,
    pub price_predicted: f64,
}

impl PredictResponse {
    pub fn new(price: f64) -> Self {
        Self {
            success: true,
            price_predicted: price,
        }
    }
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&PriceError> for ErrorResponse {
    fn from(err: &PriceError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}
