//! Static service metadata for `GET /info`.

use crate::features::fields;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Service description returned by `GET /info`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
    pub input_format: BTreeMap<String, String>,
    pub example_request: Value,
    pub example_response: Value,
}

impl ServiceInfo {
    /// Describe a service exposing `versions`.
    pub fn new(name: &str, versions: &[String]) -> Self {
        let mut endpoints = BTreeMap::from([
            ("/info".to_string(), "Service metadata".to_string()),
            (
                "/health".to_string(),
                "Indicates if the API is available and ready".to_string(),
            ),
            (
                "/models/{version}/refresh".to_string(),
                "Drops the cached model so the next request reloads it".to_string(),
            ),
        ]);
        for version in versions {
            endpoints.insert(
                format!("/{}/predict", version),
                format!("Predicts a price with model {}", version),
            );
        }

        let input_format = BTreeMap::from([
            (
                fields::STOCK_TYPE.to_string(),
                "String, either USED or NEW".to_string(),
            ),
            (
                fields::MILEAGE.to_string(),
                "Non-negative number".to_string(),
            ),
            (
                fields::MSRP.to_string(),
                "Positive whole number".to_string(),
            ),
            (
                fields::MODEL_YEAR.to_string(),
                "Four digit year".to_string(),
            ),
            (
                fields::MAKE.to_string(),
                "Manufacturer name, e.g. Volvo; unknown makes are accepted".to_string(),
            ),
            (
                fields::TRANSMISSION_FROM_VIN.to_string(),
                "A for automatic or M for manual (legacy codes 7 and 6 accepted)".to_string(),
            ),
        ]);

        Self {
            name: name.to_string(),
            description: "Predicts a reasonable price for a vehicle from its features".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            endpoints,
            input_format,
            example_request: json!({
                "stock_type": "USED",
                "mileage": 543.0,
                "msrp": 20000,
                "model_year": 2023,
                "make": "Volvo",
                "transmission_from_vin": "M"
            }),
            example_response: json!({
                "success": true,
                "price_predicted": 45340.0
            }),
        }
    }
}
