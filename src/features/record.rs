//! Raw vehicle feature records and their validation.

use super::schema::{CategoricalSpec, MAKE, STOCK_TYPE, TRANSMISSION};
use crate::error::{PriceError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field names, in the order requests are validated.
pub mod fields {
    pub const STOCK_TYPE: &str = "stock_type";
    pub const MILEAGE: &str = "mileage";
    pub const MSRP: &str = "msrp";
    pub const MODEL_YEAR: &str = "model_year";
    pub const MAKE: &str = "make";
    pub const TRANSMISSION_FROM_VIN: &str = "transmission_from_vin";

    /// Every field a record must carry.
    pub const REQUIRED: [&str; 6] = [
        STOCK_TYPE,
        MILEAGE,
        MSRP,
        MODEL_YEAR,
        MAKE,
        TRANSMISSION_FROM_VIN,
    ];
}

/// Manufacturer names the models were trained against.
pub const MAKE_VOCABULARY: [&str; 41] = [
    "Acura",
    "Alfa Romeo",
    "Audi",
    "BMW",
    "Buick",
    "Cadillac",
    "Chevrolet",
    "Chrysler",
    "Dodge",
    "Fiat",
    "Ford",
    "GMC",
    "Genesis",
    "Honda",
    "Hyundai",
    "Infiniti",
    "Jaguar",
    "Jeep",
    "Kia",
    "Land Rover",
    "Lexus",
    "Lincoln",
    "Maserati",
    "Mazda",
    "Mercedes-Benz",
    "Mini",
    "Mitsubishi",
    "Nissan",
    "Polestar",
    "Pontiac",
    "Porsche",
    "Ram",
    "Rivian",
    "Scion",
    "Smart",
    "Subaru",
    "Suzuki",
    "Tesla",
    "Toyota",
    "Volkswagen",
    "Volvo",
];

/// Whether the vehicle is sold new or used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StockType {
    New,
    Used,
}

impl StockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockType::New => "NEW",
            StockType::Used => "USED",
        }
    }

    /// Parse a raw value through the declared mapping table.
    pub fn parse(raw: &str) -> Option<Self> {
        match STOCK_TYPE.canonical_level(raw)? {
            "NEW" => Some(StockType::New),
            "USED" => Some(StockType::Used),
            _ => None,
        }
    }
}

/// Transmission decoded from the VIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Transmission {
    #[serde(rename = "A")]
    Automatic,
    #[serde(rename = "M")]
    Manual,
}

impl Transmission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transmission::Automatic => "A",
            Transmission::Manual => "M",
        }
    }

    /// Parse a raw value, folding the legacy VIN codes `6` and `7`.
    pub fn parse(raw: &str) -> Option<Self> {
        match TRANSMISSION.canonical_level(raw)? {
            "A" => Some(Transmission::Automatic),
            "M" => Some(Transmission::Manual),
            _ => None,
        }
    }
}

/// Manufacturer name. Not restricted to the vocabulary: unknown makes are
/// accepted and encode as an all-zero indicator block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Make(String);

impl Make {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the make appears in the trained vocabulary.
    pub fn is_known(&self) -> bool {
        MAKE.canonical_level(&self.0).is_some()
    }
}

impl fmt::Display for Make {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fully validated vehicle description.
///
/// Deserializing goes through [`FeatureRecord::from_fields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct FeatureRecord {
    pub stock_type: StockType,
    pub mileage: f64,
    pub msrp: u64,
    pub model_year: u16,
    pub make: Make,
    pub transmission_from_vin: Transmission,
}

impl FeatureRecord {
    /// Validate a loosely typed JSON object into a record.
    ///
    /// Fields are checked in [`fields::REQUIRED`] order and the first missing or
    /// malformed one is reported. `null` counts as missing.
    pub fn from_fields(object: &Map<String, Value>) -> Result<Self> {
        let stock_type = {
            let raw = require_str(object, fields::STOCK_TYPE)?;
            StockType::parse(raw).ok_or_else(|| {
                PriceError::invalid_field(fields::STOCK_TYPE, "Must be USED or NEW")
            })?
        };

        let mileage = {
            let value = require_number(object, fields::MILEAGE)?;
            if !value.is_finite() || value < 0.0 {
                return Err(PriceError::invalid_field(
                    fields::MILEAGE,
                    "Must be a non-negative number",
                ));
            }
            value
        };

        let msrp = {
            let value = require_integer(object, fields::MSRP)?;
            if value == 0 {
                return Err(PriceError::invalid_field(fields::MSRP, "Must be positive"));
            }
            value
        };

        let model_year = {
            let value = require_integer(object, fields::MODEL_YEAR)?;
            if !(1000..=9999).contains(&value) {
                return Err(PriceError::invalid_field(
                    fields::MODEL_YEAR,
                    "Must be a four digit year",
                ));
            }
            value as u16
        };

        let make = {
            let raw = require_str(object, fields::MAKE)?.trim();
            if raw.is_empty() {
                return Err(PriceError::invalid_field(fields::MAKE, "Must not be empty"));
            }
            Make::new(raw)
        };

        let transmission_from_vin = {
            let raw = match present(object, fields::TRANSMISSION_FROM_VIN)? {
                Value::String(s) => s.clone(),
                // Legacy feeds carry the VIN codes as bare numbers.
                Value::Number(n) => number_code(n),
                _ => {
                    return Err(PriceError::invalid_field(
                        fields::TRANSMISSION_FROM_VIN,
                        "Must be a string",
                    ))
                }
            };
            Transmission::parse(&raw).ok_or_else(|| {
                PriceError::invalid_field(fields::TRANSMISSION_FROM_VIN, "Must be A or M")
            })?
        };

        Ok(Self {
            stock_type,
            mileage,
            msrp,
            model_year,
            make,
            transmission_from_vin,
        })
    }

    /// Value of a numeric column, if the record has one by that name.
    pub fn numeric(&self, column: &str) -> Option<f64> {
        match column {
            fields::MILEAGE => Some(self.mileage),
            fields::MODEL_YEAR => Some(f64::from(self.model_year)),
            fields::MSRP => Some(self.msrp as f64),
            _ => None,
        }
    }

    /// Level of a categorical field, if the record has one by that name.
    pub fn level(&self, field: &str) -> Option<&str> {
        match field {
            fields::STOCK_TYPE => Some(self.stock_type.as_str()),
            fields::TRANSMISSION_FROM_VIN => Some(self.transmission_from_vin.as_str()),
            fields::MAKE => Some(self.make.as_str()),
            _ => None,
        }
    }

    /// Level of the field described by `spec`.
    pub(crate) fn level_for(&self, spec: &CategoricalSpec) -> Option<&str> {
        self.level(spec.field)
    }
}

impl TryFrom<Map<String, Value>> for FeatureRecord {
    type Error = PriceError;

    fn try_from(object: Map<String, Value>) -> Result<Self> {
        Self::from_fields(&object)
    }
}

/// Render a numeric code as written in the mapping table: `6.0` reads as `6`.
fn number_code(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.as_u64().is_none() && f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

fn present<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a Value> {
    match object.get(field) {
        None | Some(Value::Null) => Err(PriceError::missing_field(field)),
        Some(value) => Ok(value),
    }
}

fn require_str<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    present(object, field)?
        .as_str()
        .ok_or_else(|| PriceError::invalid_field(field, "Must be a string"))
}

fn require_number(object: &Map<String, Value>, field: &str) -> Result<f64> {
    present(object, field)?
        .as_f64()
        .ok_or_else(|| PriceError::invalid_field(field, "Must be a number"))
}

fn require_integer(object: &Map<String, Value>, field: &str) -> Result<u64> {
    let value = present(object, field)?;
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Ok(f as u64)
        }
        _ => Err(PriceError::invalid_field(
            field,
            "Must be a non-negative whole number",
        )),
    }
}
