//! Model evaluation against a labelled hold-out set.

use crate::error::{PriceError, Result};
use crate::features::{FeatureCodec, FeatureRecord};
use crate::model::{ModelArtifact, Predictor};
use crate::observability::RegressionMetrics;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Field holding the target price in dataset rows.
pub const PRICE_FIELD: &str = "price";

/// Regression error scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionReport {
    pub samples: usize,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r_squared: f64,
}

impl RegressionReport {
    /// Score `predicted` against `actual`.
    ///
    /// For a constant target R² is 1.0 when every prediction is exact and 0.0
    /// otherwise.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        if actual.is_empty() {
            return Err(PriceError::Evaluation("no samples to score".to_string()));
        }
        if actual.len() != predicted.len() {
            return Err(PriceError::Evaluation(format!(
                "{} targets but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }

        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        let mut abs_err = 0.0;
        for (y, y_hat) in actual.iter().zip(predicted) {
            let residual = y - y_hat;
            ss_res += residual * residual;
            abs_err += residual.abs();
            ss_tot += (y - mean) * (y - mean);
        }

        let mse = ss_res / n;
        let r_squared = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self {
            samples: actual.len(),
            mse,
            rmse: mse.sqrt(),
            mae: abs_err / n,
            r_squared,
        })
    }

    /// Scores as a monitor update.
    pub fn to_metrics(&self, feature_importance: Option<Vec<(String, f64)>>) -> RegressionMetrics {
        RegressionMetrics {
            mse: Some(self.mse),
            rmse: Some(self.rmse),
            mae: Some(self.mae),
            r_squared: Some(self.r_squared),
            feature_importance,
        }
    }

    /// Scores keyed by name, as logged to a run.
    pub fn as_run_metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("mse".to_string(), self.mse),
            ("rmse".to_string(), self.rmse),
            ("mae".to_string(), self.mae),
            ("r2_score".to_string(), self.r_squared),
        ])
    }
}

/// Feature records paired with their observed prices.
#[derive(Debug, Clone, Default)]
pub struct LabeledDataset {
    records: Vec<FeatureRecord>,
    prices: Vec<f64>,
}

impl LabeledDataset {
    pub fn new(records: Vec<FeatureRecord>, prices: Vec<f64>) -> Result<Self> {
        if records.len() != prices.len() {
            return Err(PriceError::Evaluation(format!(
                "{} records but {} prices",
                records.len(),
                prices.len()
            )));
        }
        Ok(Self { records, prices })
    }

    /// Load a JSON-lines file: one object per line with the six feature
    /// fields and `price`. Blank lines are skipped.
    pub fn from_json_lines(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let dataset = Self::parse_json_lines(&content)?;
        info!(path = %path.display(), rows = dataset.len(), "Loaded labelled dataset");
        Ok(dataset)
    }

    /// Parse JSON-lines content. Rows go through the request validator.
    pub fn parse_json_lines(content: &str) -> Result<Self> {
        let mut records = Vec::new();
        let mut prices = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = index + 1;
            let row_error = |e: PriceError| PriceError::Evaluation(format!("line {}: {}", line_no, e));

            let value: Value = serde_json::from_str(line).map_err(|e| row_error(e.into()))?;
            let object = value.as_object().ok_or_else(|| {
                row_error(PriceError::InvalidBody("row is not a JSON object".to_string()))
            })?;

            let record = FeatureRecord::from_fields(object).map_err(row_error)?;
            let price = match object.get(PRICE_FIELD) {
                Some(Value::Number(n)) => n.as_f64().filter(|p| p.is_finite()).ok_or_else(|| {
                    row_error(PriceError::invalid_field(PRICE_FIELD, "Must be a finite number"))
                })?,
                Some(Value::Null) | None => {
                    return Err(row_error(PriceError::missing_field(PRICE_FIELD)))
                }
                Some(_) => {
                    return Err(row_error(PriceError::invalid_field(
                        PRICE_FIELD,
                        "Must be a number",
                    )))
                }
            };

            records.push(record);
            prices.push(price);
        }

        Self::new(records, prices)
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of scoring one model version.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub version: String,
    pub report: RegressionReport,
    /// Coefficients by column, largest magnitude first.
    pub feature_importance: Vec<(String, f64)>,
}

/// Batch-encode `dataset` against the artifact's schema, predict and score.
pub fn evaluate(
    artifact: &ModelArtifact,
    dataset: &LabeledDataset,
    codec: &FeatureCodec,
) -> Result<Evaluation> {
    let vectors = codec.encode_batch(dataset.records(), artifact.schema())?;
    let predicted = vectors
        .iter()
        .map(|vector| artifact.predict(vector))
        .collect::<Result<Vec<f64>>>()?;

    let report = RegressionReport::compute(dataset.prices(), &predicted)?;
    debug!(version = %artifact.version, samples = report.samples, "Scored dataset");

    let mut feature_importance = artifact.feature_importance();
    feature_importance.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    info!(
        version = %artifact.version,
        mse = report.mse,
        rmse = report.rmse,
        mae = report.mae,
        r_squared = report.r_squared,
        "Model evaluated"
    );

    Ok(Evaluation {
        version: artifact.version.clone(),
        report,
        feature_importance,
    })
}
