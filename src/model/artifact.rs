// Persisted model artifacts and the predictor capability

use crate::error::{PriceError, Result};
use crate::features::{EncodedVector, Schema};
use crate::tracking::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A fitted model able to price an encoded vector.
pub trait Predictor: Send + Sync + fmt::Debug {
    /// Column layout the model was fit against.
    fn schema(&self) -> &Schema;

    /// Price estimate for one encoded vector.
    fn predict(&self, vector: &EncodedVector) -> Result<f64>;
}

/// Linear model weights (the persisted form of a fitted ridge regression)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    /// One weight per schema column, same order
    pub coefficients: Vec<f64>,
    /// Intercept term
    pub intercept: f64,
}

/// Model artifact as stored on disk, one per version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Version tag (v1, v2, ...)
    pub version: String,
    /// Training run that produced the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Columns the model was fit against
    pub schema: Schema,
    /// Fitted weights
    pub model: LinearModel,
}

impl ModelArtifact {
    /// Creates a validated artifact
    pub fn new(version: impl Into<String>, schema: Schema, model: LinearModel) -> Result<Self> {
        let artifact = Self {
            version: version.into(),
            run_id: None,
            created_at: Utc::now(),
            schema,
            model,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Tags the artifact with the run that produced it
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Checks weights against the schema
    pub fn validate(&self) -> Result<()> {
        if self.model.coefficients.len() != self.schema.len() {
            return Err(PriceError::SchemaMismatch {
                expected: self.schema.len(),
                actual: self.model.coefficients.len(),
                detail: format!("artifact {} has one coefficient per column", self.version),
            });
        }

        if !self.model.intercept.is_finite()
            || self.model.coefficients.iter().any(|c| !c.is_finite())
        {
            return Err(PriceError::Serialization(format!(
                "artifact {} carries non-finite weights",
                self.version
            )));
        }

        Ok(())
    }

    /// Reads and validates an artifact file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&content)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Writes the artifact, replacing any previous file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Column weights as (column, coefficient) pairs
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        self.schema
            .columns()
            .iter()
            .cloned()
            .zip(self.model.coefficients.iter().copied())
            .collect()
    }
}

impl Predictor for ModelArtifact {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn predict(&self, vector: &EncodedVector) -> Result<f64> {
        if vector.columns() != self.schema.columns() {
            return Err(PriceError::SchemaMismatch {
                expected: self.schema.len(),
                actual: vector.len(),
                detail: format!("vector layout differs from model {} schema", self.version),
            });
        }

        let dot: f64 = vector
            .values()
            .iter()
            .zip(&self.model.coefficients)
            .map(|(x, w)| x * w)
            .sum();

        Ok(dot + self.model.intercept)
    }
}
