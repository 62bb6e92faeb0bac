//! Common test utilities for integration tests.

use autoprice::config::{CachePolicy, PriceConfig};
use autoprice::features::{FeatureLayout, Schema};
use autoprice::model::{FsArtifactStore, LinearModel, ModelArtifact};
use autoprice::observability::TrainingMonitor;
use autoprice::serving::{AppState, PredictionService, ServiceInfo};
use autoprice::shutdown::ShutdownCoordinator;
use autoprice::{features::FeatureCodec, model::ModelRegistry};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const MSRP_WEIGHT: f64 = 0.9;
pub const VOLVO_WEIGHT: f64 = 500.0;
pub const USED_WEIGHT: f64 = -2000.0;
pub const INTERCEPT: f64 = 1000.0;

/// Test environment with a model directory holding a published `v1`.
///
/// `v2` is configured but has no artifact.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config: PriceConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = PriceConfig::development();
        config.registry.model_dir = temp_dir.path().join("models");
        config.registry.cache = CachePolicy::Manual;
        config.tracking.runs_dir = temp_dir.path().join("runs");

        let env = Self { temp_dir, config };
        env.publish(&sample_artifact("v1"));
        env
    }

    pub fn store(&self) -> FsArtifactStore {
        FsArtifactStore::from_config(&self.config.registry)
    }

    pub fn publish(&self, artifact: &ModelArtifact) -> PathBuf {
        self.store()
            .publish(artifact)
            .expect("Failed to publish artifact")
    }

    /// Write `rows` as a JSON-lines dataset and return its path.
    pub fn dataset(&self, rows: &[Value]) -> PathBuf {
        let path = self.temp_dir.path().join("test.jsonl");
        let content: Vec<String> = rows.iter().map(Value::to_string).collect();
        std::fs::write(&path, content.join("\n")).expect("Failed to write dataset");
        path
    }

    pub fn monitor(&self) -> Arc<TrainingMonitor> {
        Arc::new(TrainingMonitor::new().expect("Failed to create monitor"))
    }

    pub fn state(&self, monitor: Arc<TrainingMonitor>) -> AppState {
        let registry = Arc::new(ModelRegistry::new(&self.config.registry));
        let service = PredictionService::new(registry, FeatureCodec::default(), monitor);
        AppState::new(
            service,
            ServiceInfo::new(&self.config.service.name, &self.config.registry.versions),
            ShutdownCoordinator::new(),
        )
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Model over the canonical schema weighting msrp, the Volvo indicator and
/// the USED indicator.
pub fn sample_artifact(version: &str) -> ModelArtifact {
    let schema: Schema = FeatureLayout::standard().canonical_schema();
    let mut coefficients = vec![0.0; schema.len()];
    coefficients[schema.position("msrp").expect("msrp column")] = MSRP_WEIGHT;
    coefficients[schema.position("make_Volvo").expect("Volvo column")] = VOLVO_WEIGHT;
    coefficients[schema.position("stock_type_USED").expect("USED column")] = USED_WEIGHT;

    ModelArtifact::new(
        version,
        schema,
        LinearModel {
            coefficients,
            intercept: INTERCEPT,
        },
    )
    .expect("Failed to build artifact")
}

/// Price `sample_artifact` assigns to a record.
pub fn expected_price(msrp: f64, volvo: bool, used: bool) -> f64 {
    let mut price = INTERCEPT + MSRP_WEIGHT * msrp;
    if volvo {
        price += VOLVO_WEIGHT;
    }
    if used {
        price += USED_WEIGHT;
    }
    price
}

/// The documented example request.
pub fn volvo_request() -> Value {
    json!({
        "stock_type": "USED",
        "mileage": 543.0,
        "msrp": 20000,
        "model_year": 2023,
        "make": "Volvo",
        "transmission_from_vin": "M"
    })
}
