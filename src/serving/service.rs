//! Prediction service: validate, resolve, encode, predict.

use super::request::{parse_predict_body, RequestStage};
use crate::error::{PriceError, Result};
use crate::features::{EncodedVector, FeatureCodec, FeatureRecord};
use crate::model::ModelRegistry;
use crate::observability::TrainingMonitor;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Wraps the codec, the registry and the monitor behind one predict call.
#[derive(Clone)]
pub struct PredictionService {
    registry: Arc<ModelRegistry>,
    codec: FeatureCodec,
    monitor: Arc<TrainingMonitor>,
}

impl PredictionService {
    pub fn new(
        registry: Arc<ModelRegistry>,
        codec: FeatureCodec,
        monitor: Arc<TrainingMonitor>,
    ) -> Self {
        Self {
            registry,
            codec,
            monitor,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<TrainingMonitor> {
        &self.monitor
    }

    /// Handle one raw prediction request for `version`.
    ///
    /// The version tag and the body are checked before anything touches the
    /// codec or a model. Model work runs on the blocking pool.
    pub async fn predict(&self, version: &str, body: &[u8]) -> Result<f64> {
        debug!(version, stage = %RequestStage::Received, "Prediction request");

        if !self.registry.is_known(version) {
            return Err(self.errored(
                version,
                RequestStage::Received,
                PriceError::model_not_found(version, "unknown version"),
            ));
        }

        let record = parse_predict_body(body)
            .map_err(|e| self.errored(version, RequestStage::Received, e))?;
        debug!(version, stage = %RequestStage::Validated, make = %record.make, "Request validated");

        self.monitor.record_prediction(version);
        let timer = self.monitor.prediction_timer(version);

        let service = self.clone();
        let owned_version = version.to_string();
        let outcome = tokio::task::spawn_blocking(move || {
            service.predict_record(&owned_version, &record)
        })
        .await
        .map_err(|e| PriceError::Internal(format!("prediction task failed: {}", e)))
        .and_then(|result| result);

        let elapsed = timer.record();
        match outcome {
            Ok(price) => {
                debug!(
                    version,
                    stage = %RequestStage::Responded,
                    price,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "Prediction served"
                );
                Ok(price)
            }
            Err(e) => Err(self.errored(version, RequestStage::Validated, e)),
        }
    }

    /// Resolve, encode and predict synchronously.
    pub fn predict_record(&self, version: &str, record: &FeatureRecord) -> Result<f64> {
        let model = self.registry.resolve(version)?;
        let vector = self.codec.encode(record, &model.schema)?;
        debug!(version, stage = %RequestStage::Encoded, columns = vector.len(), "Record encoded");

        let price = model.predictor.predict(&vector)?;
        debug!(version, stage = %RequestStage::Predicted, "Model evaluated");

        if !price.is_finite() {
            return Err(PriceError::Internal(format!(
                "model {} produced a non-finite price",
                version
            )));
        }
        Ok(price)
    }

    /// Encode a record against the schema of `version`.
    pub fn encode_for(&self, version: &str, record: &FeatureRecord) -> Result<EncodedVector> {
        let model = self.registry.resolve(version)?;
        self.codec.encode(record, &model.schema)
    }

    fn errored(&self, version: &str, reached: RequestStage, err: PriceError) -> PriceError {
        if err.is_fatal_to_request() {
            error!(version, reached = %reached, stage = %RequestStage::Errored, error = %err, "Prediction failed");
        } else {
            warn!(version, reached = %reached, stage = %RequestStage::Errored, error = %err, "Prediction rejected");
        }
        err
    }
}
