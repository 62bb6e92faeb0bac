//! autoprice - vehicle price prediction service.
//!
//! Serves versioned linear price models over HTTP, scores them against
//! labelled datasets and exports training and serving metrics for Prometheus.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         autoprice                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serving: /:version/predict | /health | /info | refresh      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Model Registry: versioned artifacts | cache policy          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Features: raw record | one-hot codec | declared schema      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Monitor: Prometheus families | resource sampler | runs      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use autoprice::config::PriceConfig;
//!
//! #[tokio::main]
//! async fn main() -> autoprice::Result<()> {
//!     let config = PriceConfig::development();
//!     autoprice::run(config).await
//! }
//! ```

pub mod config;
pub mod error;

pub mod evaluation;
pub mod features;
pub mod health;
pub mod model;
pub mod serving;
pub mod shutdown;
pub mod tracking;

pub mod cli;
pub mod observability;

// Re-exports
pub use error::{PriceError, Result};

use config::PriceConfig;
use evaluation::{Evaluation, LabeledDataset};
use features::FeatureCodec;
use model::ModelRegistry;
use observability::{ResourceSampler, SysinfoProbe, TrainingMonitor};
use serving::{AppState, PredictionService, ServiceInfo};
use shutdown::{ShutdownCoordinator, SignalHandler};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracking::{FileRunTracker, RunId, RunStatus, RunTracker};

/// Run the prediction service with the given configuration.
///
/// Starts the prediction API, and when monitoring is enabled the metrics
/// endpoint and resource sampler, then blocks until SIGINT or SIGTERM.
pub async fn run(config: PriceConfig) -> Result<()> {
    config.validate()?;
    info!(name = %config.service.name, versions = ?config.registry.versions, "Starting price service");

    let monitor = Arc::new(TrainingMonitor::new()?);
    let registry = Arc::new(ModelRegistry::new(&config.registry));
    let service = PredictionService::new(registry.clone(), FeatureCodec::default(), monitor.clone());

    let loaded = registry.warm_up();
    if loaded < config.registry.versions.len() {
        warn!(
            loaded,
            configured = config.registry.versions.len(),
            "Some model versions are unavailable; requests for them will fail"
        );
    }

    let coordinator = ShutdownCoordinator::new();
    let mut handles = Vec::new();

    let state = AppState::new(
        service,
        ServiceInfo::new(&config.service.name, &config.registry.versions),
        coordinator.clone(),
    );
    let bind_addr = config.service.bind_addr;
    let max_body_bytes = config.service.max_body_bytes;
    let server_coordinator = coordinator.clone();
    handles.push((
        "prediction",
        tokio::spawn(async move {
            let shutdown = async move { server_coordinator.wait_for_shutdown().await };
            if let Err(e) =
                serving::run_prediction_server(bind_addr, state, max_body_bytes, shutdown).await
            {
                error!(error = %e, "Prediction server error");
            }
        }),
    ));

    if config.monitor.enabled {
        handles.extend(spawn_telemetry(&config, monitor.clone(), &coordinator));
    }

    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        SignalHandler::new(signal_coordinator).run().await;
    });

    coordinator.wait_for_shutdown().await;
    info!("Shutting down price service gracefully...");

    coordinator.drain(handles).await;

    info!("Price service shutdown complete");
    Ok(())
}

/// Score a model version against a labelled dataset.
///
/// The result is published on `monitor` and logged as a tracked run with the
/// configured training parameters. A failed evaluation closes its run as
/// failed.
pub fn run_evaluation(
    config: &PriceConfig,
    monitor: &TrainingMonitor,
    version: &str,
    dataset: &Path,
) -> Result<Evaluation> {
    let tracker = FileRunTracker::from_config(&config.tracking);
    let run = tracker.start_run(&format!("evaluate-{}", version))?;

    let outcome = evaluate_in_run(config, monitor, &tracker, run, version, dataset);

    let status = if outcome.is_ok() {
        RunStatus::Finished
    } else {
        RunStatus::Failed
    };
    if let Err(e) = tracker.end_run(run, status) {
        warn!(run_id = %run, error = %e, "Failed to close run");
    }

    outcome
}

fn evaluate_in_run(
    config: &PriceConfig,
    monitor: &TrainingMonitor,
    tracker: &dyn RunTracker,
    run: RunId,
    version: &str,
    dataset: &Path,
) -> Result<Evaluation> {
    let mut params = tracking::params_of(&config.training)?;
    params.insert("model_version".to_string(), serde_json::Value::from(version));
    tracker.log_params(run, &params)?;

    let registry = ModelRegistry::new(&config.registry);
    let artifact = registry.resolve_artifact(version)?;
    let dataset = LabeledDataset::from_json_lines(dataset)?;
    let evaluation = evaluation::evaluate(&artifact, &dataset, &FeatureCodec::default())?;

    tracker.log_metrics(run, &evaluation.report.as_run_metrics())?;
    monitor.record_metrics(
        &evaluation
            .report
            .to_metrics(Some(evaluation.feature_importance.clone())),
    );
    Ok(evaluation)
}

/// Start the metrics endpoint and the resource sampler, both tied to
/// `coordinator`.
///
/// Used by the serving path and by evaluation runs, so resource gauges are
/// live whenever the endpoint is.
pub fn spawn_telemetry(
    config: &PriceConfig,
    monitor: Arc<TrainingMonitor>,
    coordinator: &ShutdownCoordinator,
) -> Vec<(&'static str, JoinHandle<()>)> {
    let mut handles = Vec::new();

    match SysinfoProbe::current_process() {
        Ok(probe) => {
            let sampler = ResourceSampler::new(monitor.clone(), probe, &config.monitor);
            handles.push(("sampler", sampler.spawn(coordinator.subscribe())));
        }
        Err(e) => error!(error = %e, "Resource sampler disabled"),
    }

    let metrics_addr = config.monitor.metrics_addr;
    let metrics_coordinator = coordinator.clone();
    handles.push((
        "metrics",
        tokio::spawn(async move {
            let shutdown = async move { metrics_coordinator.wait_for_shutdown().await };
            if let Err(e) = observability::run_metrics_server(metrics_addr, monitor, shutdown).await
            {
                error!(error = %e, "Metrics server error");
            }
        }),
    ));

    handles
}
