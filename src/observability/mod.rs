//! Observability for the price service.
//!
//! Provides logging setup, the training monitor (metric families and the
//! Prometheus registry), the background resource sampler and the metrics
//! endpoint.

pub mod histograms;
pub mod monitor;
pub mod sampler;
pub mod server;

pub use self::histograms::{LatencyTimer, LATENCY_BUCKETS};
pub use self::monitor::{RegressionGauges, RegressionMetrics, TrainingMonitor, TOP_FEATURES};
pub use self::sampler::{ResourceProbe, ResourceSample, ResourceSampler, SysinfoProbe};
pub use self::server::{metrics_router, run_metrics_server};

use crate::config::ObservabilityConfig;
use crate::error::{PriceError, Result};
use ::tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| PriceError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| PriceError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!(level = %config.log_level, json = config.json_logs, "Logging initialized");
    Ok(())
}
