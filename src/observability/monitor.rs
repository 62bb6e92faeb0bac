//! Training monitor: the process's metric surface.
//!
//! One [`TrainingMonitor`] is built by the composition root and handed out as
//! `Arc<TrainingMonitor>` to the prediction service, the resource sampler and
//! the evaluation path. Every metric lives in the monitor's own
//! [`prometheus::Registry`]; nothing is registered globally.
//!
//! Metric writes never fail the caller. A label lookup error is logged and
//! the write is skipped.

use super::histograms::{LatencyTimer, LATENCY_BUCKETS};
use super::sampler::ResourceSample;
use crate::error::{PriceError, Result};
use parking_lot::Mutex;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

/// Number of feature-importance entries kept as labelled gauges.
pub const TOP_FEATURES: usize = 5;

/// Model-quality values to publish. `None` leaves the current gauge untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegressionMetrics {
    pub mse: Option<f64>,
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
    pub r_squared: Option<f64>,
    /// (feature name, importance) pairs; only the top entries by magnitude are kept.
    pub feature_importance: Option<Vec<(String, f64)>>,
}

/// Current values of the regression gauges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionGauges {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r_squared: f64,
}

/// Metric families for requests, predictions, resources and model quality.
pub struct TrainingMonitor {
    registry: Registry,
    requests_total: IntCounterVec,
    prediction_requests_total: IntCounterVec,
    prediction_duration_seconds: HistogramVec,
    memory_usage_bytes: Gauge,
    cpu_usage_percent: Gauge,
    mse: Gauge,
    rmse: Gauge,
    mae: Gauge,
    r_squared: Gauge,
    feature_importance: GaugeVec,
    /// Serializes reset-and-republish of the importance gauges.
    importance_guard: Mutex<()>,
}

impl TrainingMonitor {
    /// Creates a monitor with all families registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Total HTTP requests"),
            &["method", "endpoint"],
        )?;
        let prediction_requests_total = IntCounterVec::new(
            Opts::new("prediction_requests_total", "Total prediction requests"),
            &["model_version"],
        )?;
        let prediction_duration_seconds = HistogramVec::new(
            HistogramOpts::new("prediction_duration_seconds", "Prediction latency in seconds")
                .buckets(LATENCY_BUCKETS.to_vec()),
            &["model_version"],
        )?;
        let memory_usage_bytes = Gauge::new("memory_usage_bytes", "Resident memory in bytes")?;
        let cpu_usage_percent = Gauge::new("cpu_usage_percent", "Process CPU usage percent")?;
        let mse = Gauge::new("regression_mean_squared_error", "Mean squared error")?;
        let rmse = Gauge::new("regression_root_mean_squared_error", "Root mean squared error")?;
        let mae = Gauge::new("regression_mean_absolute_error", "Mean absolute error")?;
        let r_squared = Gauge::new("regression_r_squared", "Coefficient of determination")?;
        let feature_importance = GaugeVec::new(
            Opts::new("feature_importance", "Top feature importances by magnitude"),
            &["feature_name"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(prediction_requests_total.clone()))?;
        registry.register(Box::new(prediction_duration_seconds.clone()))?;
        registry.register(Box::new(memory_usage_bytes.clone()))?;
        registry.register(Box::new(cpu_usage_percent.clone()))?;
        registry.register(Box::new(mse.clone()))?;
        registry.register(Box::new(rmse.clone()))?;
        registry.register(Box::new(mae.clone()))?;
        registry.register(Box::new(r_squared.clone()))?;
        registry.register(Box::new(feature_importance.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            prediction_requests_total,
            prediction_duration_seconds,
            memory_usage_bytes,
            cpu_usage_percent,
            mse,
            rmse,
            mae,
            r_squared,
            feature_importance,
            importance_guard: Mutex::new(()),
        })
    }

    /// The registry backing this monitor.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count one HTTP request.
    pub fn record_request(&self, method: &str, endpoint: &str) {
        match self
            .requests_total
            .get_metric_with_label_values(&[method, endpoint])
        {
            Ok(counter) => counter.inc(),
            Err(e) => warn!(error = %e, method, endpoint, "Dropping request count"),
        }
    }

    /// Count one prediction for a model version.
    pub fn record_prediction(&self, model_version: &str) {
        match self
            .prediction_requests_total
            .get_metric_with_label_values(&[model_version])
        {
            Ok(counter) => counter.inc(),
            Err(e) => warn!(error = %e, model_version, "Dropping prediction count"),
        }
    }

    /// Start a timer that records prediction latency when dropped.
    pub fn prediction_timer(&self, model_version: &str) -> LatencyTimer {
        match self
            .prediction_duration_seconds
            .get_metric_with_label_values(&[model_version])
        {
            Ok(histogram) => LatencyTimer::new(histogram),
            Err(e) => {
                warn!(error = %e, model_version, "Prediction latency will not be recorded");
                LatencyTimer::detached()
            }
        }
    }

    /// Record an already measured prediction latency.
    pub fn observe_prediction_latency(&self, model_version: &str, elapsed: Duration) {
        match self
            .prediction_duration_seconds
            .get_metric_with_label_values(&[model_version])
        {
            Ok(histogram) => histogram.observe(elapsed.as_secs_f64()),
            Err(e) => warn!(error = %e, model_version, "Dropping latency observation"),
        }
    }

    /// Publish a resource sample.
    pub fn set_resource_usage(&self, sample: ResourceSample) {
        self.memory_usage_bytes.set(sample.memory_bytes as f64);
        self.cpu_usage_percent.set(sample.cpu_percent);
    }

    /// Last published resource sample.
    pub fn resource_usage(&self) -> ResourceSample {
        ResourceSample {
            memory_bytes: self.memory_usage_bytes.get() as u64,
            cpu_percent: self.cpu_usage_percent.get(),
        }
    }

    /// Publish model-quality metrics. Absent values keep their previous gauge value.
    pub fn record_metrics(&self, metrics: &RegressionMetrics) {
        let gauges = [
            (&self.mse, metrics.mse),
            (&self.rmse, metrics.rmse),
            (&self.mae, metrics.mae),
            (&self.r_squared, metrics.r_squared),
        ];
        for (gauge, value) in gauges {
            if let Some(value) = value {
                gauge.set(value);
            }
        }

        if let Some(importance) = &metrics.feature_importance {
            let top = top_features(importance, TOP_FEATURES);
            let _guard = self.importance_guard.lock();
            self.feature_importance.reset();
            for (name, value) in &top {
                match self
                    .feature_importance
                    .get_metric_with_label_values(&[name.as_str()])
                {
                    Ok(gauge) => gauge.set(*value),
                    Err(e) => warn!(error = %e, feature = %name, "Dropping feature importance"),
                }
            }
            debug!(kept = top.len(), total = importance.len(), "Published feature importance");
        }
    }

    /// Current regression gauge values.
    pub fn regression_gauges(&self) -> RegressionGauges {
        RegressionGauges {
            mse: self.mse.get(),
            rmse: self.rmse.get(),
            mae: self.mae.get(),
            r_squared: self.r_squared.get(),
        }
    }

    /// Published feature-importance gauges, sorted by name.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut published = Vec::new();
        for family in self.feature_importance.collect() {
            for metric in family.get_metric() {
                let name = metric
                    .get_label()
                    .iter()
                    .find(|label| label.get_name() == "feature_name")
                    .map(|label| label.get_value().to_string());
                if let Some(name) = name {
                    published.push((name, metric.get_gauge().get_value()));
                }
            }
        }
        published.sort_by(|a, b| a.0.cmp(&b.0));
        published
    }

    /// Prometheus text exposition of every family.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| PriceError::Monitoring(e.to_string()))
    }
}

/// Keep the `n` entries with the largest magnitude. Ties go to the lower name.
fn top_features(importance: &[(String, f64)], n: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<&(String, f64)> = importance
        .iter()
        .filter(|(name, value)| {
            if value.is_finite() {
                true
            } else {
                warn!(feature = %name, "Skipping non-finite feature importance");
                false
            }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.into_iter().take(n).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn importance(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }

    #[test]
    fn test_monitors_are_independent() {
        let a = TrainingMonitor::new().unwrap();
        let b = TrainingMonitor::new().unwrap();
        a.record_metrics(&RegressionMetrics {
            mse: Some(1.0),
            ..Default::default()
        });
        assert_eq!(a.regression_gauges().mse, 1.0);
        assert_eq!(b.regression_gauges().mse, 0.0);
    }

    #[test]
    fn test_partial_update_keeps_prior_values() {
        let monitor = TrainingMonitor::new().unwrap();
        monitor.record_metrics(&RegressionMetrics {
            mse: Some(10.0),
            rmse: Some(3.0),
            mae: Some(2.0),
            r_squared: Some(0.8),
            feature_importance: None,
        });
        monitor.record_metrics(&RegressionMetrics {
            mse: Some(1234.5),
            ..Default::default()
        });

        let gauges = monitor.regression_gauges();
        assert_eq!(gauges.mse, 1234.5);
        assert_eq!(gauges.rmse, 3.0);
        assert_eq!(gauges.mae, 2.0);
        assert_eq!(gauges.r_squared, 0.8);
    }

    #[test]
    fn test_feature_importance_top_five() {
        let monitor = TrainingMonitor::new().unwrap();
        monitor.record_metrics(&RegressionMetrics {
            feature_importance: Some(importance(&[
                ("mileage", -0.2),
                ("msrp", 0.9),
                ("model_year", 500.0),
                ("make_Volvo", -1200.0),
                ("make_Kia", 30.0),
                ("make_Audi", 4.0),
                ("stock_type_USED", -3000.0),
            ])),
            ..Default::default()
        });

        let published = monitor.feature_importance();
        let names: Vec<&str> = published.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["make_Audi", "make_Kia", "make_Volvo", "model_year", "stock_type_USED"]
        );
    }

    #[test]
    fn test_feature_importance_replaces_previous_labels() {
        let monitor = TrainingMonitor::new().unwrap();
        monitor.record_metrics(&RegressionMetrics {
            feature_importance: Some(importance(&[("make_Volvo", 1.0)])),
            ..Default::default()
        });
        monitor.record_metrics(&RegressionMetrics {
            feature_importance: Some(importance(&[("msrp", 2.0)])),
            ..Default::default()
        });
        assert_eq!(monitor.feature_importance(), importance(&[("msrp", 2.0)]));
    }

    #[test]
    fn test_top_features_tie_break_and_non_finite() {
        let top = top_features(
            &importance(&[("b", 1.0), ("a", -1.0), ("c", f64::NAN), ("d", 0.5)]),
            2,
        );
        assert_eq!(top, importance(&[("a", -1.0), ("b", 1.0)]));
    }

    #[test]
    fn test_render_contains_families() {
        let monitor = TrainingMonitor::new().unwrap();
        monitor.record_request("POST", "/:version/predict");
        monitor.record_prediction("v1");
        monitor.observe_prediction_latency("v1", Duration::from_millis(3));
        monitor.set_resource_usage(ResourceSample {
            memory_bytes: 4096,
            cpu_percent: 12.5,
        });

        let text = monitor.render().unwrap();
        assert!(text.contains(r#"requests_total{endpoint="/:version/predict",method="POST"} 1"#));
        assert!(text.contains(r#"prediction_requests_total{model_version="v1"} 1"#));
        assert!(text.contains(r#"prediction_duration_seconds_count{model_version="v1"} 1"#));
        assert!(text.contains("memory_usage_bytes 4096"));
        assert!(text.contains("cpu_usage_percent 12.5"));
    }

    #[test]
    fn test_prediction_timer_records() {
        let monitor = TrainingMonitor::new().unwrap();
        drop(monitor.prediction_timer("v2"));
        let text = monitor.render().unwrap();
        assert!(text.contains(r#"prediction_duration_seconds_count{model_version="v2"} 1"#));
    }

    #[test]
    fn test_concurrent_writers_on_distinct_gauges() {
        let monitor = Arc::new(TrainingMonitor::new().unwrap());
        let sampler = {
            let monitor = monitor.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    monitor.set_resource_usage(ResourceSample {
                        memory_bytes: i,
                        cpu_percent: 50.0,
                    });
                }
            })
        };
        let handler = {
            let monitor = monitor.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    monitor.record_prediction("v1");
                    monitor.record_metrics(&RegressionMetrics {
                        mse: Some(42.0),
                        ..Default::default()
                    });
                }
            })
        };
        sampler.join().unwrap();
        handler.join().unwrap();

        let text = monitor.render().unwrap();
        assert!(text.contains("memory_usage_bytes 999"));
        assert!(text.contains("cpu_usage_percent 50"));
        assert!(text.contains(r#"prediction_requests_total{model_version="v1"} 1000"#));
        assert_eq!(monitor.regression_gauges().mse, 42.0);
    }
}
