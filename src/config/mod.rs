//! Configuration module for the price prediction service.

use crate::error::{PriceError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a prediction node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Prediction HTTP service configuration.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Model registry configuration.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Training monitor configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Black-box model hyperparameters, recorded with each run.
    #[serde(default)]
    pub training: TrainingParams,
    /// Run tracker configuration.
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl PriceConfig {
    /// Load configuration from a file.
    ///
    /// Relative paths inside the file are resolved against `project_root`
    /// when given, otherwise against the directory holding the file.
    pub fn from_file(path: &Path, project_root: Option<&Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PriceError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| PriceError::Config(format!("Failed to parse config: {}", e)))?;

        let root = match project_root {
            Some(root) => root.to_path_buf(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        config.resolve_paths(&root);

        config.validate()?;
        Ok(config)
    }

    /// Make every relative filesystem path absolute against `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        resolve_against(&mut self.registry.model_dir, root);
        resolve_against(&mut self.training.data_directory, root);
        resolve_against(&mut self.tracking.runs_dir, root);
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.registry.versions.is_empty() {
            return Err(PriceError::InvalidConfig {
                field: "registry.versions".to_string(),
                reason: "At least one model version must be configured".to_string(),
            });
        }

        for version in &self.registry.versions {
            if !is_version_tag(version) {
                return Err(PriceError::InvalidConfig {
                    field: "registry.versions".to_string(),
                    reason: format!("Version tag '{}' must look like v<N>", version),
                });
            }
        }

        if let CachePolicy::Ttl { ttl } = self.registry.cache {
            if ttl.is_zero() {
                return Err(PriceError::InvalidConfig {
                    field: "registry.cache.ttl".to_string(),
                    reason: "TTL must be non-zero".to_string(),
                });
            }
        }

        if self.monitor.sample_interval.is_zero() {
            return Err(PriceError::InvalidConfig {
                field: "monitor.sample_interval".to_string(),
                reason: "Sample interval must be non-zero".to_string(),
            });
        }

        if self.monitor.error_backoff < self.monitor.sample_interval {
            return Err(PriceError::InvalidConfig {
                field: "monitor.error_backoff".to_string(),
                reason: "Error backoff must not be shorter than the sample interval".to_string(),
            });
        }

        if self.monitor.enabled && self.monitor.metrics_addr == self.service.bind_addr {
            return Err(PriceError::InvalidConfig {
                field: "monitor.metrics_addr".to_string(),
                reason: "Metrics endpoint must use its own port".to_string(),
            });
        }

        Ok(())
    }

    /// Create a minimal development configuration rooted in the working directory.
    pub fn development() -> Self {
        Self {
            service: ServiceConfig::default(),
            registry: RegistryConfig {
                model_dir: PathBuf::from("models"),
                cache: CachePolicy::Reload,
                ..RegistryConfig::default()
            },
            monitor: MonitorConfig {
                metrics_addr: SocketAddr::from(([127, 0, 0, 1], 8002)),
                ..MonitorConfig::default()
            },
            training: TrainingParams::default(),
            tracking: TrackingConfig::default(),
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                json_logs: false,
            },
        }
    }
}

fn resolve_against(path: &mut PathBuf, root: &Path) {
    if path.is_relative() {
        *path = root.join(&*path);
    }
}

/// Returns true for tags shaped like `v1`, `v2`, `v10`.
pub fn is_version_tag(tag: &str) -> bool {
    tag.strip_prefix('v')
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Prediction service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name reported by `/info`.
    pub name: String,
    /// Address to bind the prediction API.
    pub bind_addr: SocketAddr,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "Car_Price_Prediction_API".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9999)),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Model registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory holding one sub-directory per version.
    pub model_dir: PathBuf,
    /// Version tags that may be served.
    pub versions: Vec<String>,
    /// Artifact file name inside each version directory.
    pub artifact_file: String,
    /// Cache and invalidation policy.
    pub cache: CachePolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            versions: vec!["v1".to_string(), "v2".to_string()],
            artifact_file: "model.json".to_string(),
            cache: CachePolicy::default(),
        }
    }
}

/// How loaded models are kept between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CachePolicy {
    /// Load the artifact on every request. No staleness, full load latency.
    Reload,
    /// Cache per version; an entry older than `ttl` is reloaded on next use.
    Ttl {
        #[serde(with = "humantime_serde")]
        ttl: Duration,
    },
    /// Cache per version until explicitly invalidated.
    Manual,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Ttl {
            ttl: Duration::from_secs(300),
        }
    }
}

/// Training monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Start the sampler and the metrics endpoint.
    pub enabled: bool,
    /// Metrics bind address (separate from the service port).
    pub metrics_addr: SocketAddr,
    /// Resource sampling interval.
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
    /// Sleep applied after a failed sample.
    #[serde(with = "humantime_serde")]
    pub error_backoff: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8002)),
            sample_interval: Duration::from_secs(15),
            error_backoff: Duration::from_secs(60),
        }
    }
}

/// Hyperparameters handed to the external ridge trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Regularization strength.
    pub alpha: f64,
    /// Whether the model fits an intercept.
    pub fit_intercept: bool,
    /// Solver name understood by the trainer.
    pub solver: String,
    /// Directory with the processed train/test tables.
    pub data_directory: PathBuf,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            fit_intercept: true,
            solver: "auto".to_string(),
            data_directory: PathBuf::from("data/processed"),
        }
    }
}

/// Run tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Directory holding one sub-directory per run.
    pub runs_dir: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}
