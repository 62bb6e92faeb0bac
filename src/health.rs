//! Health payload for the prediction service.

use serde::{Deserialize, Serialize};

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    /// Serving requests.
    Up,
    /// Draining for shutdown.
    Down,
}

impl HealthStatus {
    /// Convert to HTTP status code.
    pub fn to_status_code(&self) -> u16 {
        match self {
            HealthStatus::Up => 200,
            HealthStatus::Down => 503,
        }
    }
}

/// Response body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    /// Versions with a model currently in cache.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cached_models: Vec<String>,
}

impl HealthReport {
    /// Report for a running service.
    pub fn up(service_name: &str, cached_models: Vec<String>) -> Self {
        Self {
            status: HealthStatus::Up,
            message: format!("{} is up", service_name),
            cached_models,
        }
    }

    /// Report for a service that is shutting down.
    pub fn down(service_name: &str) -> Self {
        Self {
            status: HealthStatus::Down,
            message: format!("{} is shutting down", service_name),
            cached_models: Vec::new(),
        }
    }
}
