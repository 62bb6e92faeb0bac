//! Training-run tracking.
//!
//! A run groups the parameters and metrics of one training or evaluation
//! execution under an opaque [`RunId`]. The filesystem tracker keeps one
//! `run.json` per run under the configured runs directory.

use crate::config::TrackingConfig;
use crate::error::{PriceError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Run identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| PriceError::invalid_field("run_id", e.to_string()))
    }
}

/// Run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// Persisted run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

/// Experiment tracker interface.
pub trait RunTracker: Send + Sync {
    /// Open a run and return its identifier.
    fn start_run(&self, name: &str) -> Result<RunId>;

    /// Merge parameters into the run.
    fn log_params(&self, run: RunId, params: &BTreeMap<String, Value>) -> Result<()>;

    /// Merge metrics into the run; later values for a key overwrite earlier ones.
    fn log_metrics(&self, run: RunId, metrics: &BTreeMap<String, f64>) -> Result<()>;

    /// Close the run.
    fn end_run(&self, run: RunId, status: RunStatus) -> Result<()>;
}

/// Tracker writing `<runs_dir>/<run_id>/run.json`.
pub struct FileRunTracker {
    runs_dir: PathBuf,
    /// Serializes read-modify-write of run files.
    write_lock: Mutex<()>,
}

impl FileRunTracker {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::new(config.runs_dir.clone())
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    fn run_path(&self, run: RunId) -> PathBuf {
        self.runs_dir.join(run.to_string()).join("run.json")
    }

    /// Read a run record.
    pub fn load_run(&self, run: RunId) -> Result<RunRecord> {
        let path = self.run_path(run);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            PriceError::Internal(format!("run {} unreadable at {}: {}", run, path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn store(&self, record: &RunRecord) -> Result<()> {
        let path = self.run_path(record.run_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(record)?)?;
        Ok(())
    }

    fn update(&self, run: RunId, apply: impl FnOnce(&mut RunRecord)) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut record = self.load_run(run)?;
        apply(&mut record);
        self.store(&record)
    }
}

impl RunTracker for FileRunTracker {
    fn start_run(&self, name: &str) -> Result<RunId> {
        let record = RunRecord {
            run_id: RunId::new(),
            name: name.to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
        };

        let _guard = self.write_lock.lock();
        self.store(&record)?;
        info!(run_id = %record.run_id, name, "Started run");
        Ok(record.run_id)
    }

    fn log_params(&self, run: RunId, params: &BTreeMap<String, Value>) -> Result<()> {
        self.update(run, |record| {
            record
                .params
                .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        })?;
        debug!(run_id = %run, count = params.len(), "Logged params");
        Ok(())
    }

    fn log_metrics(&self, run: RunId, metrics: &BTreeMap<String, f64>) -> Result<()> {
        self.update(run, |record| {
            record
                .metrics
                .extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        })?;
        debug!(run_id = %run, count = metrics.len(), "Logged metrics");
        Ok(())
    }

    fn end_run(&self, run: RunId, status: RunStatus) -> Result<()> {
        self.update(run, |record| {
            record.status = status;
            record.ended_at = Some(Utc::now());
        })?;
        info!(run_id = %run, ?status, "Ended run");
        Ok(())
    }
}

/// Flatten a serializable value's top-level fields into run parameters.
pub fn params_of<T: Serialize>(value: &T) -> Result<BTreeMap<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Ok(BTreeMap::from([("value".to_string(), other)])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingParams;

    #[test]
    fn test_run_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FileRunTracker::new(dir.path());

        let run = tracker.start_run("evaluate-v1").unwrap();
        tracker
            .log_params(run, &params_of(&TrainingParams::default()).unwrap())
            .unwrap();
        tracker
            .log_metrics(run, &BTreeMap::from([("mse".to_string(), 4.0)]))
            .unwrap();
        tracker
            .log_metrics(
                run,
                &BTreeMap::from([("mse".to_string(), 2.0), ("r2".to_string(), 0.9)]),
            )
            .unwrap();
        tracker.end_run(run, RunStatus::Finished).unwrap();

        let record = tracker.load_run(run).unwrap();
        assert_eq!(record.name, "evaluate-v1");
        assert_eq!(record.status, RunStatus::Finished);
        assert!(record.ended_at.is_some());
        assert_eq!(record.params["alpha"], serde_json::json!(0.1));
        assert_eq!(record.metrics["mse"], 2.0);
        assert_eq!(record.metrics["r2"], 0.9);
        assert!(dir.path().join(run.to_string()).join("run.json").exists());
    }

    #[test]
    fn test_unknown_run() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FileRunTracker::new(dir.path());
        assert!(tracker.end_run(RunId::new(), RunStatus::Failed).is_err());
    }

    #[test]
    fn test_run_id_parse() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<RunId>().is_err());
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            format!("\"{}\"", id)
        );
    }
}
