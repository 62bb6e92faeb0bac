//! Background resource sampling.

use super::monitor::TrainingMonitor;
use crate::config::MonitorConfig;
use crate::error::{PriceError, Result};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessExt, System as SysInfoSystem, SystemExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One resource observation of the current process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    /// Resident set size in bytes.
    pub memory_bytes: u64,
    /// CPU usage in percent of one core.
    pub cpu_percent: f64,
}

/// Source of resource samples.
pub trait ResourceProbe: Send + 'static {
    fn sample(&mut self) -> Result<ResourceSample>;
}

/// Probe backed by `sysinfo` for the running process.
pub struct SysinfoProbe {
    system: SysInfoSystem,
    pid: Pid,
}

impl SysinfoProbe {
    /// Probe the current process.
    pub fn current_process() -> Result<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| PriceError::Monitoring(format!("cannot resolve own pid: {}", e)))?;
        Ok(Self {
            system: SysInfoSystem::new(),
            pid,
        })
    }
}

impl ResourceProbe for SysinfoProbe {
    fn sample(&mut self) -> Result<ResourceSample> {
        if !self.system.refresh_process(self.pid) {
            return Err(PriceError::Monitoring(format!(
                "process {} not visible to sysinfo",
                self.pid
            )));
        }

        let process = self
            .system
            .process(self.pid)
            .ok_or_else(|| PriceError::Monitoring(format!("process {} vanished", self.pid)))?;

        Ok(ResourceSample {
            memory_bytes: process.memory(),
            cpu_percent: f64::from(process.cpu_usage()),
        })
    }
}

/// Publishes resource samples to the monitor on a fixed interval.
///
/// A failed sample is logged and followed by the longer backoff sleep; the
/// loop only ends on shutdown.
pub struct ResourceSampler<P> {
    monitor: Arc<TrainingMonitor>,
    probe: P,
    interval: Duration,
    backoff: Duration,
}

impl<P: ResourceProbe> ResourceSampler<P> {
    pub fn new(monitor: Arc<TrainingMonitor>, probe: P, config: &MonitorConfig) -> Self {
        Self::with_timing(monitor, probe, config.sample_interval, config.error_backoff)
    }

    pub fn with_timing(
        monitor: Arc<TrainingMonitor>,
        probe: P,
        interval: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            monitor,
            probe,
            interval,
            backoff,
        }
    }

    /// Take one sample and publish it.
    pub fn sample_once(&mut self) -> Result<ResourceSample> {
        let sample = self.probe.sample()?;
        self.monitor.set_resource_usage(sample);
        Ok(sample)
    }

    /// Sample until a shutdown signal arrives.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval = ?self.interval, backoff = ?self.backoff, "Resource sampler started");

        loop {
            let delay = match self.sample_once() {
                Ok(sample) => {
                    debug!(
                        memory_bytes = sample.memory_bytes,
                        cpu_percent = sample.cpu_percent,
                        "Resource sample published"
                    );
                    self.interval
                }
                Err(e) => {
                    warn!(error = %e, backoff = ?self.backoff, "Resource sample failed");
                    self.backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Resource sampler stopping");
                    break;
                }
            }
        }
    }

    /// Run the sampler on its own task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
