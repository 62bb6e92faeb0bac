//! Graceful shutdown for the prediction service, the metrics endpoint and the
//! resource sampler.
//!
//! One [`ShutdownCoordinator`] is created by the composition root. Servers
//! await [`ShutdownCoordinator::wait_for_shutdown`] as their graceful-shutdown
//! future; the sampler listens on a broadcast receiver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Time granted to in-flight requests before tasks are aborted.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shutdown coordinator shared by every long-running task.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    /// Broadcast channel for shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
    /// Watch channel for checking if shutdown is in progress.
    shutdown_watch: watch::Receiver<bool>,
    shutdown_watch_tx: Arc<watch::Sender<bool>>,
    is_shutting_down: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_DRAIN_TIMEOUT)
    }

    pub fn with_timeout(drain_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (shutdown_watch_tx, shutdown_watch) = watch::channel(false);

        Self {
            shutdown_tx,
            shutdown_watch,
            shutdown_watch_tx: Arc::new(shutdown_watch_tx),
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            drain_timeout,
        }
    }

    /// Subscribe to the shutdown broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Initiate shutdown. Later calls are no-ops.
    pub fn shutdown(&self) {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating graceful shutdown");
            let _ = self.shutdown_watch_tx.send(true);
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_watch.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Wait for `tasks` to finish within the drain timeout, aborting stragglers.
    pub async fn drain(&self, tasks: Vec<(&'static str, JoinHandle<()>)>) {
        for (name, mut handle) in tasks {
            match tokio::time::timeout(self.drain_timeout, &mut handle).await {
                Ok(Ok(())) => info!(task = name, "Task stopped"),
                Ok(Err(e)) => error!(task = name, error = %e, "Task ended abnormally"),
                Err(_) => {
                    warn!(task = name, timeout = ?self.drain_timeout, "Force aborting task");
                    handle.abort();
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns OS signals into a coordinator shutdown.
pub struct SignalHandler {
    coordinator: ShutdownCoordinator,
}

impl SignalHandler {
    pub fn new(coordinator: ShutdownCoordinator) -> Self {
        Self { coordinator }
    }

    /// Returns after SIGINT or SIGTERM, having initiated shutdown.
    #[cfg(unix)]
    pub async fn run(self) {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        self.coordinator.shutdown();
    }

    #[cfg(windows)]
    pub async fn run(self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        info!("Received Ctrl+C");
        self.coordinator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        assert!(!coordinator.is_shutting_down());

        coordinator.shutdown();
        coordinator.shutdown();
        assert!(coordinator.is_shutting_down());

        let received = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(matches!(received, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves() {
        let coordinator = ShutdownCoordinator::new();
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_for_shutdown().await })
        };

        coordinator.shutdown();
        let result = tokio::time::timeout(Duration::from_millis(100), waiter).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_stragglers() {
        let coordinator = ShutdownCoordinator::with_timeout(Duration::from_secs(1));
        let quick = tokio::spawn(async {});
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let started = tokio::time::Instant::now();
        coordinator
            .drain(vec![("quick", quick), ("stuck", stuck)])
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
