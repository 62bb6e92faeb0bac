//! Latency histogram helpers for prediction timing.

use prometheus::Histogram;
use std::time::{Duration, Instant};

/// Default histogram buckets for latency measurements (in seconds).
/// Covers sub-millisecond model calls up to slow artifact reloads.
pub const LATENCY_BUCKETS: [f64; 14] = [
    0.0001, // 100µs
    0.0005, // 500µs
    0.001,  // 1ms
    0.005,  // 5ms
    0.01,   // 10ms
    0.025,  // 25ms
    0.05,   // 50ms
    0.1,    // 100ms
    0.25,   // 250ms
    0.5,    // 500ms
    1.0,    // 1s
    2.5,    // 2.5s
    5.0,    // 5s
    10.0,   // 10s
];

/// A latency timer that records into its histogram when dropped.
///
/// A timer built without a histogram (the label lookup failed) only measures.
pub struct LatencyTimer {
    start: Instant,
    histogram: Option<Histogram>,
}

impl LatencyTimer {
    /// Create a timer observing into `histogram`.
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram: Some(histogram),
        }
    }

    /// Create a timer that records nowhere.
    pub fn detached() -> Self {
        Self {
            start: Instant::now(),
            histogram: None,
        }
    }

    /// Get elapsed time without recording.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record now and return the observed duration.
    pub fn record(mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if let Some(histogram) = self.histogram.take() {
            histogram.observe(elapsed.as_secs_f64());
        }
        elapsed
    }

    /// Consume the timer without recording.
    pub fn discard(mut self) {
        self.histogram = None;
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        if let Some(histogram) = self.histogram.take() {
            histogram.observe(self.start.elapsed().as_secs_f64());
        }
    }
}
