// Preview metrics module
//
// Lightweight counters for monitoring the preview pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Preview pipeline metrics
///
/// Uses atomic operations so the engine's worker threads and the host thread
/// can record without locking. Logged on teardown.
#[derive(Debug)]
pub struct PreviewMetrics {
    /// Open requests sent to the engine
    pub opens_requested: AtomicU64,

    /// Open requests the engine reported as failed
    pub opens_failed: AtomicU64,

    /// Render requests sent to the engine
    pub renders_requested: AtomicU64,

    pub renders_succeeded: AtomicU64,

    pub renders_failed: AtomicU64,

    /// Callbacks for superseded requests that were ignored
    pub stale_callbacks: AtomicU64,

    /// Navigation input dropped because a render was in flight
    pub inputs_dropped: AtomicU64,

    /// Total time between render request and completion, in milliseconds
    pub total_render_time_ms: AtomicU64,

    start_time: Instant,
}

impl PreviewMetrics {
    pub fn new() -> Self {
        Self {
            opens_requested: AtomicU64::new(0),
            opens_failed: AtomicU64::new(0),
            renders_requested: AtomicU64::new(0),
            renders_succeeded: AtomicU64::new(0),
            renders_failed: AtomicU64::new(0),
            stale_callbacks: AtomicU64::new(0),
            inputs_dropped: AtomicU64::new(0),
            total_render_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_open_requested(&self) {
        self.opens_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_open_failed(&self) {
        self.opens_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render_requested(&self) {
        self.renders_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed render and how long it took
    pub fn record_render_complete(&self, succeeded: bool, duration: Duration) {
        if succeeded {
            self.renders_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.renders_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_render_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_stale_callback(&self) {
        self.stale_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_input_dropped(&self) {
        self.inputs_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average render latency over all completed renders, in milliseconds
    pub fn avg_render_time_ms(&self) -> f64 {
        let total = self.total_render_time_ms.load(Ordering::Relaxed);
        let count = self.renders_succeeded.load(Ordering::Relaxed)
            + self.renders_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Preview Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Opens: {} requested, {} failed",
            self.opens_requested.load(Ordering::Relaxed),
            self.opens_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Renders: {} requested, {} succeeded, {} failed (avg: {:.2}ms)",
            self.renders_requested.load(Ordering::Relaxed),
            self.renders_succeeded.load(Ordering::Relaxed),
            self.renders_failed.load(Ordering::Relaxed),
            self.avg_render_time_ms()
        );
        tracing::info!(
            "Stale callbacks: {}, dropped inputs: {}",
            self.stale_callbacks.load(Ordering::Relaxed),
            self.inputs_dropped.load(Ordering::Relaxed)
        );
    }
}

impl Default for PreviewMetrics {
    fn default() -> Self {
        Self::new()
    }
}
