//! Process-wide atomic counters.
//!
//! Counters are bumped silently at the call site. [`Metrics::flush`] emits
//! current values as one `tracing::info!` event, typically when the binary
//! exits.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    runs_started: AtomicU64,
    passes_measured: AtomicU64,
    gates_failed: AtomicU64,
    deploys_published: AtomicU64,
    runs_errored: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            passes_measured: AtomicU64::new(0),
            gates_failed: AtomicU64::new(0),
            deploys_published: AtomicU64::new(0),
            runs_errored: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_started", "counter incremented");
    }

    pub fn inc_passes_measured(&self) {
        self.passes_measured.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "passes_measured", "counter incremented");
    }

    pub fn inc_gates_failed(&self) {
        self.gates_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gates_failed", "counter incremented");
    }

    pub fn inc_deploys_published(&self) {
        self.deploys_published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "deploys_published", "counter incremented");
    }

    pub fn inc_runs_errored(&self) {
        self.runs_errored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_errored", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_started = self.runs_started(),
            passes_measured = self.passes_measured(),
            gates_failed = self.gates_failed(),
            deploys_published = self.deploys_published(),
            runs_errored = self.runs_errored(),
        );
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn passes_measured(&self) -> u64 {
        self.passes_measured.load(Ordering::Relaxed)
    }

    pub fn gates_failed(&self) -> u64 {
        self.gates_failed.load(Ordering::Relaxed)
    }

    pub fn deploys_published(&self) -> u64 {
        self.deploys_published.load(Ordering::Relaxed)
    }

    pub fn runs_errored(&self) -> u64 {
        self.runs_errored.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_started.store(0, Ordering::Relaxed);
        self.passes_measured.store(0, Ordering::Relaxed);
        self.gates_failed.store(0, Ordering::Relaxed);
        self.deploys_published.store(0, Ordering::Relaxed);
        self.runs_errored.store(0, Ordering::Relaxed);
    }
}
