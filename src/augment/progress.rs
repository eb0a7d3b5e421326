//! Background progress monitor for generation runs.
//!
//! Periodically logs run statistics (records admitted, generations
//! succeeded, records rejected, records skipped as already processed) so
//! operators can follow long-running runs without reading per-record logs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Snapshot of run counters at a point in time.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Records admitted into a batch.
    pub admitted: usize,
    /// Generations written to the output sink.
    pub succeeded: usize,
    /// Records routed to the rejection sink.
    pub rejected: usize,
    /// Records skipped because their id was already processed.
    pub skipped: usize,
    /// Batches fully drained.
    pub batches: usize,
    /// Wall-clock elapsed time since the monitor started.
    pub elapsed: Duration,
}

/// Shared atomic counters for run progress tracking.
///
/// The orchestrator increments these; the background monitor reads them.
#[derive(Debug, Clone)]
pub struct ProgressCounters {
    pub admitted: Arc<AtomicUsize>,
    pub succeeded: Arc<AtomicUsize>,
    pub rejected: Arc<AtomicUsize>,
    pub skipped: Arc<AtomicUsize>,
    pub batches: Arc<AtomicUsize>,
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounters {
    /// Create a new set of zeroed progress counters.
    pub fn new() -> Self {
        Self {
            admitted: Arc::new(AtomicUsize::new(0)),
            succeeded: Arc::new(AtomicUsize::new(0)),
            rejected: Arc::new(AtomicUsize::new(0)),
            skipped: Arc::new(AtomicUsize::new(0)),
            batches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take a snapshot of the current counter values.
    pub fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

/// A background task that periodically logs run progress.
///
/// Call [`ProgressMonitor::stop`] to cancel.
pub struct ProgressMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start a background progress monitor that logs every `interval`.
    ///
    /// # Arguments
    ///
    /// * `counters` - Shared atomic counters incremented by the orchestrator
    /// * `target` - Target number of generations (used for progress percentage)
    /// * `interval` - How often to emit progress logs
    pub fn start(counters: ProgressCounters, target: u64, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                let snap = counters.snapshot(start);
                let pct = if target > 0 {
                    (snap.succeeded as f64 / target as f64 * 100.0).min(100.0)
                } else {
                    0.0
                };
                let elapsed_secs = snap.elapsed.as_secs_f64();
                let succeeded_per_sec = if elapsed_secs > 0.0 {
                    snap.succeeded as f64 / elapsed_secs
                } else {
                    0.0
                };

                tracing::info!(
                    admitted = snap.admitted,
                    succeeded = snap.succeeded,
                    rejected = snap.rejected,
                    skipped = snap.skipped,
                    batches = snap.batches,
                    target = target,
                    progress_pct = format!("{:.1}%", pct),
                    elapsed_secs = snap.elapsed.as_secs(),
                    succeeded_per_sec = format!("{:.2}", succeeded_per_sec),
                    "Generation progress"
                );
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Stop the background monitor and wait for it to finish.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
