use portable_atomic::{AtomicU64, Ordering};

/// Running counters of one accumulator.
///
/// All counters only ever grow and use relaxed ordering; a snapshot is a
/// best-effort view, not a consistent cut.
#[derive(Debug, Default)]
pub(crate) struct AccumulatorStats {
    submitted: AtomicU64,
    batches: AtomicU64,
    dispatched: AtomicU64,
    batch_failures: AtomicU64,
    singleton_failures: AtomicU64,
    rejected_on_shutdown: AtomicU64,
}

impl AccumulatorStats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self, size: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.dispatched.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_failure(&self) {
        self.batch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_singleton_failure(&self) {
        self.singleton_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_on_shutdown(&self, count: u64) {
        self.rejected_on_shutdown.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            batch_failures: self.batch_failures.load(Ordering::Relaxed),
            singleton_failures: self.singleton_failures.load(Ordering::Relaxed),
            rejected_on_shutdown: self.rejected_on_shutdown.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of an accumulator's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsSnapshot {
    /// Requests accepted by `submit`.
    pub submitted: u64,
    /// Batches closed and handed to the handler.
    pub batches: u64,
    /// Requests contained in those batches.
    pub dispatched: u64,
    /// Batches whose bulk call failed (handler error or contract violation).
    pub batch_failures: u64,
    /// Singleton retries that failed.
    pub singleton_failures: u64,
    /// Requests rejected because the accumulator stopped before dispatching
    /// them.
    pub rejected_on_shutdown: u64,
}

impl StatsSnapshot {
    /// Average number of requests per dispatched batch.
    pub fn mean_batch_size(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.dispatched as f64 / self.batches as f64
        }
    }
}
