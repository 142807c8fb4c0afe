use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use mihari_types::StageTimings;

/// Cumulative pipeline counters plus the most recent run's stage
/// latencies, queryable from the command surface.
#[derive(Default)]
pub struct PerfCounters {
    processed: AtomicU64,
    skipped: AtomicU64,
    empty: AtomicU64,
    failed: AtomicU64,
    last: Mutex<Option<StageTimings>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PerfSnapshot {
    pub processed: u64,
    pub skipped: u64,
    pub empty: u64,
    pub failed: u64,
    pub last_timings: Option<StageTimings>,
}

impl PerfCounters {
    pub fn record_run(&self, timings: StageTimings) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        *self.last.lock().unwrap() = Some(timings);
    }

    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty(&self) {
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PerfSnapshot {
        PerfSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_timings: *self.last.lock().unwrap(),
        }
    }
}
