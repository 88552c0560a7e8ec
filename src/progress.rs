use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe processed/total counters for one scan.
///
/// `total` is fixed at construction and `processed` never passes it, so any
/// snapshot is consistent without a lock.
#[derive(Debug)]
pub struct Progress {
    total: u64,
    processed: AtomicU64,
    found: AtomicU64,
}

/// Point-in-time view of a [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub total: u64,
    pub found: u64,
    pub percent: f32,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            processed: AtomicU64::new(0),
            found: AtomicU64::new(0),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Count one finished target. Returns `None` once everything is already counted.
    pub fn record(&self, reachable: bool) -> Option<ProgressSnapshot> {
        let total = self.total;
        self.processed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < total).then_some(n + 1)
            })
            .ok()?;
        if reachable {
            self.found.fetch_add(1, Ordering::AcqRel);
        }
        Some(self.snapshot())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let processed = self.processed.load(Ordering::Acquire);
        ProgressSnapshot {
            processed,
            total: self.total,
            found: self.found.load(Ordering::Acquire),
            percent: percent(processed, self.total),
        }
    }

    pub fn is_done(&self) -> bool {
        self.processed.load(Ordering::Acquire) >= self.total
    }
}

/// `processed / total * 100`, clamped to [0, 100]. An empty scan is complete.
pub fn percent(processed: u64, total: u64) -> f32 {
    if total == 0 || processed >= total {
        return 100.0;
    }
    (processed as f64 / total as f64 * 100.0).clamp(0.0, 100.0) as f32
}
