//! Import progress with atomic counters.
//!
//! This module provides [`ImportProgress`], the counter the import workers
//! bump as they finish, and [`ImportSnapshot`] for point-in-time views.
//!
//! # Thread Safety
//!
//! Counters use [`AtomicU64`]. Increments are `AcqRel` so the value a worker
//! gets back from [`ImportProgress::record`] is exactly its position in the
//! completion order; the orchestrator publishes that value as the step 5
//! fraction.
//!
//! # Examples
//!
//! ```
//! use mlib_scanner::ImportProgress;
//!
//! let progress = ImportProgress::new();
//! progress.begin(4);
//!
//! progress.record(true);
//! progress.record(false);
//!
//! let snapshot = progress.snapshot();
//! assert_eq!(snapshot.completed, 2);
//! assert_eq!(snapshot.failed, 1);
//! assert!((snapshot.fraction() - 0.5).abs() < f64::EPSILON);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for the import step of a scan.
///
/// Shared by all import workers of one scan and reset to zero when the scan
/// ends, whatever its outcome.
#[derive(Debug, Default)]
pub struct ImportProgress {
    /// Number of import tasks submitted.
    total: AtomicU64,
    /// Number of import tasks finished, successful or not.
    completed: AtomicU64,
    /// Number of import tasks that failed.
    failed: AtomicU64,
}

impl ImportProgress {
    /// Creates a new [`ImportProgress`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting a batch of `total` tasks.
    pub fn begin(&self, total: u64) {
        self.completed.store(0, Ordering::Release);
        self.failed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    /// Records one finished task and returns the new completed count.
    #[inline]
    pub fn record(&self, imported: bool) -> u64 {
        if !imported {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns a point-in-time snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> ImportSnapshot {
        ImportSnapshot {
            total: self.total.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Release);
        self.completed.store(0, Ordering::Release);
        self.failed.store(0, Ordering::Release);
    }
}

/// A point-in-time copy of [`ImportProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportSnapshot {
    /// Number of import tasks submitted.
    pub total: u64,
    /// Number of import tasks finished.
    pub completed: u64,
    /// Number of import tasks that failed.
    pub failed: u64,
}

impl ImportSnapshot {
    /// Returns `completed / total`, or `0.0` for an empty batch.
    ///
    /// # Examples
    ///
    /// ```
    /// use mlib_scanner::ImportSnapshot;
    ///
    /// let snap = ImportSnapshot { total: 4, completed: 3, failed: 0 };
    /// assert!((snap.fraction() - 0.75).abs() < f64::EPSILON);
    /// assert_eq!(ImportSnapshot::default().fraction(), 0.0);
    /// ```
    #[must_use]
    pub fn fraction(&self) -> f64 {
        fraction_of(self.completed, self.total)
    }

    /// Returns the number of tasks that imported successfully.
    #[inline]
    #[must_use]
    pub const fn imported(&self) -> u64 {
        self.completed.saturating_sub(self.failed)
    }

    /// Returns `true` once every submitted task has finished.
    #[inline]
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

/// Returns `done / total` clamped to `[0.0, 1.0]`, or `0.0` when `total` is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)] // song counts stay far below 2^52
pub fn fraction_of(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 / total as f64).min(1.0)
}
