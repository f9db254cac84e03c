//! The live status slot of a scanner.
//!
//! [`StatusCell`] holds the status of the running scan, or nothing when the
//! scanner is idle. Writers swap in a whole new [`ScanStatus`]; readers get
//! a clone. The lock only ever guards a pointer swap or an `Arc` clone, so
//! neither side waits on the other for longer than that.

use std::sync::Arc;

use mlib_core::ScanStatus;
use parking_lot::RwLock;

/// A single swappable slot holding the current [`ScanStatus`].
///
/// Last write wins; there is no merging of concurrent updates.
///
/// # Examples
///
/// ```
/// use mlib_scanner::StatusCell;
/// use mlib_core::{ScanStatus, ScanStep};
///
/// let cell = StatusCell::new();
/// assert!(cell.is_idle());
///
/// cell.set(ScanStatus::indeterminate(&[], ScanStep::Preparing));
/// assert_eq!(cell.get().map(|s| s.step()), Some(ScanStep::Preparing));
///
/// cell.clear();
/// assert!(cell.get().is_none());
/// ```
#[derive(Debug, Default)]
pub struct StatusCell {
    slot: RwLock<Option<Arc<ScanStatus>>>,
}

impl StatusCell {
    /// Creates an empty (idle) cell.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current status.
    pub fn set(&self, status: ScanStatus) {
        let status = Arc::new(status);
        *self.slot.write() = Some(status);
    }

    /// Empties the cell, returning the scanner to idle.
    pub fn clear(&self) {
        let previous = self.slot.write().take();
        drop(previous);
    }

    /// Returns a copy of the current status, or `None` when idle.
    #[must_use]
    pub fn get(&self) -> Option<ScanStatus> {
        let current = self.slot.read().clone();
        current.map(|status| ScanStatus::clone(&status))
    }

    /// Returns `true` if no status is present.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.slot.read().is_none()
    }
}
