//! Scan observers.
//!
//! A [`ScanDelegate`] is told when a scan starts, progresses, finishes or
//! fails. Delegates live in a [`DelegateRegistry`] owned by the scanner.
//!
//! # Isolation
//!
//! Notification works on a copy of the registered list taken under the
//! registry lock; the lock is released before any delegate runs. A delegate
//! may therefore add or remove delegates, itself included, from inside a
//! callback. A callback that returns an error or panics is logged and the
//! remaining delegates are still notified.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::{fmt, ptr};

use camino::Utf8PathBuf;
use mlib_core::{ScanResult, ScanStatus, ScanStep};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::ScanError;
use crate::pool::panic_message;

/// An observer of scan lifecycle events.
///
/// Every method has a no-op default, so implementors only override what
/// they care about. Callbacks run on the scanning thread, or on an import
/// worker for progress during step 5; they should return quickly.
pub trait ScanDelegate: fmt::Debug + Send + Sync {
    /// Called once when a scan starts, before any step runs.
    ///
    /// # Errors
    ///
    /// An error is logged and otherwise ignored.
    fn on_scan_start(&self, folders: &[Utf8PathBuf]) -> anyhow::Result<()> {
        let _ = folders;
        Ok(())
    }

    /// Called on every status change of the running scan.
    ///
    /// # Errors
    ///
    /// An error is logged and otherwise ignored.
    fn on_scan_progress(&self, status: &ScanStatus) -> anyhow::Result<()> {
        let _ = status;
        Ok(())
    }

    /// Called once when a scan completed and its result was saved.
    ///
    /// # Errors
    ///
    /// An error is logged and otherwise ignored.
    fn on_scan_finish(&self, result: &ScanResult) -> anyhow::Result<()> {
        let _ = result;
        Ok(())
    }

    /// Called once when a scan failed.
    ///
    /// # Errors
    ///
    /// An error is logged and otherwise ignored.
    fn on_scan_fail(&self, error: &ScanError) -> anyhow::Result<()> {
        let _ = error;
        Ok(())
    }
}

/// The set of delegates registered with a scanner.
///
/// Membership is by `Arc` identity: adding the same `Arc` twice keeps one
/// entry, and removal needs a clone of the registered `Arc`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use mlib_scanner::{DelegateRegistry, LoggingDelegate, ScanDelegate};
///
/// let registry = DelegateRegistry::new();
/// let delegate: Arc<dyn ScanDelegate> = Arc::new(LoggingDelegate::new());
///
/// assert!(registry.add(Arc::clone(&delegate)));
/// assert!(!registry.add(Arc::clone(&delegate)));
/// assert_eq!(registry.len(), 1);
///
/// assert!(registry.remove(&delegate));
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct DelegateRegistry {
    delegates: Mutex<Vec<Arc<dyn ScanDelegate>>>,
}

impl DelegateRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `delegate`, returning `false` if it was already registered.
    pub fn add(&self, delegate: Arc<dyn ScanDelegate>) -> bool {
        let mut delegates = self.delegates.lock();
        if delegates.iter().any(|d| same(d, &delegate)) {
            return false;
        }
        delegates.push(delegate);
        true
    }

    /// Unregisters `delegate`, returning `false` if it was not registered.
    pub fn remove(&self, delegate: &Arc<dyn ScanDelegate>) -> bool {
        let mut delegates = self.delegates.lock();
        let before = delegates.len();
        delegates.retain(|d| !same(d, delegate));
        delegates.len() != before
    }

    /// Returns the number of registered delegates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.delegates.lock().len()
    }

    /// Returns `true` if no delegate is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delegates.lock().is_empty()
    }

    /// Tells every delegate that a scan started.
    pub fn notify_start(&self, folders: &[Utf8PathBuf]) {
        self.each("start", |d| d.on_scan_start(folders));
    }

    /// Tells every delegate about a status change.
    pub fn notify_progress(&self, status: &ScanStatus) {
        self.each("progress", |d| d.on_scan_progress(status));
    }

    /// Tells every delegate that a scan finished.
    pub fn notify_finish(&self, result: &ScanResult) {
        self.each("finish", |d| d.on_scan_finish(result));
    }

    /// Tells every delegate that a scan failed.
    pub fn notify_fail(&self, scan_error: &ScanError) {
        self.each("fail", |d| d.on_scan_fail(scan_error));
    }

    fn each<F>(&self, event: &'static str, notify: F)
    where
        F: Fn(&dyn ScanDelegate) -> anyhow::Result<()>,
    {
        let snapshot = self.delegates.lock().clone();

        for delegate in snapshot {
            match catch_unwind(AssertUnwindSafe(|| notify(delegate.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(delegate = ?delegate, event, error = %err, "scan delegate failed");
                }
                Err(payload) => {
                    error!(
                        delegate = ?delegate,
                        event,
                        panic = %panic_message(payload.as_ref()),
                        "scan delegate panicked"
                    );
                }
            }
        }
    }
}

fn same(a: &Arc<dyn ScanDelegate>, b: &Arc<dyn ScanDelegate>) -> bool {
    ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// A delegate that forwards the scan lifecycle to `tracing`.
///
/// Step changes are logged at `info`, progress within a step at `debug`.
#[derive(Debug, Default)]
pub struct LoggingDelegate {
    last_step: Mutex<Option<ScanStep>>,
}

impl LoggingDelegate {
    /// Creates a new logging delegate.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScanDelegate for LoggingDelegate {
    fn on_scan_start(&self, folders: &[Utf8PathBuf]) -> anyhow::Result<()> {
        *self.last_step.lock() = None;
        info!(folders = ?folders, "library scan started");
        Ok(())
    }

    fn on_scan_progress(&self, status: &ScanStatus) -> anyhow::Result<()> {
        let step = status.step();
        let changed = self.last_step.lock().replace(step) != Some(step);
        if changed {
            info!(
                step = %step,
                number = step.number(),
                total = status.total_steps(),
                "scan step started"
            );
        } else if let Some(fraction) = status.fraction() {
            debug!(step = %step, progress = fraction, "scan progress");
        }
        Ok(())
    }

    fn on_scan_finish(&self, result: &ScanResult) -> anyhow::Result<()> {
        info!(summary = %result, "library scan finished");
        Ok(())
    }

    fn on_scan_fail(&self, scan_error: &ScanError) -> anyhow::Result<()> {
        error!(error = %scan_error, "library scan failed");
        Ok(())
    }
}
