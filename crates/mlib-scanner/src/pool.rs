//! The song import worker pool.
//!
//! A [`WorkerPool`] is a dedicated rayon pool with a fixed number of named
//! threads, created for one scan and dropped when it ends. Each song file is
//! imported as its own task. A failed import, whether it returns an error
//! or panics, becomes an [`ImportOutcome::Failed`] and never affects the
//! other tasks.
//!
//! # Cancellation
//!
//! Rayon threads cannot be killed. [`WorkerPool::cancel`] raises a flag that
//! every task checks before it starts; tasks already running finish, queued
//! ones are skipped, and [`WorkerPool::import_all`] reports
//! [`ScanError::Interrupted`] once the pool has drained.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use mlib_core::{LibrarySong, Song};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::error::ScanError;

/// The result of importing one song file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The file was imported into the catalog.
    Imported(Song),
    /// The import failed; the scan carries on.
    Failed {
        /// The file that failed to import.
        path: Utf8PathBuf,
        /// A description of the failure.
        reason: String,
    },
}

impl ImportOutcome {
    /// Returns `true` for [`ImportOutcome::Imported`].
    #[inline]
    #[must_use]
    pub const fn is_imported(&self) -> bool {
        matches!(self, Self::Imported(_))
    }

    /// Returns the path of the imported or failed file.
    #[must_use]
    pub fn path(&self) -> &Utf8PathBuf {
        match self {
            Self::Imported(song) => &song.path,
            Self::Failed { path, .. } => path,
        }
    }
}

/// A fixed-size pool of import workers.
///
/// # Examples
///
/// ```
/// use mlib_scanner::WorkerPool;
///
/// let pool = WorkerPool::new(2).unwrap();
/// assert_eq!(pool.size(), 2);
/// assert!(!pool.is_cancelled());
/// ```
pub struct WorkerPool {
    pool: ThreadPool,
    size: usize,
    cancelled: AtomicBool,
}

impl WorkerPool {
    /// Creates a pool with exactly `size` worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if `size` is zero, or
    /// [`ScanError::Pool`] if the threads cannot be spawned.
    pub fn new(size: usize) -> Result<Self, ScanError> {
        if size == 0 {
            return Err(ScanError::config("worker count must be at least 1"));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|index| format!("mlib-import-{index}"))
            .build()?;

        debug!(workers = size, "import pool started");

        Ok(Self {
            pool,
            size,
            cancelled: AtomicBool::new(false),
        })
    }

    /// Returns the number of worker threads.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Skips every task that has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Imports every song on the pool and waits for all of them.
    ///
    /// `import` runs once per song, concurrently. `on_done` runs on the
    /// worker right after each task, in completion order. Outcomes are
    /// returned in the order of `songs`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Interrupted`] if the pool was cancelled before
    /// or while the batch ran.
    pub fn import_all<I, D>(
        &self,
        songs: &[&LibrarySong],
        import: I,
        on_done: D,
    ) -> Result<Vec<ImportOutcome>, ScanError>
    where
        I: Fn(&LibrarySong) -> anyhow::Result<Song> + Sync,
        D: Fn(&ImportOutcome) + Sync,
    {
        let outcomes: Vec<Option<ImportOutcome>> = self.pool.install(|| {
            songs
                .par_iter()
                .with_max_len(1)
                .map(|song| {
                    if self.is_cancelled() {
                        return None;
                    }
                    let outcome = import_one(&import, song);
                    on_done(&outcome);
                    Some(outcome)
                })
                .collect()
        });

        if self.is_cancelled() {
            return Err(ScanError::Interrupted);
        }

        Ok(outcomes.into_iter().flatten().collect())
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn import_one<I>(import: &I, song: &LibrarySong) -> ImportOutcome
where
    I: Fn(&LibrarySong) -> anyhow::Result<Song>,
{
    let reason = match catch_unwind(AssertUnwindSafe(|| import(song))) {
        Ok(Ok(imported)) => {
            debug!(path = %song.path, id = imported.id, "imported song");
            return ImportOutcome::Imported(imported);
        }
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };

    warn!(path = %song.path, error = %reason, "failed to import song");
    ImportOutcome::Failed {
        path: song.path.clone(),
        reason,
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
