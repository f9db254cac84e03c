//! The library scan orchestrator.
//!
//! [`LibraryScanner`] runs at most one scan at a time. A scan walks through
//! the six [`ScanStep`]s in order on the calling thread, except for song
//! imports which fan out over a [`WorkerPool`] created for that scan.
//!
//! # Lifecycle
//!
//! ```text
//! idle ─scan()─▶ preparing ─▶ searchingMediaFiles ─▶ cleaningSongs
//!                     ─▶ cleaningArtworks ─▶ importingSongs ─▶ normalizing ─▶ idle
//! ```
//!
//! The live [`ScanStatus`] doubles as the busy flag: the scanner is idle
//! exactly when [`LibraryScanner::status`] returns `None`. Whatever happens
//! during a scan, including a panic in a collaborator, the scanner returns
//! to idle with no pool and a zeroed import counter.
//!
//! # Locks
//!
//! - the start lock makes the idle check and the status install one step
//! - the publish lock orders status updates, so observers see import
//!   progress that never goes backwards
//! - the pool slot lets [`LibraryScanner::shutdown_now`] reach the running pool

use std::sync::Arc;
use std::time::Instant;

use camino::Utf8PathBuf;
use mlib_core::{LibraryFolder, LibrarySong, ScanConfig, ScanResult, ScanStatus, ScanStep};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::collab::{ProgressFn, ScanServices};
use crate::delegate::{DelegateRegistry, ScanDelegate};
use crate::error::ScanError;
use crate::pool::{ImportOutcome, WorkerPool};
use crate::progress::{ImportProgress, ImportSnapshot, fraction_of};
use crate::reconcile::{CatalogSnapshot, Reconciler, ScanFacts, watermark};
use crate::status::StatusCell;

/// Scans media folders into the catalog, one scan at a time.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use camino::Utf8PathBuf;
/// use mlib_core::ScanConfig;
/// use mlib_scanner::{FsFolderScanner, LibraryScanner, MemoryCatalog, ScanServices};
///
/// let config = ScanConfig::default();
/// let catalog = Arc::new(MemoryCatalog::new());
/// let services = ScanServices::with_catalog(
///     Arc::new(FsFolderScanner::new(config.clone())),
///     catalog,
/// );
/// let scanner = LibraryScanner::new(services, config.worker_count);
///
/// let result = scanner.scan(&[Utf8PathBuf::from("/srv/music")])?;
/// println!("{result}");
/// assert!(!scanner.is_scanning());
/// # Ok::<(), mlib_scanner::ScanError>(())
/// ```
#[derive(Debug)]
pub struct LibraryScanner {
    services: ScanServices,
    worker_count: usize,
    status: StatusCell,
    delegates: DelegateRegistry,
    progress: ImportProgress,
    pool: Mutex<Option<Arc<WorkerPool>>>,
    start_lock: Mutex<()>,
    publish_lock: Mutex<()>,
}

impl LibraryScanner {
    /// Creates an idle scanner importing with `worker_count` threads.
    #[must_use]
    pub fn new(services: ScanServices, worker_count: usize) -> Self {
        Self {
            services,
            worker_count,
            status: StatusCell::new(),
            delegates: DelegateRegistry::new(),
            progress: ImportProgress::new(),
            pool: Mutex::new(None),
            start_lock: Mutex::new(()),
            publish_lock: Mutex::new(()),
        }
    }

    /// Creates an idle scanner sized by `config`.
    #[must_use]
    pub fn with_config(services: ScanServices, config: &ScanConfig) -> Self {
        Self::new(services, config.worker_count)
    }

    /// Returns the number of import workers each scan uses.
    #[inline]
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Scans `folders` and reconciles the catalog with what was found.
    ///
    /// Blocks until the scan is over. Delegates are told about the start,
    /// every status change, and the finish or failure.
    ///
    /// # Errors
    ///
    /// - [`ScanError::AlreadyRunning`] if another scan is in progress; that
    ///   scan is not affected and no delegate is notified
    /// - [`ScanError::Pool`] if the import workers cannot be started
    /// - [`ScanError::Phase`] if a collaborator fails outside of a song import
    /// - [`ScanError::Interrupted`] if [`shutdown_now`](Self::shutdown_now)
    ///   cut the import step short
    pub fn scan(&self, folders: &[Utf8PathBuf]) -> Result<ScanResult, ScanError> {
        let initial = ScanStatus::indeterminate(folders, ScanStep::Preparing);
        {
            let _starting = self.start_lock.lock();
            if !self.status.is_idle() {
                warn!(folders = ?folders, "scan rejected, library is already scanning");
                return Err(ScanError::AlreadyRunning);
            }
            self.status.set(initial.clone());
        }
        let _guard = ScanGuard { scanner: self };

        info!(folders = ?folders, workers = self.worker_count, "library scan started");
        self.delegates.notify_start(folders);
        self.publish(initial);

        match self.run(folders) {
            Ok(result) => {
                info!(id = ?result.id, summary = %result, "library scan finished");
                self.delegates.notify_finish(&result);
                Ok(result)
            }
            Err(err) => {
                error!(error = %err, step = ?err.step(), "library scan failed");
                self.delegates.notify_fail(&err);
                Err(err)
            }
        }
    }

    /// Returns a copy of the running scan's status, or `None` when idle.
    #[must_use]
    pub fn status(&self) -> Option<ScanStatus> {
        self.status.get()
    }

    /// Returns `true` while a scan is running.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        !self.status.is_idle()
    }

    /// Returns the import counters of the running scan.
    ///
    /// All zero when idle.
    #[must_use]
    pub fn import_progress(&self) -> ImportSnapshot {
        self.progress.snapshot()
    }

    /// Returns the most recently completed scan's result.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Store`] if the result store cannot be read.
    pub fn last_result(&self) -> Result<Option<ScanResult>, ScanError> {
        self.services.results.find_latest().map_err(ScanError::store)
    }

    /// Registers a delegate. Returns `false` if it was already registered.
    pub fn add_delegate(&self, delegate: Arc<dyn ScanDelegate>) -> bool {
        self.delegates.add(delegate)
    }

    /// Unregisters a delegate. Returns `false` if it was not registered.
    pub fn remove_delegate(&self, delegate: &Arc<dyn ScanDelegate>) -> bool {
        self.delegates.remove(delegate)
    }

    /// Cancels the running scan's import workers.
    ///
    /// Imports already in progress finish; the rest are skipped and the scan
    /// fails with [`ScanError::Interrupted`]. Does nothing when no scan is
    /// importing.
    pub fn shutdown_now(&self) {
        match self.pool.lock().as_ref() {
            Some(pool) => {
                warn!(workers = pool.size(), "cancelling song imports");
                pool.cancel();
            }
            None => debug!("shutdown requested with no import pool running"),
        }
    }

    fn run(&self, folders: &[Utf8PathBuf]) -> Result<ScanResult, ScanError> {
        let pool = Arc::new(WorkerPool::new(self.worker_count)?);
        *self.pool.lock() = Some(Arc::clone(&pool));

        let mut work = || self.run_steps(folders, &pool);
        self.services.transactions.run_isolated(&mut work)
    }

    fn run_steps(&self, folders: &[Utf8PathBuf], pool: &WorkerPool) -> Result<ScanResult, ScanError> {
        let services = &self.services;

        let last = services
            .results
            .find_latest()
            .map_err(|e| ScanError::phase(ScanStep::Preparing, e))?;
        let since = watermark(last.as_ref());
        let before = CatalogSnapshot::capture(services.catalog.as_ref())
            .map_err(|e| ScanError::phase(ScanStep::Preparing, e))?;
        debug!(watermark = %since, before = ?before, "captured catalog before scan");

        let started = Instant::now();

        self.publish(ScanStatus::indeterminate(folders, ScanStep::SearchingMediaFiles));
        let library = folders
            .iter()
            .map(|folder| services.folder_scanner.scan_folder(folder))
            .collect::<anyhow::Result<Vec<LibraryFolder>>>()
            .map_err(|e| ScanError::phase(ScanStep::SearchingMediaFiles, e))?;

        self.run_step(folders, ScanStep::CleaningSongs, |on_progress| {
            services.library.clean_songs(&library, on_progress)
        })?;
        self.run_step(folders, ScanStep::CleaningArtworks, |on_progress| {
            services.library.clean_artworks(&library, on_progress)
        })?;

        let songs: Vec<&LibrarySong> = library.iter().flat_map(|f| f.child_songs(true)).collect();
        let found_song_count = u64::try_from(songs.len()).unwrap_or(u64::MAX);
        self.import_songs(folders, pool, &library, &songs)?;

        self.run_step(folders, ScanStep::Normalizing, |on_progress| {
            services.library.normalize(&library, on_progress)
        })?;

        let facts = ScanFacts {
            folders: folders.to_vec(),
            duration: started.elapsed(),
            found_song_count,
        };
        let result = Reconciler::new(services.catalog.as_ref(), before, since)
            .reconcile(facts)
            .map_err(|e| ScanError::phase(ScanStep::Normalizing, e))?;

        services
            .results
            .save(result)
            .map_err(|e| ScanError::phase(ScanStep::Normalizing, e))
    }

    fn run_step<F>(&self, folders: &[Utf8PathBuf], step: ScanStep, op: F) -> Result<(), ScanError>
    where
        F: FnOnce(ProgressFn<'_>) -> anyhow::Result<()>,
    {
        self.publish(ScanStatus::new(folders, step, 0.0));
        let on_progress = |fraction: f64| self.publish(ScanStatus::new(folders, step, fraction));
        op(&on_progress).map_err(|e| ScanError::phase(step, e))
    }

    fn import_songs(
        &self,
        folders: &[Utf8PathBuf],
        pool: &WorkerPool,
        library: &[LibraryFolder],
        songs: &[&LibrarySong],
    ) -> Result<(), ScanError> {
        let total = u64::try_from(songs.len()).unwrap_or(u64::MAX);
        self.progress.begin(total);
        self.publish(ScanStatus::new(folders, ScanStep::ImportingSongs, 0.0));
        info!(songs = total, workers = pool.size(), "importing songs");

        let outcomes = pool.import_all(
            songs,
            |song| self.services.library.import_song(library, song),
            |outcome| self.import_done(folders, total, outcome),
        )?;

        let failed = outcomes.iter().filter(|o| !o.is_imported()).count();
        if failed > 0 {
            warn!(failed, songs = total, "some songs could not be imported");
        }
        Ok(())
    }

    fn import_done(&self, folders: &[Utf8PathBuf], total: u64, outcome: &ImportOutcome) {
        let _publishing = self.publish_lock.lock();
        let done = self.progress.record(outcome.is_imported());
        self.publish_locked(ScanStatus::new(
            folders,
            ScanStep::ImportingSongs,
            fraction_of(done, total),
        ));
    }

    fn publish(&self, status: ScanStatus) {
        let _publishing = self.publish_lock.lock();
        self.publish_locked(status);
    }

    fn publish_locked(&self, status: ScanStatus) {
        self.status.set(status.clone());
        self.delegates.notify_progress(&status);
    }
}

/// Returns the scanner to idle when a scan ends, however it ends.
struct ScanGuard<'a> {
    scanner: &'a LibraryScanner,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        let pool = self.scanner.pool.lock().take();
        drop(pool);
        self.scanner.progress.reset();
        self.scanner.status.clear();
        debug!("library scanner idle");
    }
}
