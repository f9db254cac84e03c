//! Collaborator seams of the scan orchestrator.
//!
//! The orchestrator only sequences work. Discovering files, upserting
//! entities and storing results are delegated to implementations of the
//! traits below. [`FsFolderScanner`](crate::FsFolderScanner) and
//! [`MemoryCatalog`](crate::MemoryCatalog) are the implementations shipped
//! with this crate.
//!
//! All traits are object safe and used behind `Arc<dyn ...>`.

use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use mlib_core::{EntityKind, LibraryFolder, LibrarySong, ScanResult, Song};

use crate::error::ScanError;

/// Progress callback handed to long-running library operations.
///
/// Receives a fraction in `[0.0, 1.0]`.
pub type ProgressFn<'a> = &'a (dyn Fn(f64) + Sync);

/// Turns a directory into a tree of discovered media files.
pub trait FolderScanner: Send + Sync {
    /// Scans `path` and everything beneath it.
    ///
    /// A file that cannot be inspected should be skipped, not fail the folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder itself cannot be scanned.
    fn scan_folder(&self, path: &Utf8Path) -> anyhow::Result<LibraryFolder>;
}

/// Applies the discovered folder trees to the catalog.
pub trait LibraryService: Send + Sync {
    /// Removes songs whose files are no longer part of `library`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be updated.
    fn clean_songs(&self, library: &[LibraryFolder], on_progress: ProgressFn<'_>) -> anyhow::Result<()>;

    /// Removes artwork that is no longer referenced or whose file disappeared.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be updated.
    fn clean_artworks(&self, library: &[LibraryFolder], on_progress: ProgressFn<'_>) -> anyhow::Result<()>;

    /// Creates or updates the catalog entry for one song file.
    ///
    /// Called concurrently from the import workers.
    ///
    /// # Errors
    ///
    /// Returns an error if this file cannot be imported. The scan continues.
    fn import_song(&self, library: &[LibraryFolder], song: &LibrarySong) -> anyhow::Result<Song>;

    /// Prunes entities left without songs and fixes up derived data.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be updated.
    fn normalize(&self, library: &[LibraryFolder], on_progress: ProgressFn<'_>) -> anyhow::Result<()>;
}

/// Read-only counts and sums over the catalog.
pub trait CatalogStore: Send + Sync {
    /// Returns the number of entities of `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn count(&self, kind: EntityKind) -> anyhow::Result<u64>;

    /// Returns the number of entities of `kind` created strictly after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn count_created_after(&self, kind: EntityKind, since: DateTime<Utc>) -> anyhow::Result<u64>;

    /// Returns the number of entities of `kind` created at or before `since`
    /// and updated strictly after it.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn count_updated_after(&self, kind: EntityKind, since: DateTime<Utc>) -> anyhow::Result<u64>;

    /// Returns the summed byte size of all entities of `kind`.
    ///
    /// Only songs and artwork have a size; other kinds report zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn total_size(&self, kind: EntityKind) -> anyhow::Result<u64>;
}

/// Durable storage of scan results.
pub trait ScanResultStore: Send + Sync {
    /// Persists `result`, returning it with its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the result cannot be stored.
    fn save(&self, result: ScanResult) -> anyhow::Result<ScanResult>;

    /// Returns the result with the latest completion date, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_latest(&self) -> anyhow::Result<Option<ScanResult>>;
}

/// Work executed as one unit by a [`TransactionRunner`].
pub type ScanWork<'a> = &'a mut dyn FnMut() -> Result<ScanResult, ScanError>;

/// Runs the whole scan as a single unit of work.
///
/// The unit must be independent of any unit the caller may have open, so
/// that the caller rolling back never discards a completed scan.
pub trait TransactionRunner: Send + Sync {
    /// Runs `work` in a new unit of work, committing on `Ok` and rolling
    /// back on `Err`.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`, or a failure to commit.
    fn run_isolated(&self, work: ScanWork<'_>) -> Result<ScanResult, ScanError>;
}

/// A [`TransactionRunner`] that runs work directly, without rollback.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl TransactionRunner for Immediate {
    fn run_isolated(&self, work: ScanWork<'_>) -> Result<ScanResult, ScanError> {
        work()
    }
}

/// The set of collaborators a [`LibraryScanner`](crate::LibraryScanner) works with.
#[derive(Clone)]
pub struct ScanServices {
    /// Discovers media files.
    pub folder_scanner: Arc<dyn FolderScanner>,
    /// Cleans, imports and normalizes.
    pub library: Arc<dyn LibraryService>,
    /// Answers the counts used for reconciliation.
    pub catalog: Arc<dyn CatalogStore>,
    /// Stores scan results.
    pub results: Arc<dyn ScanResultStore>,
    /// Wraps the scan in one unit of work.
    pub transactions: Arc<dyn TransactionRunner>,
}

impl ScanServices {
    /// Builds services where one value provides every catalog-side role.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use mlib_core::ScanConfig;
    /// use mlib_scanner::{FsFolderScanner, MemoryCatalog, ScanServices};
    ///
    /// let catalog = Arc::new(MemoryCatalog::new());
    /// let scanner = Arc::new(FsFolderScanner::new(ScanConfig::default()));
    /// let services = ScanServices::with_catalog(scanner, catalog);
    /// ```
    #[must_use]
    pub fn with_catalog<C>(folder_scanner: Arc<dyn FolderScanner>, catalog: Arc<C>) -> Self
    where
        C: LibraryService + CatalogStore + ScanResultStore + TransactionRunner + 'static,
    {
        Self {
            folder_scanner,
            library: Arc::clone(&catalog) as Arc<dyn LibraryService>,
            catalog: Arc::clone(&catalog) as Arc<dyn CatalogStore>,
            results: Arc::clone(&catalog) as Arc<dyn ScanResultStore>,
            transactions: catalog,
        }
    }
}

impl fmt::Debug for ScanServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanServices").finish_non_exhaustive()
    }
}
