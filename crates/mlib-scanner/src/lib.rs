//! Single-flight scan orchestration for a media library.
//!
//! This crate scans media folders and reconciles what it finds with a
//! catalog of songs, artists, albums, genres and artwork. At most one scan
//! runs at a time; observers follow it through status polling or pushed
//! notifications.
//!
//! # Overview
//!
//! The main entry point is [`LibraryScanner`], which combines:
//!
//! - [`StatusCell`]: the live [`ScanStatus`](mlib_core::ScanStatus), empty when idle
//! - [`DelegateRegistry`]: observers notified on start, progress, finish and failure
//! - [`WorkerPool`]: a fixed-size rayon pool importing one song per task
//! - [`ImportProgress`]: atomic counters behind the import step's fraction
//! - [`Reconciler`]: created/updated/deleted counts against the last scan
//!
//! Everything the scanner does to the outside world goes through the
//! collaborator traits in [`ScanServices`]. The crate ships
//! [`FsFolderScanner`] for real directories and [`MemoryCatalog`] for the
//! catalog side.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mlib_core::ScanConfig;
//! use mlib_scanner::{
//!     FsFolderScanner, LibraryScanner, LoggingDelegate, MemoryCatalog, ScanServices,
//! };
//!
//! let config = ScanConfig::default();
//! let services = ScanServices::with_catalog(
//!     Arc::new(FsFolderScanner::new(config.clone())),
//!     Arc::new(MemoryCatalog::new()),
//! );
//!
//! let scanner = LibraryScanner::with_config(services, &config);
//! scanner.add_delegate(Arc::new(LoggingDelegate::new()));
//!
//! let result = scanner.scan(&[])?;
//! assert_eq!(result.found_song_count, 0);
//! assert!(scanner.status().is_none());
//! # Ok::<(), mlib_scanner::ScanError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! LibraryScanner
//!     │
//!     ├── StatusCell (RwLock slot, idle when empty)
//!     ├── DelegateRegistry (copy-on-notify, isolated callbacks)
//!     ├── WorkerPool (rayon, one per scan)
//!     │       └── ImportProgress (atomic counters)
//!     ├── Reconciler (CatalogSnapshot + watermark)
//!     │
//!     └── ScanServices
//!             ├── FolderScanner ─── FsFolderScanner ─── MediaWalker (ignore crate)
//!             └── LibraryService, CatalogStore,
//!                 ScanResultStore, TransactionRunner ─── MemoryCatalog
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod collab;
mod delegate;
mod error;
mod fs;
mod memory;
mod orchestrator;
mod pool;
mod progress;
mod reconcile;
mod status;
mod walker;

pub use collab::{
    CatalogStore, FolderScanner, Immediate, LibraryService, ProgressFn, ScanResultStore,
    ScanServices, ScanWork, TransactionRunner,
};
pub use delegate::{DelegateRegistry, LoggingDelegate, ScanDelegate};
pub use error::{BoxError, ScanError};
pub use fs::FsFolderScanner;
pub use memory::{CatalogError, MemoryCatalog};
pub use orchestrator::LibraryScanner;
pub use pool::{ImportOutcome, WorkerPool};
pub use progress::{ImportProgress, ImportSnapshot, fraction_of};
pub use reconcile::{CatalogSnapshot, Reconciler, ScanFacts, deleted_count, watermark};
pub use status::StatusCell;
pub use walker::{MediaFile, MediaKind, MediaWalker};
