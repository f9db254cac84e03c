//! Error types for the mlib-scanner crate.
//!
//! This module provides the [`ScanError`] type for everything that can stop
//! a scan, and for the failures of the filesystem folder scanner.

use camino::Utf8PathBuf;
use mlib_core::ScanStep;

/// Boxed error raised by a collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during scanning operations.
///
/// # Error Recovery Strategy
///
/// - **Rejection** ([`ScanError::AlreadyRunning`]): the running scan is
///   unaffected, the caller may retry once the scanner is idle
/// - **Phase failures** ([`ScanError::Phase`], [`ScanError::Interrupted`],
///   [`ScanError::Pool`]): the scan is aborted and delegates are told
/// - **File errors** ([`ScanError::Read`]): logged and skipped by the
///   folder scanner, the folder scan continues
///
/// Failed song imports never appear here; they are recorded as
/// [`ImportOutcome::Failed`](crate::ImportOutcome::Failed).
///
/// # Examples
///
/// ```
/// use mlib_scanner::ScanError;
///
/// let err = ScanError::AlreadyRunning;
/// assert!(err.is_concurrent_rejection());
/// assert_eq!(err.to_string(), "library is already scanning");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A scan was requested while another one is running.
    #[error("library is already scanning")]
    AlreadyRunning,

    /// A step of the scan pipeline failed.
    #[error("scan failed while {step}: {source}")]
    Phase {
        /// The step that failed.
        step: ScanStep,
        /// The underlying collaborator error.
        #[source]
        source: BoxError,
    },

    /// Waiting for the import pool to drain was interrupted by a forced shutdown.
    #[error("interrupted while waiting for song imports to finish")]
    Interrupted,

    /// The result store could not be read outside of a scan.
    #[error("failed to read scan results: {0}")]
    Store(#[source] BoxError),

    /// The import worker pool could not be created.
    #[error("failed to start import workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// Failed to walk a directory.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] ignore::Error),

    /// Failed to read a file.
    #[error("failed to read file {path}: {source}")]
    Read {
        /// The path of the file that couldn't be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid scanner input or configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl ScanError {
    /// Creates a new [`ScanError::Phase`] error.
    #[inline]
    pub fn phase(step: ScanStep, source: impl Into<BoxError>) -> Self {
        Self::Phase {
            step,
            source: source.into(),
        }
    }

    /// Creates a new [`ScanError::Store`] error.
    #[inline]
    pub fn store(source: impl Into<BoxError>) -> Self {
        Self::Store(source.into())
    }

    /// Creates a new [`ScanError::Read`] error.
    #[inline]
    pub fn read(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ScanError::Config`] error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` if the scan was rejected because another one is running.
    #[inline]
    #[must_use]
    pub const fn is_concurrent_rejection(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }

    /// Returns the failed step for phase failures.
    #[inline]
    #[must_use]
    pub const fn step(&self) -> Option<ScanStep> {
        match self {
            Self::Phase { step, .. } => Some(*step),
            Self::Interrupted => Some(ScanStep::ImportingSongs),
            _ => None,
        }
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Read { path, .. } => Some(path),
            _ => None,
        }
    }
}
