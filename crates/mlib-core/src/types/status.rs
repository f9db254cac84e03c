//! Scan progress types.
//!
//! A scan moves through six [`ScanStep`]s in order. While it runs, observers
//! see immutable [`ScanStatus`] snapshots; a new snapshot replaces the old
//! one on every change.

use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// One step of the scan pipeline.
///
/// Steps are numbered from 1 and always run in declaration order.
///
/// # Examples
///
/// ```
/// use mlib_core::ScanStep;
///
/// assert_eq!(ScanStep::Preparing.number(), 1);
/// assert_eq!(ScanStep::ImportingSongs.code(), "importingSongs");
/// assert_eq!(ScanStep::COUNT, 6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanStep {
    /// Counting catalog entities and reading the previous scan.
    Preparing,
    /// Walking the target folders.
    SearchingMediaFiles,
    /// Removing songs whose files disappeared.
    CleaningSongs,
    /// Removing artwork that is no longer referenced.
    CleaningArtworks,
    /// Importing every discovered song file.
    ImportingSongs,
    /// Pruning and normalizing catalog entities.
    Normalizing,
}

impl ScanStep {
    /// Total number of steps in a scan.
    pub const COUNT: u8 = 6;

    /// All steps in execution order.
    pub const ALL: [Self; Self::COUNT as usize] = [
        Self::Preparing,
        Self::SearchingMediaFiles,
        Self::CleaningSongs,
        Self::CleaningArtworks,
        Self::ImportingSongs,
        Self::Normalizing,
    ];

    /// Returns the 1-based position of this step.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Preparing => 1,
            Self::SearchingMediaFiles => 2,
            Self::CleaningSongs => 3,
            Self::CleaningArtworks => 4,
            Self::ImportingSongs => 5,
            Self::Normalizing => 6,
        }
    }

    /// Returns the symbolic code of this step.
    #[inline]
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::SearchingMediaFiles => "searchingMediaFiles",
            Self::CleaningSongs => "cleaningSongs",
            Self::CleaningArtworks => "cleaningArtworks",
            Self::ImportingSongs => "importingSongs",
            Self::Normalizing => "normalizing",
        }
    }

    /// Returns `true` if this step reports fractional progress.
    ///
    /// Preparing and searching have no meaningful fraction.
    #[inline]
    #[must_use]
    pub const fn has_progress(self) -> bool {
        !matches!(self, Self::Preparing | Self::SearchingMediaFiles)
    }
}

impl fmt::Display for ScanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An immutable snapshot of a running scan.
///
/// The `progress` field holds a fraction in `[0.0, 1.0]`, or
/// [`ScanStatus::INDETERMINATE`] for steps without fine-grained progress.
///
/// # Examples
///
/// ```
/// use mlib_core::{ScanStatus, ScanStep};
/// use camino::Utf8PathBuf;
///
/// let folders = vec![Utf8PathBuf::from("/music")];
/// let status = ScanStatus::indeterminate(&folders, ScanStep::SearchingMediaFiles);
/// assert_eq!(status.step_number(), 2);
/// assert_eq!(status.fraction(), None);
///
/// let status = ScanStatus::new(&folders, ScanStep::ImportingSongs, 0.25);
/// assert_eq!(status.fraction(), Some(0.25));
/// assert_eq!(status.total_steps(), 6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    target_folders: Vec<Utf8PathBuf>,
    step: ScanStep,
    progress: f64,
}

impl ScanStatus {
    /// Sentinel progress value for steps without a known fraction.
    pub const INDETERMINATE: f64 = -1.0;

    /// Creates a status with a progress fraction.
    ///
    /// Fractions are clamped into `[0.0, 1.0]`; a negative value is kept as
    /// [`INDETERMINATE`](Self::INDETERMINATE).
    #[must_use]
    pub fn new(target_folders: &[Utf8PathBuf], step: ScanStep, progress: f64) -> Self {
        let progress = if progress < 0.0 || progress.is_nan() {
            Self::INDETERMINATE
        } else {
            progress.min(1.0)
        };

        Self {
            target_folders: target_folders.to_vec(),
            step,
            progress,
        }
    }

    /// Creates a status without a progress fraction.
    #[must_use]
    pub fn indeterminate(target_folders: &[Utf8PathBuf], step: ScanStep) -> Self {
        Self::new(target_folders, step, Self::INDETERMINATE)
    }

    /// Returns the folders being scanned.
    #[inline]
    #[must_use]
    pub fn target_folders(&self) -> &[Utf8PathBuf] {
        &self.target_folders
    }

    /// Returns the current step.
    #[inline]
    #[must_use]
    pub const fn step(&self) -> ScanStep {
        self.step
    }

    /// Returns the 1-based number of the current step.
    #[inline]
    #[must_use]
    pub const fn step_number(&self) -> u8 {
        self.step.number()
    }

    /// Returns the symbolic code of the current step.
    #[inline]
    #[must_use]
    pub const fn step_code(&self) -> &'static str {
        self.step.code()
    }

    /// Returns the raw progress value, possibly [`INDETERMINATE`](Self::INDETERMINATE).
    #[inline]
    #[must_use]
    pub const fn progress(&self) -> f64 {
        self.progress
    }

    /// Returns the progress fraction, or `None` when indeterminate.
    #[inline]
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        (self.progress >= 0.0).then_some(self.progress)
    }

    /// Returns the total number of steps in a scan.
    #[inline]
    #[must_use]
    pub const fn total_steps(&self) -> u8 {
        ScanStep::COUNT
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {}/{} ({})",
            self.step_number(),
            self.total_steps(),
            self.step_code()
        )?;
        if let Some(fraction) = self.fraction() {
            write!(f, " {:.1}%", fraction * 100.0)?;
        }
        Ok(())
    }
}
