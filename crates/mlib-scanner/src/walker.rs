//! Directory traversal for media files.
//!
//! This module provides [`MediaWalker`], which uses the `ignore` crate to
//! walk a library folder and pick out song and image files.
//!
//! # Features
//!
//! - Skips hidden directories and files, honours `.ignore` files
//! - Filters by the song and image extensions of a [`ScanConfig`]
//! - Visits entries sorted by file name, so repeated walks agree
//! - Converts paths to UTF-8 [`Utf8PathBuf`](camino::Utf8PathBuf)
//!
//! An entry that cannot be read is logged and skipped; it never fails the
//! walk.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use mlib_core::ScanConfig;
use tracing::{debug, warn};

use crate::error::ScanError;

/// Directories that never hold library media.
const SKIP_DIRECTORIES: &[&str] = &["@eaDir", "$RECYCLE.BIN", "lost+found", "System Volume Information"];

/// What a discovered media file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// A song file.
    Song,
    /// An image file, candidate artwork.
    Image,
}

/// A media file found by a [`MediaWalker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Absolute path of the file.
    pub path: Utf8PathBuf,
    /// Song or image.
    pub kind: MediaKind,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, if available.
    pub modified: Option<DateTime<Utc>>,
}

/// A walker that discovers media files in a directory tree.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use mlib_core::ScanConfig;
/// use mlib_scanner::MediaWalker;
///
/// let walker = MediaWalker::new(Utf8Path::new("/srv/music"), &ScanConfig::default())?
///     .with_skip_dirs(&["incoming"]);
/// let files = walker.collect_files();
///
/// println!("Found {} media files", files.len());
/// # Ok::<(), mlib_scanner::ScanError>(())
/// ```
#[derive(Debug)]
pub struct MediaWalker {
    /// The root directory to walk.
    root: Utf8PathBuf,
    /// Song extensions, lowercase.
    song_extensions: Vec<String>,
    /// Image extensions, lowercase.
    image_extensions: Vec<String>,
    /// Additional directories to skip.
    skip_dirs: Vec<String>,
    /// Whether to follow symbolic links.
    follow_links: bool,
}

impl MediaWalker {
    /// Creates a walker for `root` using the extensions and traversal
    /// settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if the root path doesn't exist or
    /// isn't a directory.
    pub fn new(root: &Utf8Path, config: &ScanConfig) -> Result<Self, ScanError> {
        if !root.exists() {
            return Err(ScanError::config(format!("folder does not exist: {root}")));
        }
        if !root.is_dir() {
            return Err(ScanError::config(format!("not a directory: {root}")));
        }

        let lowercase = |exts: &[String]| -> Vec<String> {
            exts.iter().map(|e| e.to_ascii_lowercase()).collect()
        };

        Ok(Self {
            root: root.to_owned(),
            song_extensions: lowercase(&config.song_extensions),
            image_extensions: lowercase(&config.image_extensions),
            skip_dirs: config.skip_dirs.clone(),
            follow_links: config.follow_links,
        })
    }

    /// Adds directories to skip during traversal.
    ///
    /// These are in addition to the built-in skip list and the configured
    /// `skip_dirs`.
    #[must_use]
    pub fn with_skip_dirs(mut self, dirs: &[&str]) -> Self {
        self.skip_dirs.extend(dirs.iter().map(ToString::to_string));
        self
    }

    /// Configures whether to follow symbolic links.
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Collects every song and image file under the root.
    #[must_use]
    pub fn collect_files(&self) -> Vec<MediaFile> {
        let mut files = Vec::new();

        for result in self.build_walker() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %self.root, error = %ScanError::from(err), "skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let Some(path) = Utf8Path::from_path(entry.path()) else {
                let err = ScanError::NonUtf8Path(entry.path().to_owned());
                warn!(error = %err, "skipping file");
                continue;
            };

            if self.should_skip_path(path) {
                continue;
            }

            let Some(kind) = self.classify(path) else {
                continue;
            };

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %path, error = %err, "skipping file without metadata");
                    continue;
                }
            };

            debug!(path = %path, kind = ?kind, size = metadata.len(), "found media file");
            files.push(MediaFile {
                path: path.to_owned(),
                kind,
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        files
    }

    /// Returns the root directory being walked.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Builds the ignore walker with configured settings.
    fn build_walker(&self) -> ignore::Walk {
        WalkBuilder::new(&self.root)
            .standard_filters(true)
            .follow_links(self.follow_links)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build()
    }

    /// Returns the media kind of `path` based on its extension.
    fn classify(&self, path: &Utf8Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_ascii_lowercase();
        if self.song_extensions.contains(&ext) {
            Some(MediaKind::Song)
        } else if self.image_extensions.contains(&ext) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }

    /// Checks if a path lies below a skipped directory.
    fn should_skip_path(&self, path: &Utf8Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.components().any(|component| {
            let name = component.as_str();
            SKIP_DIRECTORIES.contains(&name) || self.skip_dirs.iter().any(|d| d == name)
        })
    }
}
