//! Folder scanning on the local filesystem.

use camino::Utf8Path;
use mlib_core::{LibraryFolder, LibraryImage, LibrarySong, ScanConfig, SongTags};
use tracing::debug;

use crate::collab::FolderScanner;
use crate::walker::{MediaFile, MediaKind, MediaWalker};

/// A [`FolderScanner`] that walks real directories.
///
/// Song tags are derived from the `Artist/Album/Title.ext` layout below the
/// scanned folder. Directories without any media file are left out of the
/// tree.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use mlib_core::ScanConfig;
/// use mlib_scanner::{FolderScanner, FsFolderScanner};
///
/// let scanner = FsFolderScanner::new(ScanConfig::default());
/// let folder = scanner.scan_folder(Utf8Path::new("/srv/music"))?;
/// println!("{} songs", folder.child_songs(true).len());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FsFolderScanner {
    config: ScanConfig,
}

impl FsFolderScanner {
    /// Creates a scanner using the extensions and traversal settings of `config`.
    #[must_use]
    pub const fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration in use.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }
}

impl FolderScanner for FsFolderScanner {
    fn scan_folder(&self, path: &Utf8Path) -> anyhow::Result<LibraryFolder> {
        let walker = MediaWalker::new(path, &self.config)?;
        let files = walker.collect_files();

        let mut root = LibraryFolder::new(walker.root());
        for file in files {
            add_file(&mut root, walker.root(), file);
        }

        debug!(
            folder = %path,
            songs = root.child_songs(true).len(),
            images = root.child_images(true).len(),
            "scanned folder"
        );
        Ok(root)
    }
}

/// Places `file` in the folder of `tree` matching its parent directory.
fn add_file(tree: &mut LibraryFolder, root: &Utf8Path, file: MediaFile) {
    let relative_dir = file
        .path
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(|dir| dir.components().map(|c| c.as_str().to_owned()).collect::<Vec<_>>())
        .unwrap_or_default();

    let folder = folder_at(tree, &relative_dir);
    match file.kind {
        MediaKind::Song => {
            let tags = SongTags::from_layout(root, &file.path);
            folder.songs.push(LibrarySong {
                path: file.path,
                size: file.size,
                modified: file.modified,
                tags,
            });
        }
        MediaKind::Image => folder.images.push(LibraryImage {
            path: file.path,
            size: file.size,
            modified: file.modified,
        }),
    }
}

/// Returns the descendant of `tree` at `dirs`, creating missing folders.
fn folder_at<'a>(tree: &'a mut LibraryFolder, dirs: &[String]) -> &'a mut LibraryFolder {
    let mut current = tree;
    for dir in dirs {
        let path = current.path.join(dir);
        let existing = current.children.iter().position(|c| c.path == path);
        let index = match existing {
            Some(index) => index,
            None => {
                current.children.push(LibraryFolder::new(path));
                current.children.len() - 1
            }
        };
        current = &mut current.children[index];
    }
    current
}
