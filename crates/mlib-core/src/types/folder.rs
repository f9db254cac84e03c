//! Folder trees discovered on disk.
//!
//! A folder scanner turns each target directory into a [`LibraryFolder`]
//! tree. Songs and images keep the order in which the scanner produced them,
//! and the flattening helpers preserve that order.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tags attached to a song file.
///
/// Every field is optional; an untagged file simply has all fields empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongTags {
    /// Song title.
    pub title: Option<String>,
    /// Artist name.
    pub artist: Option<String>,
    /// Album name.
    pub album: Option<String>,
    /// Genre name.
    pub genre: Option<String>,
    /// Track number within the album.
    pub track: Option<u32>,
}

impl SongTags {
    /// Derives tags from an `Artist/Album/Title.ext` folder layout.
    ///
    /// The title is the file stem; album and artist are the names of the
    /// parent and grandparent directories when they exist below `root`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mlib_core::SongTags;
    /// use camino::Utf8Path;
    ///
    /// let tags = SongTags::from_layout(
    ///     Utf8Path::new("/music"),
    ///     Utf8Path::new("/music/Nina Simone/Pastel Blues/Sinnerman.flac"),
    /// );
    /// assert_eq!(tags.title.as_deref(), Some("Sinnerman"));
    /// assert_eq!(tags.album.as_deref(), Some("Pastel Blues"));
    /// assert_eq!(tags.artist.as_deref(), Some("Nina Simone"));
    /// ```
    #[must_use]
    pub fn from_layout(root: &Utf8Path, path: &Utf8Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let mut dirs = relative
            .parent()
            .map(|p| p.components().map(|c| c.as_str().to_owned()).collect::<Vec<_>>())
            .unwrap_or_default();

        let album = dirs.pop();
        let artist = dirs.pop();

        Self {
            title: path.file_stem().map(str::to_owned),
            artist,
            album,
            genre: None,
            track: None,
        }
    }
}

/// A song file found while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySong {
    /// Absolute path of the file.
    pub path: Utf8PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, if the filesystem reports one.
    pub modified: Option<DateTime<Utc>>,
    /// Tags read for the file.
    pub tags: SongTags,
}

/// An image file found while scanning (candidate artwork).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryImage {
    /// Absolute path of the file.
    pub path: Utf8PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, if the filesystem reports one.
    pub modified: Option<DateTime<Utc>>,
}

/// A directory and everything discovered beneath it.
///
/// # Examples
///
/// ```
/// use mlib_core::{LibraryFolder, LibrarySong, SongTags};
/// use camino::Utf8PathBuf;
///
/// let song = |p: &str| LibrarySong {
///     path: Utf8PathBuf::from(p),
///     size: 1,
///     modified: None,
///     tags: SongTags::default(),
/// };
///
/// let mut root = LibraryFolder::new("/music");
/// root.songs.push(song("/music/intro.mp3"));
/// let mut album = LibraryFolder::new("/music/album");
/// album.songs.push(song("/music/album/01.mp3"));
/// root.children.push(album);
///
/// assert_eq!(root.child_songs(false).len(), 1);
/// assert_eq!(root.child_songs(true).len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFolder {
    /// Path of the directory.
    pub path: Utf8PathBuf,
    /// Song files directly inside this directory.
    pub songs: Vec<LibrarySong>,
    /// Image files directly inside this directory.
    pub images: Vec<LibraryImage>,
    /// Subdirectories.
    pub children: Vec<LibraryFolder>,
}

impl LibraryFolder {
    /// Creates an empty folder for `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            songs: Vec::new(),
            images: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Returns the songs of this folder, and of all descendants when `recursive`.
    ///
    /// Own songs come first, followed by each child's songs in order.
    #[must_use]
    pub fn child_songs(&self, recursive: bool) -> Vec<&LibrarySong> {
        let mut songs: Vec<&LibrarySong> = self.songs.iter().collect();
        if recursive {
            for child in &self.children {
                songs.extend(child.child_songs(true));
            }
        }
        songs
    }

    /// Returns the images of this folder, and of all descendants when `recursive`.
    #[must_use]
    pub fn child_images(&self, recursive: bool) -> Vec<&LibraryImage> {
        let mut images: Vec<&LibraryImage> = self.images.iter().collect();
        if recursive {
            for child in &self.children {
                images.extend(child.child_images(true));
            }
        }
        images
    }

    /// Returns `true` if `path` is a song anywhere in this tree.
    #[must_use]
    pub fn contains_song(&self, path: &Utf8Path) -> bool {
        self.songs.iter().any(|s| s.path.as_path() == path)
            || self.children.iter().any(|c| c.contains_song(path))
    }

    /// Returns `true` if `path` is an image anywhere in this tree.
    #[must_use]
    pub fn contains_image(&self, path: &Utf8Path) -> bool {
        self.images.iter().any(|i| i.path.as_path() == path)
            || self.children.iter().any(|c| c.contains_image(path))
    }
}
