//! Catalog entity types.

use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A kind of entity stored in the catalog.
///
/// # Examples
///
/// ```
/// use mlib_core::EntityKind;
///
/// assert_eq!(EntityKind::TRACKED.len(), 4);
/// assert!(EntityKind::Song.tracks_updates());
/// assert!(!EntityKind::Artwork.tracks_updates());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A music genre.
    Genre,
    /// A performing artist.
    Artist,
    /// An album of an artist.
    Album,
    /// A single song file.
    Song,
    /// A stored artwork image, embedded or from a file.
    Artwork,
}

impl EntityKind {
    /// Kinds that carry both creation and update timestamps.
    pub const TRACKED: [Self; 4] = [Self::Genre, Self::Artist, Self::Album, Self::Song];

    /// Returns `true` if entities of this kind can be updated in place.
    ///
    /// Artwork is binary content and is only ever created or deleted.
    #[inline]
    #[must_use]
    pub const fn tracks_updates(self) -> bool {
        !matches!(self, Self::Artwork)
    }

    /// Returns a lowercase label for this kind.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Genre => "genre",
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Song => "song",
            Self::Artwork => "artwork",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A song as stored in the catalog after a successful import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Catalog identifier.
    pub id: u64,
    /// Path of the song file.
    pub path: Utf8PathBuf,
    /// Song title.
    pub title: String,
    /// Artist name, if known.
    pub artist: Option<String>,
    /// Album name, if known.
    pub album: Option<String>,
    /// Genre name, if known.
    pub genre: Option<String>,
    /// File size in bytes.
    pub size: u64,
}
