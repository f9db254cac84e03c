//! The persisted outcome of a completed scan.

use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts for one entity kind after a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityTally {
    /// Number of entities in the catalog after the scan.
    pub count: u64,
    /// Entities created since the previous scan.
    pub created: u64,
    /// Entities created before and updated since the previous scan.
    pub updated: u64,
    /// Estimated number of entities removed during the scan.
    pub deleted: u64,
}

/// Counts for stored artwork after a scan.
///
/// Artwork is replaced rather than updated, so there is no `updated` count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtworkTally {
    /// Number of artworks in the catalog after the scan.
    pub count: u64,
    /// Artworks created since the previous scan.
    pub created: u64,
    /// Estimated number of artworks removed during the scan.
    pub deleted: u64,
}

/// The record of one completed scan.
///
/// Built once at the end of a successful scan, saved, and never modified
/// afterwards. The most recent result's [`date`](Self::date) is the
/// watermark the next scan classifies entities against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Identifier assigned by the result store, `None` until saved.
    pub id: Option<u64>,
    /// When the scan completed.
    pub date: DateTime<Utc>,
    /// Absolute paths of the scanned folders.
    pub folders: Vec<Utf8PathBuf>,
    /// Wall-clock duration of the search, clean, import and normalize steps, in nanoseconds.
    pub duration_nanos: u64,
    /// Total size of all songs in bytes.
    pub song_size: u64,
    /// Total size of all artwork in bytes.
    pub artwork_size: u64,
    /// Genre counts.
    pub genre: EntityTally,
    /// Artist counts.
    pub artist: EntityTally,
    /// Album counts.
    pub album: EntityTally,
    /// Song counts.
    pub song: EntityTally,
    /// Artwork counts.
    pub artwork: ArtworkTally,
    /// Number of song files found on disk, whether or not they imported.
    pub found_song_count: u64,
}

impl ScanResult {
    /// Returns the scan duration.
    #[inline]
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_nanos)
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tally = |t: &EntityTally| format!("{} (+{}/~{}/-{})", t.count, t.created, t.updated, t.deleted);

        write!(
            f,
            "scanned {} folder(s) in {:.3}s, found {} song file(s); songs {}, artists {}, albums {}, genres {}, artworks {} (+{}/-{})",
            self.folders.len(),
            self.duration().as_secs_f64(),
            self.found_song_count,
            tally(&self.song),
            tally(&self.artist),
            tally(&self.album),
            tally(&self.genre),
            self.artwork.count,
            self.artwork.created,
            self.artwork.deleted,
        )
    }
}
