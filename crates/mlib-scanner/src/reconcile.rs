//! Before/after reconciliation of catalog counts.
//!
//! A scan captures a [`CatalogSnapshot`] before touching the catalog. Once
//! every step ran, a [`Reconciler`] compares that snapshot with the catalog
//! as it is now and with the timestamps of its entities, measured against
//! the watermark (the completion time of the previous scan), and builds
//! the [`ScanResult`].
//!
//! For each kind with update tracking:
//!
//! - `created` counts entities created after the watermark
//! - `updated` counts entities created at or before the watermark and
//!   updated after it
//! - `deleted` is estimated by [`deleted_count`]
//!
//! Artwork has no `updated` count.

use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use mlib_core::{ArtworkTally, EntityKind, EntityTally, ScanResult};

use crate::collab::CatalogStore;

/// Estimates how many entities were deleted during a scan.
///
/// Computed as `before + created - after`, saturating at zero. Entities that
/// were both created and deleted within the scan are not visible, so this is
/// a lower bound rather than an exact count.
///
/// # Examples
///
/// ```
/// use mlib_scanner::deleted_count;
///
/// assert_eq!(deleted_count(10, 12, 3), 1);
/// assert_eq!(deleted_count(5, 3, 0), 2);
/// assert_eq!(deleted_count(0, 4, 1), 0);
/// ```
#[inline]
#[must_use]
pub const fn deleted_count(before: u64, after: u64, created: u64) -> u64 {
    before.saturating_add(created).saturating_sub(after)
}

/// Returns the watermark for a scan given the previous result, if any.
///
/// Without a previous scan every entity counts as created.
#[must_use]
pub fn watermark(last: Option<&ScanResult>) -> DateTime<Utc> {
    last.map_or(DateTime::UNIX_EPOCH, |result| result.date)
}

/// Entity counts captured at the start of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CatalogSnapshot {
    genre: u64,
    artist: u64,
    album: u64,
    song: u64,
    artwork: u64,
}

impl CatalogSnapshot {
    /// Reads the current count of every entity kind.
    ///
    /// # Errors
    ///
    /// Returns the first error of the store.
    pub fn capture(store: &dyn CatalogStore) -> anyhow::Result<Self> {
        Ok(Self {
            genre: store.count(EntityKind::Genre)?,
            artist: store.count(EntityKind::Artist)?,
            album: store.count(EntityKind::Album)?,
            song: store.count(EntityKind::Song)?,
            artwork: store.count(EntityKind::Artwork)?,
        })
    }

    /// Returns the captured count for `kind`.
    #[must_use]
    pub const fn count(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Genre => self.genre,
            EntityKind::Artist => self.artist,
            EntityKind::Album => self.album,
            EntityKind::Song => self.song,
            EntityKind::Artwork => self.artwork,
        }
    }
}

/// What the scan itself observed, as opposed to what the catalog holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFacts {
    /// The scanned folders.
    pub folders: Vec<Utf8PathBuf>,
    /// Time spent from the start of searching to the end of normalizing.
    pub duration: Duration,
    /// Number of song files found on disk.
    pub found_song_count: u64,
}

/// Builds the [`ScanResult`] of a finished scan.
#[derive(Clone, Copy)]
pub struct Reconciler<'a> {
    store: &'a dyn CatalogStore,
    before: CatalogSnapshot,
    watermark: DateTime<Utc>,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler against `store`.
    #[must_use]
    pub const fn new(
        store: &'a dyn CatalogStore,
        before: CatalogSnapshot,
        watermark: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            before,
            watermark,
        }
    }

    /// Computes the counts for one kind that tracks updates.
    ///
    /// # Errors
    ///
    /// Returns the first error of the store.
    pub fn tally(&self, kind: EntityKind) -> anyhow::Result<EntityTally> {
        let count = self.store.count(kind)?;
        let created = self.store.count_created_after(kind, self.watermark)?;
        let updated = if kind.tracks_updates() {
            self.store.count_updated_after(kind, self.watermark)?
        } else {
            0
        };

        Ok(EntityTally {
            count,
            created,
            updated,
            deleted: deleted_count(self.before.count(kind), count, created),
        })
    }

    /// Computes the artwork counts.
    ///
    /// # Errors
    ///
    /// Returns the first error of the store.
    pub fn artwork_tally(&self) -> anyhow::Result<ArtworkTally> {
        let count = self.store.count(EntityKind::Artwork)?;
        let created = self
            .store
            .count_created_after(EntityKind::Artwork, self.watermark)?;

        Ok(ArtworkTally {
            count,
            created,
            deleted: deleted_count(self.before.count(EntityKind::Artwork), count, created),
        })
    }

    /// Builds the full result, dated now.
    ///
    /// # Errors
    ///
    /// Returns the first error of the store.
    pub fn reconcile(&self, facts: ScanFacts) -> anyhow::Result<ScanResult> {
        let duration_nanos = u64::try_from(facts.duration.as_nanos()).unwrap_or(u64::MAX);

        Ok(ScanResult {
            id: None,
            date: Utc::now(),
            folders: facts.folders,
            duration_nanos,
            song_size: self.store.total_size(EntityKind::Song)?,
            artwork_size: self.store.total_size(EntityKind::Artwork)?,
            genre: self.tally(EntityKind::Genre)?,
            artist: self.tally(EntityKind::Artist)?,
            album: self.tally(EntityKind::Album)?,
            song: self.tally(EntityKind::Song)?,
            artwork: self.artwork_tally()?,
            found_song_count: facts.found_song_count,
        })
    }
}
