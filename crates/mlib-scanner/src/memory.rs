//! An in-memory catalog, optionally persisted to a JSON file.
//!
//! [`MemoryCatalog`] implements every catalog-side collaborator of the
//! scanner: it imports, cleans and normalizes ([`LibraryService`]), answers
//! counts ([`CatalogStore`]), stores results ([`ScanResultStore`]) and wraps
//! a scan in a unit of work ([`TransactionRunner`]).
//!
//! # Units of work
//!
//! [`TransactionRunner::run_isolated`] snapshots the whole state before the
//! work runs. The snapshot is restored unless the work succeeds and the
//! state reaches the backing file, when there is one. A panic inside the
//! work rolls back too.
//!
//! Progress callbacks are never invoked while the state lock is held, so
//! observers may read the catalog from inside them.
//!
//! # Entities
//!
//! Songs are keyed by path, artists by name, albums by artist and name,
//! genres by name, artwork by image path. Every entity records when it was
//! created; everything except artwork also records when it was last
//! updated. Importing an unchanged song touches nothing.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use mlib_core::{EntityKind, LibraryFolder, LibrarySong, ScanResult, ScanStep, Song};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collab::{
    CatalogStore, LibraryService, ProgressFn, ScanResultStore, ScanWork, TransactionRunner,
};
use crate::error::ScanError;
use crate::progress::fraction_of;

/// Errors raised while loading or saving a catalog file.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog file could not be read or written.
    #[error("catalog file {path}: {source}")]
    Io {
        /// The catalog file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The catalog file is not a valid catalog.
    #[error("catalog file {path} is corrupt: {source}")]
    Parse {
        /// The catalog file.
        path: Utf8PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Creation and update times of a named entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Stamp {
    id: u64,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SongRecord {
    id: u64,
    title: String,
    artist: Option<String>,
    album: Option<String>,
    genre: Option<String>,
    size: u64,
    modified: Option<DateTime<Utc>>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl SongRecord {
    fn to_song(&self, path: &Utf8Path) -> Song {
        Song {
            id: self.id,
            path: path.to_owned(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            genre: self.genre.clone(),
            size: self.size,
        }
    }

    fn same_content(&self, other: &Self) -> bool {
        self.title == other.title
            && self.artist == other.artist
            && self.album == other.album
            && self.genre == other.genre
            && self.size == other.size
            && self.modified == other.modified
    }

    fn album_key(&self) -> Option<String> {
        self.album
            .as_deref()
            .map(|album| album_key(self.artist.as_deref(), album))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ArtworkRecord {
    id: u64,
    size: u64,
    created: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CatalogState {
    next_id: u64,
    songs: FxHashMap<Utf8PathBuf, SongRecord>,
    artists: FxHashMap<String, Stamp>,
    albums: FxHashMap<String, Stamp>,
    genres: FxHashMap<String, Stamp>,
    artworks: FxHashMap<Utf8PathBuf, ArtworkRecord>,
    results: Vec<ScanResult>,
}

impl CatalogState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn named_mut(&mut self, kind: EntityKind) -> Option<&mut FxHashMap<String, Stamp>> {
        match kind {
            EntityKind::Artist => Some(&mut self.artists),
            EntityKind::Album => Some(&mut self.albums),
            EntityKind::Genre => Some(&mut self.genres),
            EntityKind::Song | EntityKind::Artwork => None,
        }
    }

    /// Creates the named entity, or marks it updated.
    fn touch(&mut self, kind: EntityKind, name: String, now: DateTime<Utc>) {
        let id = self.next_id + 1;
        let Some(table) = self.named_mut(kind) else {
            return;
        };

        if let Some(stamp) = table.get_mut(&name) {
            stamp.updated = now;
            return;
        }
        table.insert(
            name,
            Stamp {
                id,
                created: now,
                updated: now,
            },
        );
        self.next_id = id;
    }

    /// Drops named entities of `kind` no song refers to. Returns how many went.
    fn prune(&mut self, kind: EntityKind) -> usize {
        let referenced: FxHashSet<String> = match kind {
            EntityKind::Artist => self.songs.values().filter_map(|s| s.artist.clone()).collect(),
            EntityKind::Album => self.songs.values().filter_map(SongRecord::album_key).collect(),
            EntityKind::Genre => self.songs.values().filter_map(|s| s.genre.clone()).collect(),
            EntityKind::Song | EntityKind::Artwork => return 0,
        };
        let Some(table) = self.named_mut(kind) else {
            return 0;
        };

        let before = table.len();
        table.retain(|name, _| referenced.contains(name));
        before - table.len()
    }

    fn stamps(&self, kind: EntityKind) -> Box<dyn Iterator<Item = (DateTime<Utc>, DateTime<Utc>)> + '_> {
        match kind {
            EntityKind::Genre => Box::new(self.genres.values().map(|s| (s.created, s.updated))),
            EntityKind::Artist => Box::new(self.artists.values().map(|s| (s.created, s.updated))),
            EntityKind::Album => Box::new(self.albums.values().map(|s| (s.created, s.updated))),
            EntityKind::Song => Box::new(self.songs.values().map(|s| (s.created, s.updated))),
            EntityKind::Artwork => Box::new(self.artworks.values().map(|a| (a.created, a.created))),
        }
    }
}

fn album_key(artist: Option<&str>, album: &str) -> String {
    format!("{}\u{1f}{album}", artist.unwrap_or_default())
}

fn to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Returns the folder of `library` at exactly `path`, searching every tree.
fn find_folder<'a>(library: &'a [LibraryFolder], path: &Utf8Path) -> Option<&'a LibraryFolder> {
    library.iter().find_map(|folder| {
        if folder.path == path {
            Some(folder)
        } else if path.starts_with(&folder.path) {
            find_folder(&folder.children, path)
        } else {
            None
        }
    })
}

/// Returns `true` if `path` lies inside one of the scanned roots.
fn under_scanned_root(library: &[LibraryFolder], path: &Utf8Path) -> bool {
    library.iter().any(|root| path.starts_with(&root.path))
}

/// A catalog kept in memory.
///
/// # Examples
///
/// ```
/// use mlib_core::EntityKind;
/// use mlib_scanner::{CatalogStore, MemoryCatalog, ScanResultStore};
///
/// let catalog = MemoryCatalog::new();
/// assert_eq!(catalog.count(EntityKind::Song).unwrap(), 0);
/// assert!(catalog.find_latest().unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
    path: Option<Utf8PathBuf>,
    in_unit: AtomicBool,
}

impl MemoryCatalog {
    /// Creates an empty catalog that is never written to disk.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the catalog stored at `path`, or an empty one if the file
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            debug!(path = %path, "catalog file not found, starting empty");
            CatalogState::default()
        };

        info!(path = %path, songs = state.songs.len(), results = state.results.len(), "opened catalog");
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
            in_unit: AtomicBool::new(false),
        })
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Writes the catalog to its backing file. Does nothing without one.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] if the file cannot be written.
    pub fn persist(&self) -> Result<(), CatalogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = {
            let state = self.state.lock();
            serde_json::to_string_pretty(&*state).map_err(|source| CatalogError::Parse {
                path: path.clone(),
                source,
            })?
        };

        let io_err = |source| CatalogError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json).map_err(io_err)?;
        fs::rename(&staging, path).map_err(io_err)?;

        debug!(path = %path, "catalog written");
        Ok(())
    }

    /// Returns the catalog entry for the song at `path`.
    #[must_use]
    pub fn song(&self, path: &Utf8Path) -> Option<Song> {
        self.state.lock().songs.get(path).map(|record| record.to_song(path))
    }

    /// Removes entries of one table that lie under a scanned root but are
    /// no longer on disk. The lock is taken per entry and released before
    /// `on_progress` runs.
    fn remove_stale<T, S, F>(
        &self,
        table: S,
        library: &[LibraryFolder],
        on_progress: ProgressFn<'_>,
        keep: F,
    ) -> usize
    where
        S: Fn(&mut CatalogState) -> &mut FxHashMap<Utf8PathBuf, T>,
        F: Fn(&Utf8Path) -> bool,
    {
        let candidates: Vec<Utf8PathBuf> = {
            let mut state = self.state.lock();
            table(&mut *state)
                .keys()
                .filter(|path| under_scanned_root(library, path))
                .cloned()
                .collect()
        };
        let total = to_u64(candidates.len());

        let mut removed = 0;
        for (index, path) in candidates.iter().enumerate() {
            if !keep(path) && table(&mut *self.state.lock()).remove(path).is_some() {
                removed += 1;
            }
            on_progress(fraction_of(to_u64(index + 1), total));
        }
        on_progress(1.0);
        removed
    }
}

impl LibraryService for MemoryCatalog {
    fn clean_songs(&self, library: &[LibraryFolder], on_progress: ProgressFn<'_>) -> anyhow::Result<()> {
        let removed = self.remove_stale(|state| &mut state.songs, library, on_progress, |path| {
            library.iter().any(|root| root.contains_song(path))
        });
        debug!(removed, "cleaned songs");
        Ok(())
    }

    fn clean_artworks(&self, library: &[LibraryFolder], on_progress: ProgressFn<'_>) -> anyhow::Result<()> {
        let removed = self.remove_stale(|state| &mut state.artworks, library, on_progress, |path| {
            library.iter().any(|root| root.contains_image(path))
        });
        debug!(removed, "cleaned artworks");
        Ok(())
    }

    fn import_song(&self, library: &[LibraryFolder], song: &LibrarySong) -> anyhow::Result<Song> {
        if song.size == 0 {
            anyhow::bail!("empty song file: {}", song.path);
        }

        let tags = &song.tags;
        let title = tags
            .title
            .clone()
            .or_else(|| song.path.file_stem().map(str::to_owned))
            .unwrap_or_default();

        let now = Utc::now();
        let mut state = self.state.lock();

        let candidate = SongRecord {
            id: 0,
            title,
            artist: tags.artist.clone(),
            album: tags.album.clone(),
            genre: tags.genre.clone(),
            size: song.size,
            modified: song.modified,
            created: now,
            updated: now,
        };

        let existing = state
            .songs
            .get(&song.path)
            .map(|e| (e.id, e.created, e.same_content(&candidate)));
        let record = match existing {
            Some((_, _, true)) => None,
            Some((id, created, false)) => Some(SongRecord {
                id,
                created,
                ..candidate
            }),
            None => Some(SongRecord {
                id: state.next_id(),
                ..candidate
            }),
        };

        if let Some(record) = record {
            if let Some(artist) = record.artist.clone() {
                state.touch(EntityKind::Artist, artist, now);
            }
            if let Some(key) = record.album_key() {
                state.touch(EntityKind::Album, key, now);
            }
            if let Some(genre) = record.genre.clone() {
                state.touch(EntityKind::Genre, genre, now);
            }
            debug!(path = %song.path, id = record.id, "song record written");
            state.songs.insert(song.path.clone(), record);
        }

        if let Some(folder) = song.path.parent().and_then(|dir| find_folder(library, dir)) {
            for image in &folder.images {
                if !state.artworks.contains_key(&image.path) {
                    let id = state.next_id();
                    state.artworks.insert(
                        image.path.clone(),
                        ArtworkRecord {
                            id,
                            size: image.size,
                            created: now,
                        },
                    );
                }
            }
        }

        state
            .songs
            .get(&song.path)
            .map(|record| record.to_song(&song.path))
            .ok_or_else(|| anyhow::anyhow!("song vanished while importing: {}", song.path))
    }

    fn normalize(&self, _library: &[LibraryFolder], on_progress: ProgressFn<'_>) -> anyhow::Result<()> {
        const KINDS: [EntityKind; 3] = [EntityKind::Artist, EntityKind::Album, EntityKind::Genre];

        let mut pruned = 0;
        for (index, kind) in KINDS.into_iter().enumerate() {
            pruned += self.state.lock().prune(kind);
            on_progress(fraction_of(to_u64(index + 1), to_u64(KINDS.len())));
        }

        debug!(pruned, "normalized catalog");
        Ok(())
    }
}

impl CatalogStore for MemoryCatalog {
    fn count(&self, kind: EntityKind) -> anyhow::Result<u64> {
        Ok(to_u64(self.state.lock().stamps(kind).count()))
    }

    fn count_created_after(&self, kind: EntityKind, since: DateTime<Utc>) -> anyhow::Result<u64> {
        let state = self.state.lock();
        Ok(to_u64(state.stamps(kind).filter(|(created, _)| *created > since).count()))
    }

    fn count_updated_after(&self, kind: EntityKind, since: DateTime<Utc>) -> anyhow::Result<u64> {
        if !kind.tracks_updates() {
            return Ok(0);
        }
        let state = self.state.lock();
        Ok(to_u64(
            state
                .stamps(kind)
                .filter(|(created, updated)| *created <= since && *updated > since)
                .count(),
        ))
    }

    fn total_size(&self, kind: EntityKind) -> anyhow::Result<u64> {
        let state = self.state.lock();
        Ok(match kind {
            EntityKind::Song => state.songs.values().map(|s| s.size).sum(),
            EntityKind::Artwork => state.artworks.values().map(|a| a.size).sum(),
            EntityKind::Genre | EntityKind::Artist | EntityKind::Album => 0,
        })
    }
}

impl ScanResultStore for MemoryCatalog {
    fn save(&self, mut result: ScanResult) -> anyhow::Result<ScanResult> {
        {
            let mut state = self.state.lock();
            result.id = Some(to_u64(state.results.len()) + 1);
            state.results.push(result.clone());
        }
        if !self.in_unit.load(Ordering::Acquire) {
            self.persist()?;
        }
        Ok(result)
    }

    fn find_latest(&self) -> anyhow::Result<Option<ScanResult>> {
        let state = self.state.lock();
        Ok(state.results.iter().max_by_key(|r| (r.date, r.id)).cloned())
    }
}

impl TransactionRunner for MemoryCatalog {
    fn run_isolated(&self, work: ScanWork<'_>) -> Result<ScanResult, ScanError> {
        let unit = UnitOfWork::begin(self);
        let result = work()?;
        self.persist()
            .map_err(|e| ScanError::phase(ScanStep::Normalizing, e))?;
        unit.commit();
        Ok(result)
    }
}

/// Restores the catalog snapshot on drop unless committed.
struct UnitOfWork<'a> {
    catalog: &'a MemoryCatalog,
    snapshot: Option<CatalogState>,
}

impl<'a> UnitOfWork<'a> {
    fn begin(catalog: &'a MemoryCatalog) -> Self {
        let snapshot = catalog.state.lock().clone();
        catalog.in_unit.store(true, Ordering::Release);
        Self {
            catalog,
            snapshot: Some(snapshot),
        }
    }

    fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        self.catalog.in_unit.store(false, Ordering::Release);
        if let Some(snapshot) = self.snapshot.take() {
            warn!("rolling back catalog changes");
            *self.catalog.state.lock() = snapshot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeDelta;
    use mlib_core::{ArtworkTally, EntityTally, LibraryImage, SongTags};

    fn song(path: &str, size: u64, artist: &str, album: &str) -> LibrarySong {
        LibrarySong {
            path: Utf8PathBuf::from(path),
            size,
            modified: None,
            tags: SongTags {
                title: None,
                artist: Some(artist.to_owned()),
                album: Some(album.to_owned()),
                genre: Some("Jazz".to_owned()),
                track: None,
            },
        }
    }

    fn library() -> Vec<LibraryFolder> {
        let mut root = LibraryFolder::new("/m");
        let mut album = LibraryFolder::new("/m/Miles/Kind of Blue");
        album.songs.push(song("/m/Miles/Kind of Blue/So What.mp3", 10, "Miles", "Kind of Blue"));
        album.songs.push(song("/m/Miles/Kind of Blue/Blue in Green.mp3", 20, "Miles", "Kind of Blue"));
        album.images.push(LibraryImage {
            path: Utf8PathBuf::from("/m/Miles/Kind of Blue/cover.jpg"),
            size: 5,
            modified: None,
        });
        let mut artist = LibraryFolder::new("/m/Miles");
        artist.children.push(album);
        root.children.push(artist);
        vec![root]
    }

    fn import_all(catalog: &MemoryCatalog, library: &[LibraryFolder]) {
        for folder in library {
            for song in folder.child_songs(true) {
                catalog.import_song(library, song).unwrap();
            }
        }
    }

    fn result(date: DateTime<Utc>) -> ScanResult {
        ScanResult {
            id: None,
            date,
            folders: vec![Utf8PathBuf::from("/m")],
            duration_nanos: 1,
            song_size: 0,
            artwork_size: 0,
            genre: EntityTally::default(),
            artist: EntityTally::default(),
            album: EntityTally::default(),
            song: EntityTally::default(),
            artwork: ArtworkTally::default(),
            found_song_count: 0,
        }
    }

    #[test]
    fn test_import_creates_entities() {
        let catalog = MemoryCatalog::new();
        let library = library();
        import_all(&catalog, &library);

        assert_eq!(catalog.count(EntityKind::Song).unwrap(), 2);
        assert_eq!(catalog.count(EntityKind::Artist).unwrap(), 1);
        assert_eq!(catalog.count(EntityKind::Album).unwrap(), 1);
        assert_eq!(catalog.count(EntityKind::Genre).unwrap(), 1);
        assert_eq!(catalog.count(EntityKind::Artwork).unwrap(), 1);
        assert_eq!(catalog.total_size(EntityKind::Song).unwrap(), 30);
        assert_eq!(catalog.total_size(EntityKind::Artwork).unwrap(), 5);

        let so_what = catalog.song(Utf8Path::new("/m/Miles/Kind of Blue/So What.mp3")).unwrap();
        assert_eq!(so_what.title, "So What");
        assert_eq!(so_what.artist.as_deref(), Some("Miles"));
    }

    #[test]
    fn test_reimport_unchanged_is_not_an_update() {
        let catalog = MemoryCatalog::new();
        let library = library();
        import_all(&catalog, &library);
        let since = Utc::now();

        import_all(&catalog, &library);
        assert_eq!(catalog.count_created_after(EntityKind::Song, since).unwrap(), 0);
        assert_eq!(catalog.count_updated_after(EntityKind::Song, since).unwrap(), 0);
        assert_eq!(catalog.count(EntityKind::Song).unwrap(), 2);
    }

    #[test]
    fn test_changed_song_counts_as_updated() {
        let catalog = MemoryCatalog::new();
        let mut library = library();
        import_all(&catalog, &library);
        let since = Utc::now();

        library[0].children[0].children[0].songs[0].size = 11;
        import_all(&catalog, &library);

        assert_eq!(catalog.count_created_after(EntityKind::Song, since).unwrap(), 0);
        assert_eq!(catalog.count_updated_after(EntityKind::Song, since).unwrap(), 1);
        assert_eq!(catalog.count_updated_after(EntityKind::Artwork, since).unwrap(), 0);
    }

    #[test]
    fn test_empty_file_fails_import() {
        let catalog = MemoryCatalog::new();
        let err = catalog
            .import_song(&[], &song("/m/empty.mp3", 0, "A", "B"))
            .unwrap_err();
        assert!(err.to_string().contains("empty song file"));
        assert_eq!(catalog.count(EntityKind::Song).unwrap(), 0);
    }

    #[test]
    fn test_clean_and_normalize_remove_missing() {
        let catalog = MemoryCatalog::new();
        let mut library = library();
        import_all(&catalog, &library);
        catalog
            .import_song(&[], &song("/elsewhere/keep.mp3", 1, "Other", "Elsewhere"))
            .unwrap();

        library[0].children.clear();
        let reported = Mutex::new(Vec::new());
        let on_progress = |fraction: f64| reported.lock().push(fraction);

        catalog.clean_songs(&library, &on_progress).unwrap();
        catalog.clean_artworks(&library, &on_progress).unwrap();
        catalog.normalize(&library, &on_progress).unwrap();

        assert_eq!(catalog.count(EntityKind::Song).unwrap(), 1);
        assert_eq!(catalog.count(EntityKind::Artwork).unwrap(), 0);
        assert_eq!(catalog.count(EntityKind::Artist).unwrap(), 1);
        assert_eq!(catalog.count(EntityKind::Album).unwrap(), 1);

        let reported = reported.into_inner();
        assert!(reported.iter().all(|f| (0.0..=1.0).contains(f)));
        assert!((reported.last().copied().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_callbacks_may_read_catalog() {
        let catalog = MemoryCatalog::new();
        let mut library = library();
        import_all(&catalog, &library);
        library[0].children.clear();

        let seen = Mutex::new(Vec::new());
        let on_progress = |_: f64| {
            seen.lock().push(catalog.count(EntityKind::Song).unwrap());
            catalog.find_latest().unwrap();
        };

        catalog.clean_songs(&library, &on_progress).unwrap();
        catalog.clean_artworks(&library, &on_progress).unwrap();
        catalog.normalize(&library, &on_progress).unwrap();

        let seen = seen.into_inner();
        assert_eq!(seen.first(), Some(&1));
        assert_eq!(seen.last(), Some(&0));
        assert_eq!(catalog.count(EntityKind::Artist).unwrap(), 0);
    }

    #[test]
    fn test_normalize_prunes_each_kind() {
        let catalog = MemoryCatalog::new();
        let library = library();
        import_all(&catalog, &library);
        catalog
            .import_song(&[], &song("/elsewhere/keep.mp3", 1, "Other", "Elsewhere"))
            .unwrap();
        catalog.clean_songs(&[LibraryFolder::new("/m")], &|_: f64| {}).unwrap();

        let reported = Mutex::new(Vec::new());
        catalog.normalize(&library, &|f: f64| reported.lock().push(f)).unwrap();

        assert_eq!(catalog.count(EntityKind::Artist).unwrap(), 1);
        assert_eq!(catalog.count(EntityKind::Album).unwrap(), 1);
        assert_eq!(catalog.count(EntityKind::Genre).unwrap(), 1);
        assert_eq!(reported.into_inner().len(), 3);
    }

    #[test]
    fn test_find_latest_by_date() {
        let catalog = MemoryCatalog::new();
        let now = Utc::now();
        let newer = catalog.save(result(now)).unwrap();
        let older = catalog.save(result(now - TimeDelta::hours(1))).unwrap();

        assert_eq!(newer.id, Some(1));
        assert_eq!(older.id, Some(2));
        assert_eq!(catalog.find_latest().unwrap(), Some(newer));
    }

    #[test]
    fn test_failed_unit_of_work_rolls_back() {
        let catalog = MemoryCatalog::new();
        let library = library();

        let outcome = catalog.run_isolated(&mut || {
            import_all(&catalog, &library);
            Err(ScanError::Interrupted)
        });

        assert!(matches!(outcome, Err(ScanError::Interrupted)));
        assert_eq!(catalog.count(EntityKind::Song).unwrap(), 0);
        assert_eq!(catalog.count(EntityKind::Artwork).unwrap(), 0);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();
        let path = Utf8PathBuf::from_path_buf(blocker.join("catalog.json")).unwrap();
        let catalog = MemoryCatalog::open(&path).unwrap();
        let library = library();

        let outcome = catalog.run_isolated(&mut || {
            import_all(&catalog, &library);
            catalog
                .save(result(Utc::now()))
                .map_err(|e| ScanError::phase(ScanStep::Normalizing, e))
        });

        assert_eq!(outcome.unwrap_err().step(), Some(ScanStep::Normalizing));
        assert_eq!(catalog.count(EntityKind::Song).unwrap(), 0);
        assert!(catalog.find_latest().unwrap().is_none());
    }

    #[test]
    fn test_panicking_unit_of_work_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("catalog.json")).unwrap();
        let catalog = MemoryCatalog::open(&path).unwrap();
        let library = library();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            catalog.run_isolated(&mut || {
                import_all(&catalog, &library);
                std::panic::resume_unwind(Box::new("collaborator crashed"))
            })
        }));

        assert!(unwound.is_err());
        assert_eq!(catalog.count(EntityKind::Song).unwrap(), 0);
        assert!(!path.exists());

        // Outside a unit of work, saving writes through again.
        catalog.save(result(Utc::now())).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("catalog.json")).unwrap();
        let library = library();

        let saved = {
            let catalog = MemoryCatalog::open(&path).unwrap();
            assert_eq!(catalog.path(), Some(path.as_path()));
            catalog
                .run_isolated(&mut || {
                    import_all(&catalog, &library);
                    catalog
                        .save(result(Utc::now()))
                        .map_err(|e| ScanError::phase(ScanStep::Normalizing, e))
                })
                .unwrap()
        };
        assert!(path.exists());

        let reopened = MemoryCatalog::open(&path).unwrap();
        assert_eq!(reopened.count(EntityKind::Song).unwrap(), 2);
        assert_eq!(reopened.find_latest().unwrap(), Some(saved));
    }

    #[test]
    fn test_open_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("catalog.json")).unwrap();
        fs::write(&path, "not json").unwrap();

        assert!(matches!(MemoryCatalog::open(&path), Err(CatalogError::Parse { .. })));
    }
}
