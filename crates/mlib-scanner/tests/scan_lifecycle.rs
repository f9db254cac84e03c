//! End-to-end scan scenarios against the in-memory catalog.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};
use mlib_core::{EntityKind, LibraryFolder, LibrarySong, ScanResult, ScanStatus, ScanStep, Song, SongTags};
use mlib_scanner::{
    CatalogStore, FolderScanner, LibraryScanner, LibraryService, MemoryCatalog, ProgressFn,
    ScanDelegate, ScanError, ScanResultStore, ScanServices, TransactionRunner,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn song(path: &str, size: u64) -> LibrarySong {
    let path = Utf8PathBuf::from(path);
    LibrarySong {
        tags: SongTags::from_layout(Utf8Path::new("/"), &path),
        path,
        size,
        modified: None,
    }
}

/// Builds `root/artist/album` holding `files` (name, size).
fn album_tree(root: &str, artist: &str, album: &str, files: &[(&str, u64)]) -> LibraryFolder {
    let artist_path = Utf8PathBuf::from(root).join(artist);
    let album_path = artist_path.join(album);

    let mut album_folder = LibraryFolder::new(&album_path);
    for (name, size) in files {
        album_folder.songs.push(song(album_path.join(name).as_str(), *size));
    }
    let mut artist_folder = LibraryFolder::new(&artist_path);
    artist_folder.children.push(album_folder);
    let mut root_folder = LibraryFolder::new(root);
    root_folder.children.push(artist_folder);
    root_folder
}

/// A folder scanner serving prepared trees.
#[derive(Debug, Default)]
struct FixedTree {
    trees: Mutex<FxHashMap<Utf8PathBuf, LibraryFolder>>,
    fail: AtomicBool,
}

impl FixedTree {
    fn with(trees: impl IntoIterator<Item = LibraryFolder>) -> Self {
        let tree = Self::default();
        for folder in trees {
            tree.set(folder);
        }
        tree
    }

    fn set(&self, folder: LibraryFolder) {
        self.trees.lock().insert(folder.path.clone(), folder);
    }
}

impl FolderScanner for FixedTree {
    fn scan_folder(&self, path: &Utf8Path) -> anyhow::Result<LibraryFolder> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("disk unplugged");
        }
        self.trees
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such folder: {path}"))
    }
}

/// A folder scanner that blocks until released.
#[derive(Debug)]
struct GatedTree {
    inner: FixedTree,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl FolderScanner for GatedTree {
    fn scan_folder(&self, path: &Utf8Path) -> anyhow::Result<LibraryFolder> {
        self.entered.lock().send(())?;
        self.release.lock().recv()?;
        self.inner.scan_folder(path)
    }
}

/// Library service over a [`MemoryCatalog`] with scripted import failures.
#[derive(Debug)]
struct Flaky {
    catalog: Arc<MemoryCatalog>,
    calls: AtomicUsize,
    stall: Option<(Mutex<Sender<()>>, Mutex<Receiver<()>>)>,
    crash_in_normalize: AtomicBool,
}

impl Flaky {
    fn new(catalog: Arc<MemoryCatalog>) -> Self {
        Self {
            catalog,
            calls: AtomicUsize::new(0),
            stall: None,
            crash_in_normalize: AtomicBool::new(false),
        }
    }
}

impl LibraryService for Flaky {
    fn clean_songs(&self, library: &[LibraryFolder], on_progress: ProgressFn<'_>) -> anyhow::Result<()> {
        self.catalog.clean_songs(library, on_progress)
    }

    fn clean_artworks(&self, library: &[LibraryFolder], on_progress: ProgressFn<'_>) -> anyhow::Result<()> {
        self.catalog.clean_artworks(library, on_progress)
    }

    fn import_song(&self, library: &[LibraryFolder], song: &LibrarySong) -> anyhow::Result<Song> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let (0, Some((entered, release))) = (call, &self.stall) {
            entered.lock().send(())?;
            release.lock().recv()?;
        }
        if song.path.as_str().contains("broken") {
            bail!("unsupported codec");
        }
        self.catalog.import_song(library, song)
    }

    fn normalize(&self, library: &[LibraryFolder], on_progress: ProgressFn<'_>) -> anyhow::Result<()> {
        if self.crash_in_normalize.load(Ordering::SeqCst) {
            std::panic::resume_unwind(Box::new("normalizer crashed"));
        }
        self.catalog.normalize(library, on_progress)
    }
}

/// Records every notification it receives.
#[derive(Debug, Default)]
struct Recorder {
    starts: Mutex<Vec<Vec<Utf8PathBuf>>>,
    statuses: Mutex<Vec<ScanStatus>>,
    finishes: Mutex<Vec<ScanResult>>,
    failures: Mutex<Vec<String>>,
}

impl ScanDelegate for Recorder {
    fn on_scan_start(&self, folders: &[Utf8PathBuf]) -> anyhow::Result<()> {
        self.starts.lock().push(folders.to_vec());
        Ok(())
    }

    fn on_scan_progress(&self, status: &ScanStatus) -> anyhow::Result<()> {
        self.statuses.lock().push(status.clone());
        Ok(())
    }

    fn on_scan_finish(&self, result: &ScanResult) -> anyhow::Result<()> {
        self.finishes.lock().push(result.clone());
        Ok(())
    }

    fn on_scan_fail(&self, error: &ScanError) -> anyhow::Result<()> {
        self.failures.lock().push(error.to_string());
        Ok(())
    }
}

/// Reads the catalog from every progress notification.
#[derive(Debug)]
struct CatalogReader {
    catalog: Arc<MemoryCatalog>,
    reads: AtomicUsize,
}

impl ScanDelegate for CatalogReader {
    fn on_scan_progress(&self, _status: &ScanStatus) -> anyhow::Result<()> {
        self.catalog.find_latest()?;
        self.catalog.count(EntityKind::Song)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn services(folder_scanner: Arc<dyn FolderScanner>, library: Arc<dyn LibraryService>, catalog: &Arc<MemoryCatalog>) -> ScanServices {
    ScanServices {
        folder_scanner,
        library,
        catalog: Arc::clone(catalog) as Arc<dyn CatalogStore>,
        results: Arc::clone(catalog) as Arc<dyn ScanResultStore>,
        transactions: Arc::clone(catalog) as Arc<dyn TransactionRunner>,
    }
}

fn observed(scanner: &LibraryScanner) -> Arc<Recorder> {
    let recorder = Arc::new(Recorder::default());
    scanner.add_delegate(Arc::clone(&recorder) as Arc<dyn ScanDelegate>);
    recorder
}

fn folders(paths: &[&str]) -> Vec<Utf8PathBuf> {
    paths.iter().map(Utf8PathBuf::from).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_two_folders_with_one_failed_import() {
    let catalog = Arc::new(MemoryCatalog::new());
    let tree = FixedTree::with([
        album_tree("/a", "Coltrane", "Blue Train", &[("01.mp3", 10), ("02.mp3", 20)]),
        album_tree("/b", "Monk", "Brilliant Corners", &[("01.mp3", 30), ("broken.mp3", 40)]),
    ]);
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    let scanner = LibraryScanner::new(services(Arc::new(tree), library, &catalog), 10);
    let recorder = observed(&scanner);

    let result = scanner.scan(&folders(&["/a", "/b"])).unwrap();

    assert_eq!(result.found_song_count, 4);
    assert_eq!(result.song.count, 3);
    assert_eq!(result.song.created, 3);
    assert_eq!(result.song.deleted, 0);
    assert_eq!(result.artist.count, 2);
    assert_eq!(result.album.count, 2);
    assert_eq!(result.song_size, 60);
    assert_eq!(result.folders, folders(&["/a", "/b"]));

    assert_eq!(recorder.starts.lock().len(), 1);
    assert_eq!(recorder.finishes.lock().len(), 1);
    assert!(recorder.failures.lock().is_empty());
    assert_eq!(scanner.last_result().unwrap(), Some(result));
    assert!(scanner.status().is_none());
}

#[test]
fn test_concurrent_scan_is_rejected() {
    let catalog = Arc::new(MemoryCatalog::new());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gate = GatedTree {
        inner: FixedTree::with([album_tree("/a", "Coltrane", "Blue Train", &[("01.mp3", 10)])]),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    };
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    let scanner = Arc::new(LibraryScanner::new(services(Arc::new(gate), library, &catalog), 10));
    let recorder = observed(&scanner);

    let first = {
        let scanner = Arc::clone(&scanner);
        thread::spawn(move || scanner.scan(&folders(&["/a"])))
    };
    entered_rx.recv().unwrap();

    assert!(scanner.is_scanning());
    assert_eq!(
        scanner.status().map(|s| s.step()),
        Some(ScanStep::SearchingMediaFiles)
    );

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let err = scanner.scan(&folders(&["/a"])).unwrap_err();
                assert!(err.is_concurrent_rejection());
            });
        }
    });

    release_tx.send(()).unwrap();
    let result = first.join().unwrap().unwrap();
    assert_eq!(result.found_song_count, 1);
    assert!(!scanner.is_scanning());
    assert_eq!(recorder.starts.lock().len(), 1);

    release_tx.send(()).unwrap();
    assert!(scanner.scan(&folders(&["/a"])).is_ok());
    assert_eq!(recorder.finishes.lock().len(), 2);
}

#[test]
fn test_progress_never_goes_backwards() {
    let catalog = Arc::new(MemoryCatalog::new());
    let files: Vec<(String, u64)> = (0..200).map(|i| (format!("{i:03}.mp3"), 1)).collect();
    let file_refs: Vec<(&str, u64)> = files.iter().map(|(n, s)| (n.as_str(), *s)).collect();
    let tree = FixedTree::with([album_tree("/a", "Coltrane", "Ballads", &file_refs)]);
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    let scanner = LibraryScanner::new(services(Arc::new(tree), library, &catalog), 10);
    let recorder = observed(&scanner);

    scanner.scan(&folders(&["/a"])).unwrap();

    let statuses = recorder.statuses.lock();
    assert_eq!(statuses.first().map(ScanStatus::step), Some(ScanStep::Preparing));
    assert_eq!(statuses.last().map(ScanStatus::step), Some(ScanStep::Normalizing));

    for pair in statuses.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        assert!(prev.step() <= next.step(), "step went back: {prev} -> {next}");
        if prev.step() == next.step() {
            if let (Some(a), Some(b)) = (prev.fraction(), next.fraction()) {
                assert!(a <= b, "progress went back: {prev} -> {next}");
            }
        }
    }

    let imports: Vec<_> = statuses
        .iter()
        .filter(|s| s.step() == ScanStep::ImportingSongs)
        .collect();
    assert_eq!(imports.len(), 201);
    assert_eq!(imports.last().and_then(|s| s.fraction()), Some(1.0));

    let steps_seen: Vec<_> = {
        let mut steps: Vec<_> = statuses.iter().map(ScanStatus::step).collect();
        steps.dedup();
        steps
    };
    assert_eq!(steps_seen, ScanStep::ALL);
}

#[test]
fn test_failed_phase_cleans_up_and_allows_next_scan() {
    let catalog = Arc::new(MemoryCatalog::new());
    let tree = Arc::new(FixedTree::with([album_tree("/a", "Coltrane", "Blue Train", &[("01.mp3", 10)])]));
    tree.fail.store(true, Ordering::SeqCst);
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    let scanner = LibraryScanner::new(
        services(Arc::clone(&tree) as Arc<dyn FolderScanner>, library, &catalog),
        10,
    );
    let recorder = observed(&scanner);

    let err = scanner.scan(&folders(&["/a"])).unwrap_err();

    assert_eq!(err.step(), Some(ScanStep::SearchingMediaFiles));
    assert!(err.to_string().contains("disk unplugged"));
    assert!(scanner.status().is_none());
    assert_eq!(scanner.import_progress().total, 0);
    assert_eq!(recorder.failures.lock().len(), 1);
    assert!(recorder.finishes.lock().is_empty());
    assert!(scanner.last_result().unwrap().is_none());

    tree.fail.store(false, Ordering::SeqCst);
    let result = scanner.scan(&folders(&["/a"])).unwrap();
    assert_eq!(result.song.count, 1);
}

#[test]
fn test_shutdown_now_interrupts_import_and_rolls_back() {
    let catalog = Arc::new(MemoryCatalog::new());
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let tree = FixedTree::with([album_tree(
        "/a",
        "Coltrane",
        "Blue Train",
        &[("01.mp3", 1), ("02.mp3", 1), ("03.mp3", 1), ("04.mp3", 1), ("05.mp3", 1)],
    )]);
    let library = Arc::new(Flaky {
        stall: Some((Mutex::new(entered_tx), Mutex::new(release_rx))),
        ..Flaky::new(Arc::clone(&catalog))
    });
    let scanner = Arc::new(LibraryScanner::new(
        services(Arc::new(tree), Arc::clone(&library) as Arc<dyn LibraryService>, &catalog),
        1,
    ));
    let recorder = observed(&scanner);

    let running = {
        let scanner = Arc::clone(&scanner);
        thread::spawn(move || scanner.scan(&folders(&["/a"])))
    };
    entered_rx.recv().unwrap();
    scanner.shutdown_now();
    release_tx.send(()).unwrap();

    let outcome = running.join().unwrap();
    assert!(matches!(outcome, Err(ScanError::Interrupted)));
    assert_eq!(library.calls.load(Ordering::SeqCst), 1);
    assert!(!scanner.is_scanning());
    assert_eq!(catalog.count(EntityKind::Song).unwrap(), 0);
    assert!(catalog.find_latest().unwrap().is_none());
    assert_eq!(recorder.failures.lock().len(), 1);
}

#[test]
fn test_shutdown_now_while_idle_does_nothing() {
    let catalog = Arc::new(MemoryCatalog::new());
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    let scanner = LibraryScanner::new(services(Arc::new(FixedTree::default()), library, &catalog), 10);

    scanner.shutdown_now();
    scanner.shutdown_now();

    assert!(!scanner.is_scanning());
    assert!(scanner.scan(&[]).is_ok());
}

#[test]
fn test_second_scan_reports_changes() {
    let catalog = Arc::new(MemoryCatalog::new());
    let tree = Arc::new(FixedTree::with([album_tree(
        "/lib",
        "Coltrane",
        "Blue Train",
        &[("01.mp3", 10), ("02.mp3", 20), ("03.mp3", 30)],
    )]));
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    let scanner = LibraryScanner::new(
        services(Arc::clone(&tree) as Arc<dyn FolderScanner>, library, &catalog),
        10,
    );

    let first = scanner.scan(&folders(&["/lib"])).unwrap();
    assert_eq!(first.song.created, 3);

    // 01 unchanged, 02 grew, 03 removed, 04 added.
    tree.set(album_tree(
        "/lib",
        "Coltrane",
        "Blue Train",
        &[("01.mp3", 10), ("02.mp3", 25), ("04.mp3", 40)],
    ));
    let second = scanner.scan(&folders(&["/lib"])).unwrap();

    insta::assert_json_snapshot!(second.song, @r#"
    {
      "count": 3,
      "created": 1,
      "updated": 1,
      "deleted": 1
    }
    "#);
    assert_eq!(second.found_song_count, 3);
    assert_eq!(second.song_size, 75);
    assert!(second.date > first.date);
    assert_eq!(scanner.last_result().unwrap().and_then(|r| r.id), Some(2));
}

#[test]
fn test_removed_delegate_is_not_notified() {
    let catalog = Arc::new(MemoryCatalog::new());
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    let scanner = LibraryScanner::new(services(Arc::new(FixedTree::default()), library, &catalog), 10);

    let recorder = Arc::new(Recorder::default());
    let handle: Arc<dyn ScanDelegate> = Arc::clone(&recorder) as Arc<dyn ScanDelegate>;
    assert!(scanner.add_delegate(Arc::clone(&handle)));
    assert!(!scanner.add_delegate(Arc::clone(&handle)));

    scanner.scan(&[]).unwrap();
    assert_eq!(recorder.finishes.lock().len(), 1);

    assert!(scanner.remove_delegate(&handle));
    scanner.scan(&[]).unwrap();
    assert_eq!(recorder.finishes.lock().len(), 1);
}

#[test]
fn test_failed_imports_keep_existing_songs() {
    let catalog = Arc::new(MemoryCatalog::new());
    let tree = Arc::new(FixedTree::with([album_tree(
        "/a",
        "Coltrane",
        "Blue Train",
        &[("01.mp3", 10), ("02.mp3", 20)],
    )]));
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    let scanner = LibraryScanner::new(
        services(Arc::clone(&tree) as Arc<dyn FolderScanner>, library, &catalog),
        10,
    );
    scanner.scan(&folders(&["/a"])).unwrap();

    tree.set(album_tree(
        "/a",
        "Coltrane",
        "Blue Train",
        &[("01.mp3", 10), ("02.mp3", 20), ("03.mp3", 30), ("04.mp3", 40), ("broken.mp3", 50)],
    ));
    let result = scanner.scan(&folders(&["/a"])).unwrap();

    assert_eq!(result.found_song_count, 5);
    assert_eq!(result.song.count, 4);
    assert_eq!(result.song.created, 2);
    assert_eq!(result.song.updated, 0);
    assert_eq!(result.song.deleted, 0);
}

#[test]
fn test_delegate_reading_catalog_does_not_stall_scan() {
    let catalog = Arc::new(MemoryCatalog::new());
    let tree = Arc::new(FixedTree::with([album_tree(
        "/a",
        "Coltrane",
        "Blue Train",
        &[("01.mp3", 10), ("02.mp3", 20), ("03.mp3", 30)],
    )]));
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    let scanner = Arc::new(LibraryScanner::new(
        services(Arc::clone(&tree) as Arc<dyn FolderScanner>, library, &catalog),
        10,
    ));
    scanner.scan(&folders(&["/a"])).unwrap();

    // 03 disappears, so cleaning walks existing songs.
    tree.set(album_tree("/a", "Coltrane", "Blue Train", &[("01.mp3", 10), ("02.mp3", 20)]));
    let reader = Arc::new(CatalogReader {
        catalog: Arc::clone(&catalog),
        reads: AtomicUsize::new(0),
    });
    scanner.add_delegate(Arc::clone(&reader) as Arc<dyn ScanDelegate>);

    let (done_tx, done_rx) = mpsc::channel();
    {
        let scanner = Arc::clone(&scanner);
        thread::spawn(move || done_tx.send(scanner.scan(&folders(&["/a"]))));
    }

    let result = done_rx
        .recv_timeout(Duration::from_secs(10))
        .unwrap()
        .unwrap();
    assert_eq!(result.song.deleted, 1);
    assert!(reader.reads.load(Ordering::SeqCst) > 0);
    assert!(!scanner.is_scanning());
}

#[test]
fn test_panic_inside_scan_rolls_back_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("catalog.json")).unwrap();
    let catalog = Arc::new(MemoryCatalog::open(&path).unwrap());
    let tree = FixedTree::with([album_tree("/a", "Coltrane", "Blue Train", &[("01.mp3", 10)])]);
    let library = Arc::new(Flaky::new(Arc::clone(&catalog)));
    library.crash_in_normalize.store(true, Ordering::SeqCst);
    let scanner = LibraryScanner::new(
        services(Arc::new(tree), Arc::clone(&library) as Arc<dyn LibraryService>, &catalog),
        10,
    );

    let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        scanner.scan(&folders(&["/a"]))
    }));

    assert!(unwound.is_err());
    assert!(!scanner.is_scanning());
    assert_eq!(catalog.count(EntityKind::Song).unwrap(), 0);
    assert!(catalog.find_latest().unwrap().is_none());
    assert!(!path.exists());

    library.crash_in_normalize.store(false, Ordering::SeqCst);
    let result = scanner.scan(&folders(&["/a"])).unwrap();
    assert_eq!(result.song.created, 1);
    assert!(path.exists());
}
