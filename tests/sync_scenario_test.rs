//! End-to-end synchronization through the engine with the real executor.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dirsync::jobs::{EntryExecutor, FsExecutor};
use dirsync::{
    BlockReconciler, Change, JobEntry, JobError, Operation, Settings, SyncEngine, same_attributes,
};
use parking_lot::Mutex;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

struct Fixture {
    _temp: TempDir,
    src: PathBuf,
    tgt: PathBuf,
    engine: SyncEngine,
    seen: Arc<Mutex<Vec<JobEntry>>>,
    fs_executor: Arc<FsExecutor>,
}

/// Engine over `src` -> `tgt` whose executor records every entry before
/// applying it to disk.
fn fixture(setup: impl FnOnce(&Path)) -> Fixture {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    let tgt = temp.path().join("tgt");
    fs::create_dir_all(&src).unwrap();
    fs::create_dir_all(&tgt).unwrap();
    setup(&src);

    let mut settings = Settings {
        state_file: temp.path().join("sources.toml"),
        ..Settings::default()
    };
    settings.sync.block_compare_min_file_size = 0;

    let fs_executor = Arc::new(FsExecutor::new(&settings.sync).unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let applier = Arc::clone(&fs_executor);
    let executor: Arc<dyn EntryExecutor> = Arc::new(move |e: &JobEntry| -> Result<(), JobError> {
        sink.lock().push(e.clone());
        applier.execute(e)
    });

    let engine = SyncEngine::with_executor(settings, executor).unwrap();
    engine.add_source(&src, true).unwrap();
    engine.add_target(0, &tgt, Some(false)).unwrap();

    Fixture {
        _temp: temp,
        src,
        tgt,
        engine,
        seen,
        fs_executor,
    }
}

impl Fixture {
    fn initial_sync(&self) {
        self.engine.orchestrator_at(0).unwrap().initial_sync();
        assert!(self.engine.wait_idle(TIMEOUT));
    }

    fn change(&self, change: Change) {
        self.engine.orchestrator_at(0).unwrap().on_change(change);
        assert!(self.engine.wait_idle(TIMEOUT));
    }
}

#[test]
fn test_hello_to_hellx() {
    let f = fixture(|src| fs::write(src.join("a.txt"), "hello").unwrap());

    f.initial_sync();
    let mirrored = f.tgt.join("a.txt");
    assert_eq!(fs::read_to_string(&mirrored).unwrap(), "hello");
    assert!(same_attributes(&f.src.join("a.txt"), &mirrored).unwrap());
    assert_eq!(
        fs::metadata(f.src.join("a.txt")).unwrap().modified().unwrap(),
        fs::metadata(&mirrored).unwrap().modified().unwrap()
    );

    // The first copy was whole, nothing was patched yet
    assert_eq!(f.fs_executor.reconcile_totals().blocks_rewritten, 0);

    fs::write(f.src.join("a.txt"), "hellx").unwrap();
    f.change(Change::Modified(f.src.join("a.txt")));

    assert_eq!(fs::read_to_string(&mirrored).unwrap(), "hellx");
    assert!(same_attributes(&f.src.join("a.txt"), &mirrored).unwrap());
    let totals = f.fs_executor.reconcile_totals();
    assert_eq!(totals.blocks_rewritten, 1);
    assert_eq!(totals.bytes_written, 5);
}

#[test]
fn test_single_differing_block_is_rewritten() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("a.bin");
    let tgt = temp.path().join("b.bin");

    let mut content = vec![7u8; 1000];
    fs::write(&tgt, &content).unwrap();
    content[450] = 8;
    fs::write(&src, &content).unwrap();

    let stats = BlockReconciler::new(100).unwrap().reconcile(&src, &tgt).unwrap();
    assert_eq!(stats.blocks_rewritten, 1);
    assert_eq!(stats.bytes_written, 100);
    assert_eq!(fs::read(&tgt).unwrap(), content);
}

#[test]
fn test_delete_classified_from_target_side() {
    let f = fixture(|src| {
        fs::create_dir_all(src.join("dir/inner")).unwrap();
        fs::write(src.join("dir/inner/x.txt"), "x").unwrap();
        fs::write(src.join("file.txt"), "f").unwrap();
    });
    f.initial_sync();
    assert!(f.tgt.join("dir/inner/x.txt").is_file());
    assert!(f.tgt.join("file.txt").is_file());

    fs::remove_dir_all(f.src.join("dir")).unwrap();
    fs::remove_file(f.src.join("file.txt")).unwrap();
    f.seen.lock().clear();

    f.change(Change::Removed(f.src.join("dir")));
    f.change(Change::Removed(f.src.join("file.txt")));

    assert!(!f.tgt.join("dir").exists());
    assert!(!f.tgt.join("file.txt").exists());

    let seen = f.seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|e| e.operation() == Operation::Delete));
    assert!(seen[0].is_directory());
    assert!(!seen[1].is_directory());
}

#[test]
fn test_rename_replayed_on_target() {
    let f = fixture(|src| {
        fs::create_dir_all(src.join("docs")).unwrap();
        fs::write(src.join("docs/old.txt"), "content").unwrap();
    });
    f.initial_sync();

    fs::rename(f.src.join("docs/old.txt"), f.src.join("docs/new.txt")).unwrap();
    f.change(Change::Renamed {
        from: f.src.join("docs/old.txt"),
        to: f.src.join("docs/new.txt"),
    });

    assert!(!f.tgt.join("docs/old.txt").exists());
    assert_eq!(
        fs::read_to_string(f.tgt.join("docs/new.txt")).unwrap(),
        "content"
    );
}

#[test]
fn test_directory_moved_in_is_mirrored_with_contents() {
    let f = fixture(|_| {});
    f.initial_sync();

    fs::create_dir_all(f.src.join("incoming/nested")).unwrap();
    fs::write(f.src.join("incoming/nested/n.txt"), "n").unwrap();
    f.change(Change::Created(f.src.join("incoming")));

    assert_eq!(
        fs::read_to_string(f.tgt.join("incoming/nested/n.txt")).unwrap(),
        "n"
    );
}

#[test]
fn test_excluded_changes_never_reach_target() {
    let f = fixture(|src| {
        fs::create_dir_all(src.join("cache")).unwrap();
        fs::write(src.join("cache/big.bin"), "zzz").unwrap();
        fs::write(src.join("keep.txt"), "k").unwrap();
    });
    f.engine.add_exception(0, f.src.join("cache")).unwrap();
    f.initial_sync();

    assert!(f.tgt.join("keep.txt").is_file());
    assert!(!f.tgt.join("cache").exists());

    fs::write(f.src.join("cache/more.bin"), "z").unwrap();
    f.change(Change::Created(f.src.join("cache/more.bin")));
    assert!(!f.tgt.join("cache").exists());
}

#[test]
fn test_added_target_receives_existing_content() {
    let f = fixture(|src| fs::write(src.join("a.txt"), "hello").unwrap());
    let second = f.tgt.parent().unwrap().join("tgt2");
    fs::create_dir_all(&second).unwrap();

    f.engine.add_target(0, &second, Some(true)).unwrap();
    assert!(f.engine.wait_idle(TIMEOUT));

    assert_eq!(fs::read_to_string(second.join("a.txt")).unwrap(), "hello");
    // Only the new target was synchronized
    assert!(!f.tgt.join("a.txt").exists());
}
