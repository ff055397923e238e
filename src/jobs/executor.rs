//! Filesystem execution of job entries.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::Path;

use parking_lot::Mutex;

use super::queue::EntryExecutor;
use super::types::{JobEntry, JobError, Operation};
use crate::config::SyncConfig;
use crate::paths::canonical_key;
use crate::reconcile::{BlockReconciler, ReconcileError, ReconcileStats, copy_metadata};

const LOCK_STRIPES: usize = 64;

/// Applies job entries to the filesystem.
///
/// Small files and fresh targets are copied whole; larger existing targets
/// are patched block by block. Work on the same target path is serialized
/// through a striped lock table, distinct paths run concurrently.
pub struct FsExecutor {
    reconciler: BlockReconciler,
    min_block_file_size: u64,
    stripes: Vec<Mutex<()>>,
    /// Running totals over every block reconciliation.
    totals: Mutex<ReconcileStats>,
}

impl FsExecutor {
    pub fn new(config: &SyncConfig) -> Result<Self, ReconcileError> {
        Ok(Self {
            reconciler: BlockReconciler::new(config.block_size)?,
            min_block_file_size: config.block_compare_min_file_size,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            totals: Mutex::new(ReconcileStats::default()),
        })
    }

    /// Sum of the stats of every block reconciliation run so far. Whole
    /// file copies are not counted.
    pub fn reconcile_totals(&self) -> ReconcileStats {
        *self.totals.lock()
    }

    fn stripe(&self, target: &Path) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        canonical_key(target, false).hash(&mut hasher);
        &self.stripes[hasher.finish() as usize % self.stripes.len()]
    }

    fn create_directory(&self, entry: &JobEntry) -> Result<(), JobError> {
        let target = entry.target();
        if target.is_file() {
            fs::remove_file(target).map_err(io_err(entry.operation(), target))?;
        }
        fs::create_dir_all(target).map_err(io_err(entry.operation(), target))?;
        copy_metadata(entry.source(), target)?;
        Ok(())
    }

    fn sync_file(&self, entry: &JobEntry) -> Result<(), JobError> {
        let (source, target) = (entry.source(), entry.target());
        let op = entry.operation();

        let meta = match fs::metadata(source) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(JobError::SourceMissing(source.to_path_buf()));
            }
            Err(e) => return Err(io_err(op, source)(e)),
        };
        if meta.is_dir() {
            return self.create_directory(entry);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err(op, parent))?;
        }
        if target.is_dir() {
            fs::remove_dir_all(target).map_err(io_err(op, target))?;
        }

        if !target.exists() || meta.len() < self.min_block_file_size {
            if target.exists() {
                crate::reconcile::make_writable(target).map_err(io_err(op, target))?;
            }
            fs::copy(source, target).map_err(io_err(op, target))?;
            copy_metadata(source, target)?;
            crate::debug_event!("sync", "copied", "{} bytes to {}", meta.len(), target.display());
        } else {
            let stats = self.reconciler.reconcile(source, target)?;
            {
                let mut totals = self.totals.lock();
                totals.bytes_compared += stats.bytes_compared;
                totals.blocks_rewritten += stats.blocks_rewritten;
                totals.bytes_written += stats.bytes_written;
            }
            crate::debug_event!(
                "sync",
                "reconciled",
                "{} of {} bytes rewritten in {}",
                stats.bytes_written,
                stats.bytes_compared,
                target.display()
            );
        }
        Ok(())
    }

    fn delete(&self, entry: &JobEntry) -> Result<(), JobError> {
        let target = entry.target();
        // Classified from the target side, the source is already gone
        let result = if target.is_dir() {
            fs::remove_dir_all(target)
        } else if target.exists() {
            fs::remove_file(target)
        } else {
            return Ok(());
        };
        result.map_err(io_err(Operation::Delete, target))
    }

    fn rename(&self, entry: &JobEntry) -> Result<(), JobError> {
        let target = entry.target();
        let Some(previous) = entry.previous().filter(|p| p.exists()) else {
            return self.create(entry);
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err(Operation::Rename, parent))?;
        }

        if let Err(e) = fs::rename(previous, target) {
            crate::debug_event!(
                "sync",
                "rename fallback",
                "{} -> {}: {e}",
                previous.display(),
                target.display()
            );
            self.create(entry)?;
            let removed = if previous.is_dir() {
                fs::remove_dir_all(previous)
            } else {
                fs::remove_file(previous)
            };
            removed.map_err(io_err(Operation::Rename, previous))?;
            return Ok(());
        }

        if entry.source().is_file() {
            self.sync_file(entry)?;
        }
        Ok(())
    }

    fn create(&self, entry: &JobEntry) -> Result<(), JobError> {
        if entry.is_directory() || entry.source().is_dir() {
            self.create_directory(entry)
        } else {
            self.sync_file(entry)
        }
    }
}

impl EntryExecutor for FsExecutor {
    fn execute(&self, entry: &JobEntry) -> Result<(), JobError> {
        let _guard = self.stripe(entry.target()).lock();
        match entry.operation() {
            Operation::Create | Operation::Modify => self.create(entry),
            Operation::Delete => self.delete(entry),
            Operation::Rename => self.rename(entry),
        }
    }
}

fn io_err(operation: Operation, path: &Path) -> impl Fn(io::Error) -> JobError + '_ {
    move |source| JobError::Io {
        operation,
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn executor(min_block_file_size: u64) -> FsExecutor {
        let config = SyncConfig {
            block_size: 4,
            block_compare_min_file_size: min_block_file_size,
            ..SyncConfig::default()
        };
        FsExecutor::new(&config).unwrap()
    }

    fn setup() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let tgt = temp.path().join("tgt");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&tgt).unwrap();
        (temp, src, tgt)
    }

    #[test]
    fn test_create_file_creates_parents() {
        let (_temp, src, tgt) = setup();
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("a/b/f.txt"), "hello").unwrap();

        let entry = JobEntry::new(
            Operation::Create,
            false,
            src.join("a/b/f.txt"),
            tgt.join("a/b/f.txt"),
            &src,
        );
        executor(1024).execute(&entry).unwrap();
        assert_eq!(fs::read_to_string(tgt.join("a/b/f.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_modify_uses_block_reconcile_for_large_files() {
        let (_temp, src, tgt) = setup();
        fs::write(src.join("f"), "abcdefgh").unwrap();
        fs::write(tgt.join("f"), "abcdXXXX").unwrap();

        let entry = JobEntry::new(Operation::Modify, false, src.join("f"), tgt.join("f"), &src);
        executor(0).execute(&entry).unwrap();
        assert_eq!(fs::read_to_string(tgt.join("f")).unwrap(), "abcdefgh");
    }

    #[test]
    fn test_create_directory() {
        let (_temp, src, tgt) = setup();
        fs::create_dir_all(src.join("dir")).unwrap();

        let entry = JobEntry::new(Operation::Create, true, src.join("dir"), tgt.join("dir"), &src);
        executor(1024).execute(&entry).unwrap();
        assert!(tgt.join("dir").is_dir());
    }

    #[test]
    fn test_delete_classifies_from_target() {
        let (_temp, src, tgt) = setup();
        fs::create_dir_all(tgt.join("gone_dir/inner")).unwrap();
        fs::write(tgt.join("gone_dir/inner/x"), "x").unwrap();
        fs::write(tgt.join("gone_file"), "x").unwrap();

        let exec = executor(1024);
        // Source side no longer exists, is_directory says nothing useful
        for name in ["gone_dir", "gone_file"] {
            let entry = JobEntry::new(Operation::Delete, false, src.join(name), tgt.join(name), &src);
            exec.execute(&entry).unwrap();
            assert!(!tgt.join(name).exists());
        }
    }

    #[test]
    fn test_delete_missing_target_is_ok() {
        let (_temp, src, tgt) = setup();
        let entry = JobEntry::new(Operation::Delete, false, src.join("x"), tgt.join("x"), &src);
        executor(1024).execute(&entry).unwrap();
    }

    #[test]
    fn test_rename_moves_target() {
        let (_temp, src, tgt) = setup();
        fs::write(src.join("new.txt"), "data").unwrap();
        fs::write(tgt.join("old.txt"), "data").unwrap();

        let entry = JobEntry::rename(false, src.join("new.txt"), tgt.join("new.txt"), tgt.join("old.txt"), &src);
        executor(1024).execute(&entry).unwrap();

        assert!(!tgt.join("old.txt").exists());
        assert_eq!(fs::read_to_string(tgt.join("new.txt")).unwrap(), "data");
    }

    #[test]
    fn test_rename_without_previous_copies() {
        let (_temp, src, tgt) = setup();
        fs::write(src.join("new.txt"), "data").unwrap();

        let entry = JobEntry::rename(false, src.join("new.txt"), tgt.join("new.txt"), tgt.join("old.txt"), &src);
        executor(1024).execute(&entry).unwrap();
        assert_eq!(fs::read_to_string(tgt.join("new.txt")).unwrap(), "data");
    }

    #[test]
    fn test_vanished_source_is_an_error() {
        let (_temp, src, tgt) = setup();
        let entry = JobEntry::new(Operation::Modify, false, src.join("nope"), tgt.join("nope"), &src);
        assert!(matches!(
            executor(1024).execute(&entry),
            Err(JobError::SourceMissing(_))
        ));
    }
}
