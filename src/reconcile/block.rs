//! Block-level compare-and-patch.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::ReconcileError;
use super::attributes::{copy_metadata, make_writable};

/// Counters from one reconciliation, mainly for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Bytes read from each side.
    pub bytes_compared: u64,
    /// Number of blocks that differed and were rewritten.
    pub blocks_rewritten: u64,
    /// Bytes written to the target.
    pub bytes_written: u64,
}

/// Rewrites only the differing blocks of a target file.
#[derive(Debug, Clone, Copy)]
pub struct BlockReconciler {
    block_size: usize,
}

impl BlockReconciler {
    pub fn new(block_size: usize) -> Result<Self, ReconcileError> {
        if block_size == 0 {
            return Err(ReconcileError::ZeroBlockSize);
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Make `target` byte-identical to `source` and copy its metadata.
    ///
    /// Both files must exist. The target is resized to the source length
    /// first; the last block is sized to the remaining bytes. Handles are
    /// closed before metadata is copied.
    pub fn reconcile(&self, source: &Path, target: &Path) -> Result<ReconcileStats, ReconcileError> {
        let stats = self.reconcile_content(source, target)?;
        copy_metadata(source, target)?;
        Ok(stats)
    }

    fn reconcile_content(&self, source: &Path, target: &Path) -> Result<ReconcileStats, ReconcileError> {
        let mut src = File::open(source).map_err(|e| ReconcileError::Open {
            path: source.to_path_buf(),
            source: e,
        })?;

        let mut tgt = open_target(target)?;

        let src_err = |e| ReconcileError::Io {
            path: source.to_path_buf(),
            source: e,
        };
        let tgt_err = |e| ReconcileError::Io {
            path: target.to_path_buf(),
            source: e,
        };

        let length = src.metadata().map_err(src_err)?.len();
        tgt.set_len(length).map_err(tgt_err)?;

        let mut stats = ReconcileStats::default();
        let mut src_buf = vec![0u8; self.block_size];
        let mut tgt_buf = vec![0u8; self.block_size];
        let mut offset = 0u64;

        while offset < length {
            let n = (length - offset).min(self.block_size as u64) as usize;
            src.read_exact(&mut src_buf[..n]).map_err(src_err)?;
            tgt.read_exact(&mut tgt_buf[..n]).map_err(tgt_err)?;

            if src_buf[..n] != tgt_buf[..n] {
                tgt.seek(SeekFrom::Start(offset)).map_err(tgt_err)?;
                tgt.write_all(&src_buf[..n]).map_err(tgt_err)?;
                stats.blocks_rewritten += 1;
                stats.bytes_written += n as u64;
            }

            offset += n as u64;
            stats.bytes_compared += n as u64;
        }

        tgt.flush().map_err(tgt_err)?;
        Ok(stats)
    }
}

/// Open the target read-write, clearing a read-only bit if that is what
/// stands in the way.
fn open_target(target: &Path) -> Result<File, ReconcileError> {
    let open = || OpenOptions::new().read(true).write(true).open(target);
    let open_err = |e| ReconcileError::Open {
        path: target.to_path_buf(),
        source: e,
    };

    match open() {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            make_writable(target).map_err(open_err)?;
            open().map_err(open_err)
        }
        Err(e) => Err(open_err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn pair(source: &[u8], target: &[u8]) -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.bin");
        let tgt = temp.path().join("tgt.bin");
        fs::write(&src, source).unwrap();
        fs::write(&tgt, target).unwrap();
        (temp, src, tgt)
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            BlockReconciler::new(0),
            Err(ReconcileError::ZeroBlockSize)
        ));
    }

    #[test]
    fn test_single_differing_block_is_rewritten() {
        let (_temp, src, tgt) = pair(b"hellx", b"hello");
        let stats = BlockReconciler::new(100).unwrap().reconcile(&src, &tgt).unwrap();

        assert_eq!(fs::read(&tgt).unwrap(), b"hellx");
        assert_eq!(stats.blocks_rewritten, 1);
        assert_eq!(stats.bytes_written, 5);
    }

    #[test]
    fn test_only_changed_blocks_written() {
        let mut source = vec![b'a'; 40];
        let target = source.clone();
        source[25] = b'z';
        let (_temp, src, tgt) = pair(&source, &target);

        let stats = BlockReconciler::new(10).unwrap().reconcile(&src, &tgt).unwrap();
        assert_eq!(stats.blocks_rewritten, 1);
        assert_eq!(stats.bytes_written, 10);
        assert_eq!(fs::read(&tgt).unwrap(), source);
    }

    #[test]
    fn test_zero_length_source() {
        let (_temp, src, tgt) = pair(b"", b"previous content");
        let stats = BlockReconciler::new(4).unwrap().reconcile(&src, &tgt).unwrap();

        assert_eq!(fs::metadata(&tgt).unwrap().len(), 0);
        assert_eq!(stats.bytes_compared, 0);
        assert_eq!(stats.blocks_rewritten, 0);
    }

    #[test]
    fn test_exact_multiple_of_block_size() {
        let (_temp, src, tgt) = pair(b"abcdefgh", b"abcdXXXXtrailing");
        let stats = BlockReconciler::new(4).unwrap().reconcile(&src, &tgt).unwrap();

        assert_eq!(fs::read(&tgt).unwrap(), b"abcdefgh");
        assert_eq!(stats.bytes_compared, 8);
        assert_eq!(stats.blocks_rewritten, 1);
    }

    #[test]
    fn test_target_extended_to_source_length() {
        let (_temp, src, tgt) = pair(b"0123456789", b"012");
        BlockReconciler::new(3).unwrap().reconcile(&src, &tgt).unwrap();
        assert_eq!(fs::read(&tgt).unwrap(), b"0123456789");
    }

    #[test]
    fn test_second_call_changes_nothing() {
        let (_temp, src, tgt) = pair(b"some longer content here", b"other");
        let reconciler = BlockReconciler::new(5).unwrap();
        reconciler.reconcile(&src, &tgt).unwrap();

        let stats = reconciler.reconcile(&src, &tgt).unwrap();
        assert_eq!(stats.blocks_rewritten, 0);
        assert!(crate::reconcile::same_attributes(&src, &tgt).unwrap());
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.bin");
        fs::write(&src, b"x").unwrap();

        let result = BlockReconciler::new(4)
            .unwrap()
            .reconcile(&src, &temp.path().join("absent.bin"));
        assert!(matches!(result, Err(ReconcileError::Open { .. })));
    }

    #[test]
    fn test_read_only_target_is_reconciled() {
        let (_temp, src, tgt) = pair(b"new content", b"old content");
        let mut permissions = fs::metadata(&tgt).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&tgt, permissions).unwrap();

        BlockReconciler::new(4).unwrap().reconcile(&src, &tgt).unwrap();
        assert_eq!(fs::read(&tgt).unwrap(), b"new content");
    }
}
