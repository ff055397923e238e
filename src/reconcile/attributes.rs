//! Timestamp and permission copying.

use std::fs::{self, File, FileTimes, Metadata};
use std::io;
use std::path::Path;

use super::ReconcileError;

/// Copy timestamps and permission bits from `source` to `target`.
///
/// Does nothing if either path is missing or they are not the same kind
/// (file vs directory).
pub fn copy_metadata(source: &Path, target: &Path) -> Result<(), ReconcileError> {
    let wrap = |e| ReconcileError::Metadata {
        from: source.to_path_buf(),
        to: target.to_path_buf(),
        source: e,
    };

    let (Ok(meta), Ok(target_meta)) = (fs::metadata(source), fs::metadata(target)) else {
        return Ok(());
    };
    if meta.is_dir() != target_meta.is_dir() {
        return Ok(());
    }

    let times = file_times(&meta).map_err(wrap)?;
    {
        let handle = open_for_times(target, meta.is_dir()).map_err(wrap)?;
        handle.set_times(times).map_err(wrap)?;
    }

    fs::set_permissions(target, meta.permissions()).map_err(wrap)?;
    Ok(())
}

/// True if the target's modification time and permissions match the source.
///
/// Access times are not compared; reading the source updates them.
pub fn same_attributes(source: &Path, target: &Path) -> Result<bool, ReconcileError> {
    let read = |path: &Path| {
        fs::metadata(path).map_err(|e| ReconcileError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    };
    let src = read(source)?;
    let tgt = read(target)?;

    if src.is_dir() != tgt.is_dir() {
        return Ok(false);
    }
    if src.is_file() && src.len() != tgt.len() {
        return Ok(false);
    }

    let modified_matches = match (src.modified(), tgt.modified()) {
        (Ok(a), Ok(b)) => a == b,
        _ => true,
    };

    Ok(modified_matches && src.permissions() == tgt.permissions())
}

fn file_times(meta: &Metadata) -> io::Result<FileTimes> {
    let mut times = FileTimes::new().set_modified(meta.modified()?);
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileTimesExt;
        if let Ok(created) = meta.created() {
            times = times.set_created(created);
        }
    }
    #[cfg(target_os = "macos")]
    {
        use std::os::macos::fs::FileTimesExt;
        if let Ok(created) = meta.created() {
            times = times.set_created(created);
        }
    }

    Ok(times)
}

#[cfg(unix)]
fn open_for_times(path: &Path, _is_dir: bool) -> io::Result<File> {
    // futimens only needs ownership, a read-only descriptor works for both
    File::open(path)
}

#[cfg(windows)]
fn open_for_times(path: &Path, is_dir: bool) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    const FILE_WRITE_ATTRIBUTES: u32 = 0x0100;
    const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;

    let mut options = fs::OpenOptions::new();
    options.access_mode(FILE_WRITE_ATTRIBUTES);
    if is_dir {
        options.custom_flags(FILE_FLAG_BACKUP_SEMANTICS);
    }
    options.open(path)
}

/// Clear a read-only bit copied from the source so the target can be patched.
pub(crate) fn make_writable(path: &Path) -> io::Result<()> {
    let meta = fs::metadata(path)?;
    let mut permissions = meta.permissions();
    if !permissions.readonly() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    {
        permissions.set_readonly(false);
    }

    fs::set_permissions(path, permissions)
}
