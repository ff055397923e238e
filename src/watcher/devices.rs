//! Storage device identity for the fan-out decision.

use std::collections::HashSet;
use std::path::Path;

use crate::paths::DirectoryEntry;

/// Opaque identity of the device a path lives on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceId {
    #[cfg_attr(not(unix), allow(dead_code))]
    Number(u64),
    #[cfg_attr(unix, allow(dead_code))]
    Prefix(String),
}

/// Device holding `path`, or `None` if it cannot be determined.
#[cfg(unix)]
pub fn device_of(path: &Path) -> Option<DeviceId> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path)
        .ok()
        .map(|meta| DeviceId::Number(meta.dev()))
}

/// Device holding `path`, or `None` if it cannot be determined.
#[cfg(not(unix))]
pub fn device_of(path: &Path) -> Option<DeviceId> {
    use std::path::Component;
    let absolute = std::path::absolute(path).ok()?;
    match absolute.components().next()? {
        Component::Prefix(prefix) => Some(DeviceId::Prefix(
            prefix.as_os_str().to_string_lossy().to_lowercase(),
        )),
        _ => None,
    }
}

/// True if there is more than one target and no two share a device.
///
/// Targets whose device cannot be determined are treated as shared.
pub fn independent_targets(targets: &[DirectoryEntry]) -> bool {
    if targets.len() < 2 {
        return false;
    }
    let mut seen = HashSet::with_capacity(targets.len());
    for target in targets {
        let Some(device) = device_of(target.path()) else {
            return false;
        };
        if !seen.insert(device) {
            return false;
        }
    }
    true
}
