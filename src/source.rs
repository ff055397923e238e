//! Source tree configuration: one root, its targets and excluded sub-trees.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths::{self, DirectoryEntry};

/// One source tree and where it is mirrored to.
///
/// Plain value aggregate; cloning gives an independent deep copy, which is
/// how proposed mutations are validated without touching live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root of the tree to mirror.
    pub path: DirectoryEntry,

    /// Whether sub-directories are mirrored.
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Mirrors, in insertion order.
    #[serde(default)]
    pub targets: Vec<DirectoryEntry>,

    /// Sub-trees of the source that are never mirrored.
    #[serde(default)]
    pub exceptions: Vec<DirectoryEntry>,
}

fn default_true() -> bool {
    true
}

impl SourceConfig {
    pub fn new(path: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            path: DirectoryEntry::new(path),
            recursive,
            targets: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    /// Builder-style target addition, mostly for tests and loading.
    pub fn with_target(mut self, path: impl Into<PathBuf>) -> Self {
        self.targets.push(DirectoryEntry::new(path));
        self
    }

    /// Builder-style exception addition.
    pub fn with_exception(mut self, path: impl Into<PathBuf>) -> Self {
        self.exceptions.push(DirectoryEntry::new(path));
        self
    }

    pub fn root(&self) -> &Path {
        self.path.path()
    }

    /// True if `path` is an exception or lies below one.
    pub fn is_excluded(&self, path: &Path) -> bool {
        paths::is_covered_by(path, &self.exceptions)
    }

    /// Map a path under the source root to the same location under `target`.
    pub fn target_path(&self, source_path: &Path, target: &DirectoryEntry) -> Option<PathBuf> {
        let relative = self.path.relative(source_path)?;
        if relative.as_os_str().is_empty() {
            return Some(target.path().to_path_buf());
        }
        Some(target.path().join(relative))
    }

    /// The target root that `path` lies under, if any.
    pub fn target_for(&self, path: &Path) -> Option<&DirectoryEntry> {
        self.targets
            .iter()
            .find(|t| paths::is_same_path(t.path(), path) || paths::is_sub_directory_of_path(path, t.path()))
    }
}

impl fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}    Recursive: {}", self.path, self.recursive)
    }
}
