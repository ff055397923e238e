//! Canonical path handling for sources, targets and exceptions.
//!
//! Paths are compared through a canonical key: separators unified to `/`,
//! trailing separators stripped and case folded. Two spellings of the same
//! location therefore compare equal regardless of platform conventions.
//!
//! The free functions (`canonical_key`, `is_same_path`,
//! `is_sub_directory_of_path`) are pure string operations and never touch
//! the filesystem. They are shared by validation, the initial tree walk and
//! event translation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A filesystem path plus its canonical comparison key.
///
/// Equality and hashing use the canonical key only, so `C:\Data\` and
/// `c:/data` are the same entry.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    path: PathBuf,
    key: String,
}

impl DirectoryEntry {
    /// Create an entry for a directory path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = strip_trailing_separator(path.into());
        let key = canonical_key(&path, false);
        Self { path, key }
    }

    /// Create an entry for a file path.
    ///
    /// The parent is canonicalized as a directory and the leaf appended.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = strip_trailing_separator(path.into());
        let key = canonical_key(&path, true);
        Self { path, key }
    }

    /// The path used for I/O.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The canonical comparison key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Rewrite to canonical form: absolute, lexically normalized.
    ///
    /// Relative paths are resolved against the current directory. Symlinks
    /// are not resolved.
    pub fn normalized(&self) -> Self {
        let absolute = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        Self::new(normalize_lexically(&absolute))
    }

    /// Path of `path` relative to this entry, if it lies at or below it.
    pub fn relative(&self, path: &Path) -> Option<PathBuf> {
        let child = canonical_key(path, false);
        if child == self.key {
            return Some(PathBuf::new());
        }
        if !is_prefix_at_boundary(&self.key, &child) {
            return None;
        }
        // Count the segments below the root and take that many trailing
        // components from the original path to keep its spelling.
        let rest = child[self.key.len()..].trim_start_matches('/');
        let depth = rest.split('/').filter(|s| !s.is_empty()).count();
        let components: Vec<_> = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        let start = components.len().checked_sub(depth)?;
        Some(components[start..].iter().collect())
    }
}

impl PartialEq for DirectoryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DirectoryEntry {}

impl Hash for DirectoryEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<&Path> for DirectoryEntry {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for DirectoryEntry {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl Serialize for DirectoryEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.path.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DirectoryEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PathBuf::deserialize(deserializer).map(Self::new)
    }
}

/// Canonical comparison key of a path.
///
/// Backslashes become `/`, surrounding whitespace and trailing separators are
/// removed and the result is lowercased. The filesystem root keeps its
/// single `/`. For files the parent is canonicalized separately and the leaf
/// name appended.
pub fn canonical_key(path: &Path, is_file: bool) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let trimmed = raw.trim();

    if is_file {
        if let Some((parent, leaf)) = trimmed.trim_end_matches('/').rsplit_once('/') {
            let parent = if parent.is_empty() {
                String::new()
            } else {
                canonical_key(Path::new(parent), false)
            };
            let parent = parent.trim_end_matches('/');
            return format!("{parent}/{}", leaf.to_lowercase());
        }
    }

    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() && trimmed.starts_with('/') {
        return "/".to_string();
    }
    stripped.to_lowercase()
}

/// True if both paths canonicalize to the same key.
pub fn is_same_path(a: &Path, b: &Path) -> bool {
    canonical_key(a, false) == canonical_key(b, false)
}

/// True if `sub` lies strictly below `parent`.
///
/// The comparison happens on canonical keys at a segment boundary, so
/// `/data/abc` is not below `/data/ab`.
pub fn is_sub_directory_of_path(sub: &Path, parent: &Path) -> bool {
    let sub = canonical_key(sub, false);
    let parent = canonical_key(parent, false);
    sub != parent && is_prefix_at_boundary(&parent, &sub)
}

/// True if `path` equals or lies below any of `roots`.
pub fn is_covered_by<'a>(path: &Path, roots: impl IntoIterator<Item = &'a DirectoryEntry>) -> bool {
    roots
        .into_iter()
        .any(|root| is_same_path(root.path(), path) || is_sub_directory_of_path(path, root.path()))
}

fn is_prefix_at_boundary(parent: &str, child: &str) -> bool {
    if !child.starts_with(parent) || child.len() <= parent.len() {
        return false;
    }
    parent.ends_with('/') || child.as_bytes()[parent.len()] == b'/'
}

fn strip_trailing_separator(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches(['/', '\\']);
    // Keep roots such as "/" and "C:\" intact
    if trimmed.is_empty() || trimmed.ends_with(':') || trimmed.len() == s.len() {
        return path;
    }
    PathBuf::from(trimmed)
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
