//! Configuration validation.
//!
//! Decides whether a set of sources, targets and exceptions is safe to
//! synchronize. Validation is fail-fast: the first violated rule aborts with
//! its own message. Callers validate after every single edit, so at most one
//! new violation can appear per call.

use std::path::Path;

use crate::error::{ConfigError, PathRole};
use crate::paths::{DirectoryEntry, is_same_path, is_sub_directory_of_path};
use crate::source::SourceConfig;

/// Validate a whole configuration.
///
/// Pass 1 checks that every path exists and rewrites it to canonical form in
/// place. Pass 2 checks each source against the full set for duplicates and
/// overlaps.
pub fn validate(sources: &mut [SourceConfig]) -> Result<(), ConfigError> {
    normalize_existing(sources)?;

    let sources: &[SourceConfig] = sources;
    for (index, source) in sources.iter().enumerate() {
        check_duplicate_source(sources, index, source)?;
        check_duplicate_entries(index, source)?;
        check_ancestor_conflicts(sources, index, source)?;
        check_target_overlap(sources, index, source)?;
        check_exceptions(index, source)?;
    }

    Ok(())
}

fn normalize_existing(sources: &mut [SourceConfig]) -> Result<(), ConfigError> {
    for (source_index, source) in sources.iter_mut().enumerate() {
        source.path = normalize(&source.path, PathRole::Source, source_index, source_index)?;

        for (index, target) in source.targets.iter_mut().enumerate() {
            *target = normalize(target, PathRole::Target, source_index, index)?;
        }
        for (index, exception) in source.exceptions.iter_mut().enumerate() {
            *exception = normalize(exception, PathRole::Exception, source_index, index)?;
        }
    }
    Ok(())
}

fn normalize(
    entry: &DirectoryEntry,
    role: PathRole,
    source_index: usize,
    index: usize,
) -> Result<DirectoryEntry, ConfigError> {
    if !entry.exists() {
        return Err(ConfigError::MissingPath {
            role,
            source_index,
            index,
            path: entry.path().to_path_buf(),
        });
    }
    Ok(entry.normalized())
}

/// True if one of `exceptions` equals `path` or is an ancestor of it.
fn excluded_by(exceptions: &[DirectoryEntry], path: &Path) -> bool {
    exceptions
        .iter()
        .any(|e| is_same_path(e.path(), path) || is_sub_directory_of_path(path, e.path()))
}

fn check_duplicate_source(
    sources: &[SourceConfig],
    index: usize,
    source: &SourceConfig,
) -> Result<(), ConfigError> {
    let duplicate = sources
        .iter()
        .enumerate()
        .any(|(other, s)| other != index && s.path == source.path);

    if duplicate {
        return Err(ConfigError::DuplicateSource {
            index,
            path: source.root().to_path_buf(),
        });
    }
    Ok(())
}

fn check_duplicate_entries(index: usize, source: &SourceConfig) -> Result<(), ConfigError> {
    if let Some(target) = first_duplicate(&source.targets) {
        return Err(ConfigError::DuplicateTarget {
            source_index: index,
            path: target.path().to_path_buf(),
        });
    }
    if let Some(exception) = first_duplicate(&source.exceptions) {
        return Err(ConfigError::DuplicateException {
            source_index: index,
            path: exception.path().to_path_buf(),
        });
    }
    Ok(())
}

fn first_duplicate(entries: &[DirectoryEntry]) -> Option<&DirectoryEntry> {
    entries
        .iter()
        .enumerate()
        .find(|(i, entry)| entries[i + 1..].contains(entry))
        .map(|(_, entry)| entry)
}

fn check_ancestor_conflicts(
    sources: &[SourceConfig],
    index: usize,
    source: &SourceConfig,
) -> Result<(), ConfigError> {
    let root = source.root();

    // Another source above this one that does not exclude it
    let parent = sources.iter().enumerate().find(|(_, p)| {
        is_sub_directory_of_path(root, p.root()) && !excluded_by(&p.exceptions, root)
    });

    // Another source below this one that this one does not exclude
    let child = sources.iter().enumerate().find(|(_, c)| {
        is_sub_directory_of_path(c.root(), root) && !excluded_by(&source.exceptions, c.root())
    });

    match parent.or(child) {
        Some((other_index, other)) => Err(ConfigError::SourceConflict {
            index,
            path: root.to_path_buf(),
            other_index,
            other_path: other.root().to_path_buf(),
        }),
        None => Ok(()),
    }
}

fn check_target_overlap(
    sources: &[SourceConfig],
    index: usize,
    source: &SourceConfig,
) -> Result<(), ConfigError> {
    let root = source.root();

    for (other_index, owner) in sources.iter().enumerate() {
        let conflict = owner.targets.iter().find(|target| {
            let target = target.path();
            is_same_path(root, target)
                || (is_sub_directory_of_path(target, root) && !excluded_by(&owner.exceptions, target))
                || (is_sub_directory_of_path(root, target) && !excluded_by(&owner.exceptions, root))
        });

        if let Some(target) = conflict {
            return Err(ConfigError::TargetConflict {
                index,
                path: root.to_path_buf(),
                other_index,
                other_path: owner.root().to_path_buf(),
                target: target.path().to_path_buf(),
            });
        }
    }
    Ok(())
}

fn check_exceptions(index: usize, source: &SourceConfig) -> Result<(), ConfigError> {
    let root = source.root();
    let malformed = source
        .exceptions
        .iter()
        .enumerate()
        .find(|(_, e)| is_same_path(root, e.path()) || !is_sub_directory_of_path(e.path(), root));

    match malformed {
        Some((exception_index, exception)) => Err(ConfigError::ExceptionConflict {
            index,
            path: root.to_path_buf(),
            exception_index,
            exception: exception.path().to_path_buf(),
        }),
        None => Ok(()),
    }
}
