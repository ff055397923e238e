//! Error types for configuration, persistence and the engine facade.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::jobs::JobError;
use crate::reconcile::ReconcileError;
use crate::watcher::WatchError;

/// Which part of a source configuration a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    Source,
    Target,
    Exception,
}

impl fmt::Display for PathRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRole::Source => write!(f, "Source"),
            PathRole::Target => write!(f, "Target"),
            PathRole::Exception => write!(f, "Exception"),
        }
    }
}

/// A configuration that is unsafe to synchronize.
///
/// The display text is the message shown to whoever proposed the change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{role} {index} of source {source_index} doesn't exist: {path}")]
    MissingPath {
        role: PathRole,
        source_index: usize,
        index: usize,
        path: PathBuf,
    },

    #[error("The source {path} appears more than once in sources")]
    DuplicateSource { index: usize, path: PathBuf },

    #[error("The target {path} appears more than once in targets of source {source_index}")]
    DuplicateTarget { source_index: usize, path: PathBuf },

    #[error("The exception {path} appears more than once in exceptions of source {source_index}")]
    DuplicateException { source_index: usize, path: PathBuf },

    #[error("The source {index} {path} has a conflict with source {other_index} {other_path}")]
    SourceConflict {
        index: usize,
        path: PathBuf,
        other_index: usize,
        other_path: PathBuf,
    },

    #[error(
        "The source {index} {path} has a conflict with target {target} of source {other_index} {other_path}"
    )]
    TargetConflict {
        index: usize,
        path: PathBuf,
        other_index: usize,
        other_path: PathBuf,
        target: PathBuf,
    },

    #[error("The source {index} {path} has a conflict with exception {exception_index} {exception}")]
    ExceptionConflict {
        index: usize,
        path: PathBuf,
        exception_index: usize,
        exception: PathBuf,
    },

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Failures loading or saving the source list.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot serialize sources: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the engine facade.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("No source with id {0}")]
    UnknownSource(usize),

    #[error("Source {source_index} has no target with id {index}")]
    UnknownTarget { source_index: usize, index: usize },

    #[error("Source {source_index} has no exception with id {index}")]
    UnknownException { source_index: usize, index: usize },

    #[error("{0} jobs are still pending")]
    PendingJobs(usize),
}

pub type EngineResult<T> = Result<T, EngineError>;
