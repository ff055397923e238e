//! Job and job entry types.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::reconcile::ReconcileError;

/// Kind of filesystem change to replay on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Modify,
    Delete,
    Rename,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "Create",
            Operation::Modify => "Modify",
            Operation::Delete => "Delete",
            Operation::Rename => "Rename",
        };
        f.write_str(name)
    }
}

/// Identifier of an entry, assigned when its job is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntryId(pub(crate) u64);

/// Identifier of a job, assigned when it is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Processing,
    Done,
}

/// One concrete source to target filesystem operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEntry {
    id: EntryId,
    operation: Operation,
    is_directory: bool,
    source: PathBuf,
    target: PathBuf,
    previous: Option<PathBuf>,
    source_root: PathBuf,
}

impl JobEntry {
    pub fn new(
        operation: Operation,
        is_directory: bool,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        source_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: EntryId::default(),
            operation,
            is_directory,
            source: source.into(),
            target: target.into(),
            previous: None,
            source_root: source_root.into(),
        }
    }

    /// A rename from `previous` to `target` on the target side.
    pub fn rename(
        is_directory: bool,
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        previous: impl Into<PathBuf>,
        source_root: impl Into<PathBuf>,
    ) -> Self {
        let mut entry = Self::new(Operation::Rename, is_directory, source, target, source_root);
        entry.previous = Some(previous.into());
        entry
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn previous(&self) -> Option<&Path> {
        self.previous.as_deref()
    }

    /// Root of the source configuration this entry belongs to.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }
}

impl fmt::Display for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_directory { "directory" } else { "file" };
        match &self.previous {
            Some(previous) => write!(
                f,
                "{} {kind} {} -> {}",
                self.operation,
                previous.display(),
                self.target.display()
            ),
            None => write!(
                f,
                "{} {kind} {} -> {}",
                self.operation,
                self.source.display(),
                self.target.display()
            ),
        }
    }
}

/// One unit of scheduling: one logical change, possibly fanned out to
/// several targets.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    entries: Vec<JobEntry>,
    pending: HashSet<EntryId>,
    state: JobState,
}

impl Job {
    pub fn new(entries: Vec<JobEntry>) -> Self {
        Self {
            id: JobId::default(),
            entries,
            pending: HashSet::new(),
            state: JobState::Queued,
        }
    }

    pub fn single(entry: JobEntry) -> Self {
        Self::new(vec![entry])
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn entries(&self) -> &[JobEntry] {
        &self.entries
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries not yet reported finished.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Assign ids and reset bookkeeping; called by the queue on submit.
    pub(crate) fn assign_ids(&mut self, id: JobId, mut next_entry: impl FnMut() -> EntryId) {
        self.id = id;
        self.state = JobState::Queued;
        self.pending.clear();
        for entry in &mut self.entries {
            entry.id = next_entry();
            self.pending.insert(entry.id);
        }
    }

    pub(crate) fn start(&mut self) {
        if self.state == JobState::Queued {
            self.state = JobState::Processing;
        }
    }

    /// Mark one entry finished. Returns true if the job is now done.
    pub(crate) fn finish_entry(&mut self, entry: EntryId) -> bool {
        if self.state != JobState::Processing || !self.pending.remove(&entry) {
            return false;
        }
        if self.pending.is_empty() {
            self.state = JobState::Done;
            return true;
        }
        false
    }

    pub(crate) fn contains(&self, entry: EntryId) -> bool {
        self.pending.contains(&entry)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            JobState::Queued => "Queued",
            JobState::Processing => "Processing",
            JobState::Done => "Done",
        };
        write!(f, "{} {state}", self.id)?;
        match self.entries.as_slice() {
            [] => Ok(()),
            [only] => write!(f, ": {only}"),
            [first, rest @ ..] => write!(
                f,
                ": {first} (+{} more, {} pending)",
                rest.len(),
                self.pending.len()
            ),
        }
    }
}

/// Errors from executing a job entry or running the queue.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("{operation} failed on {path}: {source}")]
    Io {
        operation: Operation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Source vanished before it could be copied: {0}")]
    SourceMissing(PathBuf),

    #[error("Entry panicked: {0}")]
    Panicked(String),

    #[error("Failed to start worker: {0}")]
    Spawn(String),
}
