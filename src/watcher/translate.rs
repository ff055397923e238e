//! Translation of raw `notify` events into source changes.
//!
//! Backends report renames differently: inotify sends a `From` half and a
//! `To` half linked by a tracker cookie (and sometimes a combined `Both`),
//! others only send `Both`, and FSEvents cannot tell the halves apart at
//! all. The translator pairs halves by tracker so each rename is reported
//! exactly once. A `From` half whose `To` never arrives (moved out of the
//! watched tree) is reported as a removal by [`EventTranslator::expire`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// A change observed under a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl Change {
    /// The path the change ends up at.
    pub fn path(&self) -> &PathBuf {
        match self {
            Change::Created(p) | Change::Modified(p) | Change::Removed(p) => p,
            Change::Renamed { to, .. } => to,
        }
    }
}

/// Stateful event translator; one per watched source.
#[derive(Debug, Default)]
pub struct EventTranslator {
    /// `From` halves waiting for their `To`, by tracker, with arrival time.
    pending_from: Vec<(usize, PathBuf, Instant)>,
    /// Trackers already reported, so a trailing `Both` is skipped.
    paired: HashSet<usize>,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one event. Unpaired `From` halves are flushed as removals
    /// when an unrelated event arrives.
    pub fn translate(&mut self, event: &Event) -> Vec<Change> {
        let tracker = event.tracker();
        let first = event.paths.first().cloned();

        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                let Some(path) = first else { return Vec::new() };
                match tracker {
                    Some(t) => {
                        self.pending_from.push((t, path, Instant::now()));
                        Vec::new()
                    }
                    None => vec![Change::Removed(path)],
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let Some(to) = first else { return Vec::new() };
                let matched = tracker.and_then(|t| {
                    let index = self.pending_from.iter().position(|(pt, ..)| *pt == t)?;
                    self.paired.insert(t);
                    Some(self.pending_from.remove(index).1)
                });
                match matched {
                    Some(from) => vec![Change::Renamed { from, to }],
                    None => {
                        let mut changes = self.flush();
                        changes.push(Change::Created(to));
                        changes
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if tracker.is_some_and(|t| self.paired.remove(&t)) {
                    return Vec::new();
                }
                if let Some(t) = tracker {
                    self.pending_from.retain(|(pt, ..)| *pt != t);
                }
                match event.paths.as_slice() {
                    [from, to, ..] => vec![Change::Renamed {
                        from: from.clone(),
                        to: to.clone(),
                    }],
                    _ => Vec::new(),
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                let mut changes = self.flush();
                changes.extend(event.paths.iter().map(|p| {
                    if p.exists() {
                        Change::Created(p.clone())
                    } else {
                        Change::Removed(p.clone())
                    }
                }));
                changes
            }
            EventKind::Create(_) => self.with_flush(event, Change::Created),
            EventKind::Modify(_) => self.with_flush(event, Change::Modified),
            EventKind::Remove(_) => self.with_flush(event, Change::Removed),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }

    /// Report every unpaired `From` half as a removal.
    pub fn flush(&mut self) -> Vec<Change> {
        self.paired.clear();
        self.pending_from
            .drain(..)
            .map(|(_, path, _)| Change::Removed(path))
            .collect()
    }

    /// Report `From` halves that waited longer than `window` as removals.
    pub fn expire(&mut self, window: Duration) -> Vec<Change> {
        let now = Instant::now();
        let (expired, waiting): (Vec<_>, Vec<_>) = self
            .pending_from
            .drain(..)
            .partition(|(_, _, at)| now.duration_since(*at) >= window);
        self.pending_from = waiting;
        expired
            .into_iter()
            .map(|(_, path, _)| Change::Removed(path))
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_from.is_empty()
    }

    fn with_flush(&mut self, event: &Event, make: fn(PathBuf) -> Change) -> Vec<Change> {
        let mut changes = self.flush();
        changes.extend(event.paths.iter().cloned().map(make));
        changes
    }
}
