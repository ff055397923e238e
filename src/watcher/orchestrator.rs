//! Per-source orchestration: initial walk, change events and mutations.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use walkdir::WalkDir;

use super::devices::independent_targets;
use super::error::WatchError;
use super::translate::{Change, EventTranslator};
use crate::error::{EngineError, EngineResult};
use crate::jobs::{Job, JobEntry, JobQueue, Operation};
use crate::paths::{self, DirectoryEntry};
use crate::source::SourceConfig;
use crate::validation;

/// How long a rename `From` half waits for its `To` before it counts as a
/// move out of the source.
pub const RENAME_PAIRING_WINDOW: Duration = Duration::from_millis(500);

/// Owns one source configuration and turns its changes into jobs.
///
/// Cheap to clone; clones share the configuration, the watch and the
/// translator state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: RwLock<SourceConfig>,
    queue: JobQueue,
    parallel_sync: bool,
    /// Cached device independence of the current targets.
    independent: AtomicBool,
    translator: Mutex<EventTranslator>,
    watch: Mutex<Option<ActiveWatch>>,
}

/// A live watch. Dropping `stop` ends the rename flusher thread.
struct ActiveWatch {
    watcher: RecommendedWatcher,
    stop: Sender<()>,
}

impl SyncOrchestrator {
    pub fn new(config: SourceConfig, queue: JobQueue, parallel_sync: bool) -> Self {
        let independent = independent_targets(&config.targets);
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                queue,
                parallel_sync,
                independent: AtomicBool::new(independent),
                translator: Mutex::new(EventTranslator::new()),
                watch: Mutex::new(None),
            }),
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> SourceConfig {
        self.inner.config.read().clone()
    }

    pub fn root(&self) -> PathBuf {
        self.inner.config.read().root().to_path_buf()
    }

    /// Start receiving change notifications for the source root.
    ///
    /// A second call while a watch is active does nothing.
    pub fn start_watching(&self) -> Result<(), WatchError> {
        let mut slot = self.inner.watch.lock();
        if slot.is_some() {
            return Ok(());
        }

        let (root, recursive) = {
            let config = self.inner.config.read();
            (config.root().to_path_buf(), config.recursive)
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match res {
                Ok(event) => {
                    inner.handle_event(&event);
                }
                Err(e) => {
                    let err = WatchError::EventError {
                        details: e.to_string(),
                    };
                    tracing::error!("[watch] {err}");
                }
            }
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&root, mode)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.clone(),
                reason: e.to_string(),
            })?;

        let (stop, stopped) = crossbeam_channel::bounded(0);
        std::thread::Builder::new()
            .name("dirsync-rename-flush".to_string())
            .spawn({
                let weak = Arc::downgrade(&self.inner);
                move || flush_unpaired_renames(weak, stopped)
            })
            .map_err(|e| WatchError::InitFailed {
                reason: format!("rename flusher: {e}"),
            })?;

        *slot = Some(ActiveWatch { watcher, stop });
        crate::log_event!("watch", "started", "{} (recursive: {recursive})", root.display());
        Ok(())
    }

    /// Release the watch. Unpaired rename halves are applied as removals.
    pub fn stop_watching(&self) {
        let Some(active) = self.inner.watch.lock().take() else {
            return;
        };
        drop(active.stop);
        drop(active.watcher);

        let leftovers = self.inner.translator.lock().flush();
        for change in leftovers {
            self.inner.on_change(change);
        }
        crate::log_event!("watch", "stopped", "{}", self.root().display());
    }

    pub fn is_watching(&self) -> bool {
        self.inner.watch.lock().is_some()
    }

    /// Walk the source once and mirror every entry into every target.
    ///
    /// Returns the number of jobs submitted.
    pub fn initial_sync(&self) -> usize {
        let config = self.inner.config.read().clone();
        let submitted: usize = walk(&config, config.root(), 1)
            .into_iter()
            .map(|(path, is_dir)| {
                self.inner
                    .fan_out(&config, &config.targets, |target| {
                        create_entry(&config, &path, is_dir, target)
                    })
            })
            .sum();
        crate::log_event!(
            "sync",
            "initial sync",
            "{submitted} jobs for {}",
            config.root().display()
        );
        submitted
    }

    /// Mirror the whole source into one target only.
    pub fn sync_target(&self, target: &DirectoryEntry) -> usize {
        let config = self.inner.config.read().clone();
        let submitted = walk(&config, config.root(), 1)
            .into_iter()
            .filter_map(|(path, is_dir)| create_entry(&config, &path, is_dir, target))
            .filter_map(|entry| self.inner.queue.submit(Job::single(entry)))
            .count();
        crate::log_event!("sync", "target sync", "{submitted} jobs for {target}");
        submitted
    }

    /// Translate one raw notification and submit the resulting jobs.
    pub fn handle_event(&self, event: &Event) -> usize {
        self.inner.handle_event(event)
    }

    /// Submit the jobs for one already translated change.
    pub fn on_change(&self, change: Change) -> usize {
        self.inner.on_change(change)
    }

    /// Add a target after validating the whole configuration with it.
    ///
    /// `snapshot` is the full source list with this source at `index`. On
    /// success the normalized entry is committed and, if `sync` is set, the
    /// existing source content is copied into it.
    pub fn add_target(
        &self,
        snapshot: &[SourceConfig],
        index: usize,
        path: impl Into<PathBuf>,
        sync: bool,
    ) -> EngineResult<DirectoryEntry> {
        let candidate = propose(snapshot, index, |config| {
            config.targets.push(DirectoryEntry::new(path));
        })?;
        let Some(added) = candidate.targets.last().cloned() else {
            return Err(EngineError::UnknownSource(index));
        };
        self.commit(candidate);

        crate::log_event!("config", "target added", "{added}");
        if sync {
            self.sync_target(&added);
        }
        Ok(added)
    }

    /// Remove the target at `target_index`. Nothing is deleted on disk.
    pub fn remove_target(&self, source_index: usize, target_index: usize) -> EngineResult<DirectoryEntry> {
        let mut config = self.inner.config.write();
        if target_index >= config.targets.len() {
            return Err(EngineError::UnknownTarget {
                source_index,
                index: target_index,
            });
        }
        let removed = config.targets.remove(target_index);
        self.inner
            .independent
            .store(independent_targets(&config.targets), Ordering::Relaxed);
        drop(config);

        crate::log_event!("config", "target removed", "{removed}");
        Ok(removed)
    }

    /// Add an exception after validating the whole configuration with it.
    pub fn add_exception(
        &self,
        snapshot: &[SourceConfig],
        index: usize,
        path: impl Into<PathBuf>,
    ) -> EngineResult<DirectoryEntry> {
        let candidate = propose(snapshot, index, |config| {
            config.exceptions.push(DirectoryEntry::new(path));
        })?;
        let Some(added) = candidate.exceptions.last().cloned() else {
            return Err(EngineError::UnknownSource(index));
        };
        self.commit(candidate);

        crate::log_event!("config", "exception added", "{added}");
        Ok(added)
    }

    /// Remove an exception. Re-validated, since dropping an exception can
    /// expose a nested source.
    pub fn remove_exception(
        &self,
        snapshot: &[SourceConfig],
        index: usize,
        exception_index: usize,
    ) -> EngineResult<DirectoryEntry> {
        let current = snapshot.get(index).ok_or(EngineError::UnknownSource(index))?;
        let Some(removed) = current.exceptions.get(exception_index).cloned() else {
            return Err(EngineError::UnknownException {
                source_index: index,
                index: exception_index,
            });
        };
        let candidate = propose(snapshot, index, |config| {
            config.exceptions.remove(exception_index);
        })?;
        self.commit(candidate);

        crate::log_event!("config", "exception removed", "{removed}");
        Ok(removed)
    }

    fn commit(&self, candidate: SourceConfig) {
        let independent = independent_targets(&candidate.targets);
        *self.inner.config.write() = candidate;
        self.inner.independent.store(independent, Ordering::Relaxed);
    }
}

impl Inner {
    fn handle_event(&self, event: &Event) -> usize {
        let changes = self.translator.lock().translate(event);
        changes.into_iter().map(|change| self.on_change(change)).sum()
    }

    /// Apply rename halves that waited past `window` as removals.
    fn expire_renames(&self, window: Duration) -> usize {
        let expired = self.translator.lock().expire(window);
        expired.into_iter().map(|change| self.on_change(change)).sum()
    }

    fn on_change(&self, change: Change) -> usize {
        let config = self.config.read().clone();
        if config.targets.is_empty() {
            return 0;
        }

        match change {
            Change::Created(path) => self.created(&config, &path),
            Change::Modified(path) => {
                if !in_scope(&config, &path) || path.is_dir() {
                    return 0;
                }
                crate::debug_event!("watch", "modified", "{}", path.display());
                self.fan_out(&config, &config.targets, |target| {
                    let target_path = config.target_path(&path, target)?;
                    Some(JobEntry::new(
                        Operation::Modify,
                        false,
                        &path,
                        target_path,
                        config.root(),
                    ))
                })
            }
            Change::Removed(path) => self.removed(&config, &path),
            Change::Renamed { from, to } => {
                match (in_scope(&config, &from), in_scope(&config, &to)) {
                    (true, true) => {
                        crate::debug_event!(
                            "watch",
                            "renamed",
                            "{} -> {}",
                            from.display(),
                            to.display()
                        );
                        let is_dir = to.is_dir();
                        self.fan_out(&config, &config.targets, |target| {
                            let previous = config.target_path(&from, target)?;
                            let target_path = config.target_path(&to, target)?;
                            Some(JobEntry::rename(
                                is_dir,
                                &to,
                                target_path,
                                previous,
                                config.root(),
                            ))
                        })
                    }
                    (false, true) => self.created(&config, &to),
                    (true, false) => self.removed(&config, &from),
                    (false, false) => 0,
                }
            }
        }
    }

    fn created(&self, config: &SourceConfig, path: &Path) -> usize {
        if !in_scope(config, path) {
            return 0;
        }
        crate::debug_event!("watch", "created", "{}", path.display());

        // A directory moved in arrives as one event; mirror its contents too
        if path.is_dir() && config.recursive {
            return walk(config, path, 0)
                .into_iter()
                .map(|(p, is_dir)| {
                    self.fan_out(config, &config.targets, |target| {
                        create_entry(config, &p, is_dir, target)
                    })
                })
                .sum();
        }

        let is_dir = path.is_dir();
        self.fan_out(config, &config.targets, |target| {
            create_entry(config, path, is_dir, target)
        })
    }

    fn removed(&self, config: &SourceConfig, path: &Path) -> usize {
        if !in_scope(config, path) {
            return 0;
        }
        crate::debug_event!("watch", "removed", "{}", path.display());
        self.fan_out(config, &config.targets, |target| {
            let target_path = config.target_path(path, target)?;
            // The source is gone; classify from what the target holds
            let is_dir = target_path.is_dir();
            Some(JobEntry::new(
                Operation::Delete,
                is_dir,
                path,
                target_path,
                config.root(),
            ))
        })
    }

    /// Submit one change for every target: one job when the targets may
    /// run in parallel, otherwise one job per target. Returns jobs submitted.
    fn fan_out(
        &self,
        config: &SourceConfig,
        targets: &[DirectoryEntry],
        build: impl Fn(&DirectoryEntry) -> Option<JobEntry>,
    ) -> usize {
        let entries: Vec<JobEntry> = targets.iter().filter_map(build).collect();
        if entries.is_empty() {
            return 0;
        }

        let parallel = self.parallel_sync
            && entries.len() > 1
            && targets.len() == config.targets.len()
            && self.independent.load(Ordering::Relaxed);
        if parallel {
            return usize::from(self.queue.submit(Job::new(entries)).is_some());
        }
        entries
            .into_iter()
            .filter_map(|entry| self.queue.submit(Job::single(entry)))
            .count()
    }
}

/// Flusher loop for one watch: a `From` half without its `To` means the
/// path left the source, which no later event would otherwise report.
fn flush_unpaired_renames(inner: Weak<Inner>, stopped: Receiver<()>) {
    let ticker = crossbeam_channel::tick(RENAME_PAIRING_WINDOW / 2);
    loop {
        crossbeam_channel::select! {
            recv(stopped) -> _ => break,
            recv(ticker) -> _ => {
                let Some(inner) = inner.upgrade() else { break };
                if !inner.translator.lock().has_pending() {
                    continue;
                }
                let submitted = inner.expire_renames(RENAME_PAIRING_WINDOW);
                if submitted > 0 {
                    crate::debug_event!("watch", "moved out", "{submitted} jobs");
                }
            }
        }
    }
}

/// Clone the snapshot, apply `mutate` to the source at `index`, validate the
/// whole set and return the normalized candidate.
fn propose(
    snapshot: &[SourceConfig],
    index: usize,
    mutate: impl FnOnce(&mut SourceConfig),
) -> EngineResult<SourceConfig> {
    let mut candidates = snapshot.to_vec();
    let candidate = candidates
        .get_mut(index)
        .ok_or(EngineError::UnknownSource(index))?;
    mutate(candidate);
    validation::validate(&mut candidates)?;
    Ok(candidates.swap_remove(index))
}

/// True if a change at `path` concerns this source.
fn in_scope(config: &SourceConfig, path: &Path) -> bool {
    if !paths::is_sub_directory_of_path(path, config.root()) {
        return false;
    }
    if !config.recursive {
        let direct = path
            .parent()
            .is_some_and(|parent| paths::is_same_path(parent, config.root()));
        if !direct {
            return false;
        }
    }
    !config.is_excluded(path)
}

fn create_entry(
    config: &SourceConfig,
    path: &Path,
    is_dir: bool,
    target: &DirectoryEntry,
) -> Option<JobEntry> {
    let target_path = config.target_path(path, target)?;
    Some(JobEntry::new(
        Operation::Create,
        is_dir,
        path,
        target_path,
        config.root(),
    ))
}

/// Entries below `from`, directories before their contents, skipping
/// exceptions. Non-recursive sources only see the root's direct children.
fn walk(config: &SourceConfig, from: &Path, min_depth: usize) -> Vec<(PathBuf, bool)> {
    let mut walker = WalkDir::new(from).min_depth(min_depth);
    if !config.recursive {
        walker = walker.max_depth(1);
    }
    walker
        .into_iter()
        .filter_entry(|e| !config.is_excluded(e.path()))
        .filter_map(|res| match res {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("[sync] skipping unreadable entry: {e}");
                None
            }
        })
        .map(|entry| {
            let is_dir = entry.file_type().is_dir();
            (entry.into_path(), is_dir)
        })
        .collect()
}
