//! Engine facade: the source list, the job queue and their lifecycle.
//!
//! One engine per process. It owns the only [`JobQueue`] and hands it to
//! every [`SyncOrchestrator`] it creates. Every configuration mutation is
//! validated against a copy of the whole source list before it is applied.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::jobs::{EntryExecutor, FsExecutor, JobQueue, QueueEvent};
use crate::paths::DirectoryEntry;
use crate::source::SourceConfig;
use crate::store;
use crate::validation;
use crate::watcher::SyncOrchestrator;

pub struct SyncEngine {
    settings: Settings,
    queue: JobQueue,
    sources: RwLock<Vec<SyncOrchestrator>>,
    running: AtomicBool,
}

impl SyncEngine {
    /// Create an engine that applies jobs to the filesystem.
    pub fn new(settings: Settings) -> EngineResult<Self> {
        settings.validate()?;
        let executor = FsExecutor::new(&settings.sync)?;
        Self::with_executor(settings, Arc::new(executor))
    }

    /// Create an engine with a custom entry executor.
    pub fn with_executor(settings: Settings, executor: Arc<dyn EntryExecutor>) -> EngineResult<Self> {
        settings.validate()?;
        let queue = JobQueue::start(executor, settings.sync.parallel_threads)?;
        Ok(Self {
            settings,
            queue,
            sources: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state_file(&self) -> &PathBuf {
        &self.settings.state_file
    }

    /// Replace the source list with the stored one.
    ///
    /// A file that cannot be read starts an empty list and is only logged.
    /// A stored list that fails validation is discarded and the error
    /// returned. Returns the number of sources loaded.
    pub fn load(&self) -> EngineResult<usize> {
        let mut loaded = match store::load(&self.settings.state_file) {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!("[engine] couldn't load sources: {e}");
                Vec::new()
            }
        };

        let validated = validation::validate(&mut loaded);
        if validated.is_err() {
            loaded.clear();
        }

        let orchestrators: Vec<SyncOrchestrator> = loaded
            .into_iter()
            .map(|config| self.orchestrator(config))
            .collect();
        let count = orchestrators.len();

        let previous = std::mem::replace(&mut *self.sources.write(), orchestrators);
        for orchestrator in previous {
            orchestrator.stop_watching();
        }

        validated?;
        crate::log_event!("engine", "loaded", "{count} sources");
        Ok(count)
    }

    /// Write the source list to the state file.
    pub fn save(&self) -> EngineResult<()> {
        let sources = self.sources();
        store::save(&self.settings.state_file, &sources)?;
        crate::debug_event!("engine", "saved", "{} sources", sources.len());
        Ok(())
    }

    /// Watch every source and submit its initial synchronization.
    ///
    /// Watch failures are logged; the source then only gets the initial
    /// sync. Returns the number of jobs submitted.
    pub fn start(&self) -> usize {
        self.running.store(true, Ordering::SeqCst);
        let orchestrators = self.sources.read().clone();

        let mut submitted = 0;
        for orchestrator in &orchestrators {
            if let Err(e) = orchestrator.start_watching() {
                tracing::error!("[engine] {}: {e}", orchestrator.root().display());
            }
            submitted += orchestrator.initial_sync();
        }
        crate::log_event!(
            "engine",
            "started",
            "{} sources, {submitted} jobs",
            orchestrators.len()
        );
        submitted
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Add a source after validating it against all existing ones.
    ///
    /// Returns the new source's index.
    pub fn add_source(&self, path: impl Into<PathBuf>, recursive: bool) -> EngineResult<usize> {
        let mut sources = self.sources.write();
        let mut candidates: Vec<SourceConfig> = sources.iter().map(SyncOrchestrator::config).collect();
        candidates.push(SourceConfig::new(path, recursive));
        validation::validate(&mut candidates)?;

        let Some(config) = candidates.pop() else {
            return Err(EngineError::UnknownSource(sources.len()));
        };
        crate::log_event!("config", "source added", "{config}");

        let orchestrator = self.orchestrator(config);
        if self.is_running() {
            if let Err(e) = orchestrator.start_watching() {
                tracing::error!("[engine] {}: {e}", orchestrator.root().display());
            }
        }
        sources.push(orchestrator);
        Ok(sources.len() - 1)
    }

    /// Remove a source and release its watch. Nothing is deleted on disk.
    pub fn remove_source(&self, index: usize) -> EngineResult<SourceConfig> {
        let mut sources = self.sources.write();
        if index >= sources.len() {
            return Err(EngineError::UnknownSource(index));
        }
        let orchestrator = sources.remove(index);
        drop(sources);

        orchestrator.stop_watching();
        let config = orchestrator.config();
        crate::log_event!("config", "source removed", "{config}");
        Ok(config)
    }

    /// Add a target to a source. With `sync`, the source content is copied
    /// into it; `None` uses the configured default.
    pub fn add_target(
        &self,
        source_index: usize,
        path: impl Into<PathBuf>,
        sync: Option<bool>,
    ) -> EngineResult<DirectoryEntry> {
        let sync = sync.unwrap_or(self.settings.sync.sync_new_targets);
        self.mutate(source_index, |orchestrator, snapshot| {
            orchestrator.add_target(snapshot, source_index, path, sync)
        })
    }

    pub fn remove_target(&self, source_index: usize, target_index: usize) -> EngineResult<DirectoryEntry> {
        self.mutate(source_index, |orchestrator, _| {
            orchestrator.remove_target(source_index, target_index)
        })
    }

    pub fn add_exception(&self, source_index: usize, path: impl Into<PathBuf>) -> EngineResult<DirectoryEntry> {
        self.mutate(source_index, |orchestrator, snapshot| {
            orchestrator.add_exception(snapshot, source_index, path)
        })
    }

    pub fn remove_exception(
        &self,
        source_index: usize,
        exception_index: usize,
    ) -> EngineResult<DirectoryEntry> {
        self.mutate(source_index, |orchestrator, snapshot| {
            orchestrator.remove_exception(snapshot, source_index, exception_index)
        })
    }

    /// Snapshot of every source configuration.
    pub fn sources(&self) -> Vec<SourceConfig> {
        self.sources.read().iter().map(SyncOrchestrator::config).collect()
    }

    /// Orchestrator of one source, for direct event injection.
    pub fn orchestrator_at(&self, index: usize) -> Option<SyncOrchestrator> {
        self.sources.read().get(index).cloned()
    }

    /// Processing job first, then queued jobs.
    pub fn list_jobs(&self) -> Vec<String> {
        self.queue.list_jobs()
    }

    pub fn has_pending_work(&self) -> bool {
        self.queue.has_pending_work()
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.pending_jobs()
    }

    /// Subscribe to queue changes.
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    /// Block until the queue is idle or the timeout elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_idle(timeout)
    }

    /// Stop watching and close the queue.
    ///
    /// Refuses with [`EngineError::PendingJobs`] while work is pending
    /// unless `force` is set. Returns the number of jobs never started.
    pub fn shutdown(&self, force: bool) -> EngineResult<usize> {
        let pending = self.queue.pending_jobs();
        if pending > 0 && !force {
            return Err(EngineError::PendingJobs(pending));
        }

        for orchestrator in self.sources.read().iter() {
            orchestrator.stop_watching();
        }
        self.running.store(false, Ordering::SeqCst);

        let dropped = self.queue.close();
        crate::log_event!("engine", "stopped");
        Ok(dropped)
    }

    fn orchestrator(&self, config: SourceConfig) -> SyncOrchestrator {
        SyncOrchestrator::new(config, self.queue.clone(), self.settings.sync.parallel_sync)
    }

    /// Run a mutation on one source with the whole list as snapshot.
    ///
    /// The write lock serializes mutations, so the snapshot stays current
    /// until the change is committed.
    fn mutate<T>(
        &self,
        index: usize,
        apply: impl FnOnce(&SyncOrchestrator, &[SourceConfig]) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let sources = self.sources.write();
        let orchestrator = sources.get(index).ok_or(EngineError::UnknownSource(index))?;
        let snapshot: Vec<SourceConfig> = sources.iter().map(SyncOrchestrator::config).collect();
        apply(orchestrator, &snapshot)
    }
}

impl Drop for SyncEngine {
    /// The worker thread holds the queue alive, so an engine dropped
    /// without [`SyncEngine::shutdown`] closes it here.
    fn drop(&mut self) {
        if self.queue.is_closed() {
            return;
        }
        for orchestrator in self.sources.get_mut().iter() {
            orchestrator.stop_watching();
        }
        let dropped = self.queue.close();
        crate::debug_event!("engine", "dropped", "{dropped} jobs not started");
    }
}
