//! FIFO job queue with a single worker.
//!
//! At most one job is `Processing` at a time, so changes reach a target in
//! the order they were observed. Entries of a fanned-out job run
//! concurrently on a small rayon pool; the worker waits on a condition
//! variable until every entry has reported back.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};

use super::types::{EntryId, Job, JobEntry, JobError, JobId, JobState};

/// Executes the filesystem side effect of one entry.
pub trait EntryExecutor: Send + Sync + 'static {
    fn execute(&self, entry: &JobEntry) -> Result<(), JobError>;
}

impl<F> EntryExecutor for F
where
    F: Fn(&JobEntry) -> Result<(), JobError> + Send + Sync + 'static,
{
    fn execute(&self, entry: &JobEntry) -> Result<(), JobError> {
        self(entry)
    }
}

/// Change notifications for observers such as a status display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Submitted(JobId),
    Started(JobId),
    EntryFinished { job: JobId, entry: EntryId },
    Completed(JobId),
}

#[derive(Default)]
struct QueueState {
    queued: VecDeque<Job>,
    processing: Option<Job>,
    next_job: u64,
    next_entry: u64,
    closed: bool,
    subscribers: Vec<Sender<QueueEvent>>,
}

impl QueueState {
    fn emit(&mut self, event: QueueEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn has_pending_work(&self) -> bool {
        !self.queued.is_empty() || self.processing.is_some()
    }
}

struct Shared {
    state: Mutex<QueueState>,
    changed: Condvar,
    executor: Arc<dyn EntryExecutor>,
    pool: rayon::ThreadPool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the process-wide job queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<Shared>,
}

impl JobQueue {
    /// Start the queue and its worker thread.
    ///
    /// `parallel_threads` sizes the pool used for fanned-out entries.
    pub fn start(executor: Arc<dyn EntryExecutor>, parallel_threads: usize) -> Result<Self, JobError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallel_threads.max(1))
            .thread_name(|i| format!("dirsync-entry-{i}"))
            .build()
            .map_err(|e| JobError::Spawn(e.to_string()))?;

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            changed: Condvar::new(),
            executor,
            pool,
            worker: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("dirsync-queue".to_string())
            .spawn(move || run_worker(worker_shared))
            .map_err(|e| JobError::Spawn(e.to_string()))?;
        *shared.worker.lock() = Some(handle);

        crate::debug_event!("queue", "started", "{} entry threads", parallel_threads.max(1));
        Ok(Self { shared })
    }

    /// Append a job and wake the worker. Empty jobs are ignored.
    pub fn submit(&self, mut job: Job) -> Option<JobId> {
        if job.is_empty() {
            return None;
        }

        let mut state = self.shared.state.lock();
        state.next_job += 1;
        let id = JobId(state.next_job);
        let mut next_entry = state.next_entry;
        job.assign_ids(id, || {
            next_entry += 1;
            EntryId(next_entry)
        });
        state.next_entry = next_entry;

        crate::debug_event!("queue", "submitted", "{job}");
        state.queued.push_back(job);
        state.emit(QueueEvent::Submitted(id));
        drop(state);

        self.shared.changed.notify_all();
        Some(id)
    }

    /// True if a job is queued or processing.
    pub fn has_pending_work(&self) -> bool {
        self.shared.state.lock().has_pending_work()
    }

    /// Number of queued plus processing jobs.
    pub fn pending_jobs(&self) -> usize {
        let state = self.shared.state.lock();
        state.queued.len() + usize::from(state.processing.is_some())
    }

    /// Report that one entry's side effect has completed.
    ///
    /// When the last entry of the processing job finishes, the job becomes
    /// `Done` and the worker may start the next one. Returns false if the
    /// entry is unknown or already finished.
    pub fn notify_entry_finished(&self, entry: EntryId) -> bool {
        finish_entry(&self.shared, entry)
    }

    /// Current state of a submitted job.
    pub fn job_state(&self, id: JobId) -> Option<JobState> {
        let state = self.shared.state.lock();
        if let Some(job) = state.processing.as_ref().filter(|j| j.id() == id) {
            return Some(job.state());
        }
        if state.queued.iter().any(|j| j.id() == id) {
            return Some(JobState::Queued);
        }
        (id.0 > 0 && id.0 <= state.next_job).then_some(JobState::Done)
    }

    /// Human-readable snapshot of processing then queued jobs.
    pub fn list_jobs(&self) -> Vec<String> {
        let state = self.shared.state.lock();
        state
            .processing
            .iter()
            .chain(state.queued.iter())
            .map(ToString::to_string)
            .collect()
    }

    /// Subscribe to queue changes. Dropped receivers are pruned.
    pub fn subscribe(&self) -> Receiver<QueueEvent> {
        let (tx, rx) = unbounded();
        self.shared.state.lock().subscribers.push(tx);
        rx
    }

    /// Block until no work is pending or the timeout elapses.
    ///
    /// Returns true if the queue became idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.has_pending_work() {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return !state.has_pending_work();
            }
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Stop the worker after the current job.
    ///
    /// Already dispatched entries run to completion. Returns the number of
    /// queued jobs that were never started.
    pub fn close(&self) -> usize {
        let remaining = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.queued.len()
        };
        self.shared.changed.notify_all();

        if let Some(handle) = self.shared.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("[queue] worker thread panicked");
            }
        }
        if remaining > 0 {
            tracing::warn!("[queue] closed with {remaining} jobs not started");
        }
        remaining
    }
}

fn finish_entry(shared: &Shared, entry: EntryId) -> bool {
    let mut state = shared.state.lock();
    let Some(job) = state.processing.as_mut().filter(|j| j.contains(entry)) else {
        return false;
    };

    let job_id = job.id();
    let done = job.finish_entry(entry);
    state.emit(QueueEvent::EntryFinished { job: job_id, entry });

    if done {
        state.processing = None;
        state.emit(QueueEvent::Completed(job_id));
        crate::debug_event!("queue", "completed", "{job_id}");
    }
    drop(state);

    shared.changed.notify_all();
    true
}

fn run_worker(shared: Arc<Shared>) {
    while let Some((job_id, entries)) = next_job(&shared) {
        crate::debug_event!("queue", "processing", "{job_id} with {} entries", entries.len());

        if let [entry] = entries.as_slice() {
            execute_entry(&shared, entry);
        } else {
            for entry in entries {
                let task_shared = Arc::clone(&shared);
                shared
                    .pool
                    .spawn(move || execute_entry(&task_shared, &entry));
            }
        }

        // Entries report back asynchronously; wait for the last one
        let mut state = shared.state.lock();
        while state.processing.as_ref().is_some_and(|j| j.id() == job_id) {
            shared.changed.wait(&mut state);
        }
    }
    crate::debug_event!("queue", "worker stopped");
}

/// Dequeue the next job, blocking while the queue is empty.
///
/// Returns `None` once the queue is closed.
fn next_job(shared: &Shared) -> Option<(JobId, Vec<JobEntry>)> {
    let mut state = shared.state.lock();
    loop {
        if state.closed {
            return None;
        }
        if state.processing.is_none() {
            if let Some(mut job) = state.queued.pop_front() {
                job.start();
                let id = job.id();
                let entries = job.entries().to_vec();
                state.processing = Some(job);
                state.emit(QueueEvent::Started(id));
                return Some((id, entries));
            }
        }
        shared.changed.wait(&mut state);
    }
}

/// Run one entry and always report it finished, even on error or panic.
fn execute_entry(shared: &Shared, entry: &JobEntry) {
    let outcome = catch_unwind(AssertUnwindSafe(|| shared.executor.execute(entry)));
    match outcome {
        Ok(Ok(())) => crate::debug_event!("queue", "entry done", "{entry}"),
        Ok(Err(e)) => tracing::error!("[queue] {entry} failed: {e}"),
        Err(_) => tracing::error!("[queue] {entry} panicked"),
    }
    finish_entry(shared, entry.id());
}

