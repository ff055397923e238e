//! Job scheduling and execution.
//!
//! ```text
//! SyncOrchestrator --submit--> JobQueue --dequeue--> worker
//!                                  ^                   |
//!                                  |            FsExecutor (per entry,
//!                                  |            fanned out on rayon)
//!                                  +--notify_entry_finished--+
//! ```

mod executor;
mod queue;
mod types;

pub use executor::FsExecutor;
pub use queue::{EntryExecutor, JobQueue, QueueEvent};
pub use types::{EntryId, Job, JobEntry, JobError, JobId, JobState, Operation};
