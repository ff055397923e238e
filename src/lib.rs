//! Continuous directory synchronization.
//!
//! Keeps one or more target directories byte-identical to a source tree,
//! first with a full walk and then from file system change events.
//!
//! ```text
//! SyncEngine
//!   +-- validation     (gates every configuration change)
//!   +-- SyncOrchestrator per source (watch + walk -> jobs)
//!   +-- JobQueue       (FIFO, one job processing at a time)
//!         +-- FsExecutor -> BlockReconciler
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod paths;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod validation;
pub mod watcher;

pub use config::Settings;
pub use engine::SyncEngine;
pub use error::{ConfigError, EngineError, EngineResult, PathRole, StoreError};
pub use jobs::{Job, JobEntry, JobError, JobId, JobQueue, JobState, Operation, QueueEvent};
pub use paths::{DirectoryEntry, canonical_key, is_same_path, is_sub_directory_of_path};
pub use reconcile::{BlockReconciler, ReconcileError, same_attributes};
pub use source::SourceConfig;
pub use validation::validate;
pub use watcher::{Change, SyncOrchestrator, WatchError};
