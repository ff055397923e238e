//! Source watching and change translation.
//!
//! # Architecture
//!
//! ```text
//! notify::RecommendedWatcher (one per source)
//!         |
//!   EventTranslator  -- pairs rename halves by tracker
//!         |
//!   SyncOrchestrator -- scope and exception filtering,
//!         |             fan-out decision
//!         v
//!      JobQueue
//! ```

mod devices;
mod error;
mod orchestrator;
mod translate;

pub use devices::{DeviceId, device_of, independent_targets};
pub use error::WatchError;
pub use orchestrator::SyncOrchestrator;
pub use translate::{Change, EventTranslator};
