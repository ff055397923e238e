//! Error types for source watching.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = WatchError::EventError {
            details: "queue overflow".to_string(),
        };
        assert_eq!(err.to_string(), "File system event error: queue overflow");

        let err: WatchError = notify::Error::generic("no backend").into();
        assert!(matches!(err, WatchError::InitFailed { .. }));
        assert!(err.to_string().contains("no backend"));
    }
}
