//! Content reconciliation between a source file and its mirror.
//!
//! Makes a target file byte-identical to its source by comparing both in
//! fixed-size blocks and rewriting only the blocks that differ, then copies
//! timestamps and permission bits across.

mod attributes;
mod block;

pub use attributes::{copy_metadata, same_attributes};
pub(crate) use attributes::make_writable;
pub use block::{BlockReconciler, ReconcileStats};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from reconciliation and metadata copying.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot copy metadata from {from} to {to}: {source}")]
    Metadata {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Block size must be greater than zero")]
    ZeroBlockSize,
}
