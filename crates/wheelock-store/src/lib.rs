//! Verified artifact cache for wheelock.
//!
//! This crate provides the storage layer: `StoreLayout` for the on-disk
//! directory structure and format marker, and `ArtifactStore`, a cache of
//! artifacts that already passed hash verification, written atomically
//! through a staging directory.

pub mod artifacts;
pub mod layout;

pub use artifacts::ArtifactStore;
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename survives power loss until the parent
/// directory is synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),
    #[error("invalid artifact key: {0}")]
    InvalidKey(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
