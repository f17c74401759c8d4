use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Failures surfaced by the item and stats caches.
///
/// `Clone` so that a single failed coalesced load can be handed to every
/// caller attached to it.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A required field is missing or blank. Caller's fault, never retried.
    #[error("invalid item: {0}")]
    Validation(String),

    #[error("item not found: {0}")]
    NotFound(String),

    /// The backing file is not a JSON array of records.
    #[error("malformed data in {}: {reason}", path.display())]
    MalformedData { path: PathBuf, reason: String },

    /// Metadata, read, or write I/O against the backing file failed.
    #[error("storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl StoreError {
    pub fn storage(path: &Path, source: io::Error) -> Self {
        Self::StorageUnavailable {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        Self::MalformedData {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Validation and not-found are the caller's problem; everything else is ours.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
