//! Unified error type for the storage layer

use thiserror::Error;

/// Error produced by a [`Storage`](super::Storage) backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key was not present.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Backend-specific failure (RocksDB status, etc).
    #[error("{backend} backend error: {reason}")]
    Backend { backend: &'static str, reason: String },

    /// A stored value failed to decode with the expected record layout.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// IO error opening or reading the backing store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn backend(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation might succeed without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
