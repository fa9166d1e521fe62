//! Storage service: wraps the backend selected at startup behind a single
//! enum so the rest of the broker can hold one `Arc<StorageService>` without
//! caring which concrete backend is live.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::memory::MemoryStorage;
use super::rocksdb::RocksdbStorage;
use super::{Storage, StorageError};
use crate::core::config::StorageBackend;

/// Storage backend service
///
/// Wraps the underlying backend-specific implementation (in-memory or
/// RocksDB). Provides a unified interface for all storage operations.
pub enum StorageService {
    /// In-memory backend; no persistence across restarts.
    Memory(Arc<MemoryStorage>),
    /// RocksDB backend; durable across restarts.
    Rocksdb(Arc<RocksdbStorage>),
}

impl StorageService {
    /// Initialize the storage service for the given backend selection.
    pub fn init(backend: StorageBackend, rocksdb_path: &Path) -> Result<Self, StorageError> {
        match backend {
            StorageBackend::Memory => Ok(Self::memory()),
            StorageBackend::Rocksdb => {
                let service = RocksdbStorage::open(rocksdb_path)?;
                Ok(Self::Rocksdb(Arc::new(service)))
            }
        }
    }

    /// Build a `StorageService` backed by memory directly, bypassing backend
    /// selection. Used by tests and by [`StorageBackend::Memory`].
    pub fn memory() -> Self {
        Self::Memory(Arc::new(MemoryStorage::new()))
    }

    pub fn backend(&self) -> StorageBackend {
        match self {
            Self::Memory(_) => StorageBackend::Memory,
            Self::Rocksdb(_) => StorageBackend::Rocksdb,
        }
    }
}

#[async_trait]
impl Storage for StorageService {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.set(key, value).await,
            Self::Rocksdb(s) => s.set(key, value).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self {
            Self::Memory(s) => s.get(key).await,
            Self::Rocksdb(s) => s.get(key).await,
        }
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.del(key).await,
            Self::Rocksdb(s) => s.del(key).await,
        }
    }

    async fn close(&self) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.close().await,
            Self::Rocksdb(s) => s.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_service_roundtrip() {
        let service = StorageService::memory();
        assert_eq!(service.backend(), StorageBackend::Memory);
        service.set("k", b"v".to_vec()).await.unwrap();
        assert_eq!(service.get("k").await.unwrap(), Some(b"v".to_vec()));
    }
}
