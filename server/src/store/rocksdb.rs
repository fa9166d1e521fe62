//! On-disk `Storage` backend backed by RocksDB. Every key is stored as a
//! single RocksDB record; values are the already-framed bytes produced by
//! [`super::codec`]. Blocking RocksDB calls are offloaded to
//! `spawn_blocking` so the async runtime is never stalled on disk I/O.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{DB, Options};

use super::{Storage, StorageError};

pub struct RocksdbStorage {
    db: Arc<DB>,
}

impl RocksdbStorage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path)
            .map_err(|e| StorageError::backend("rocksdb", e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl Storage for RocksdbStorage {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || db.put(key.as_bytes(), value))
            .await
            .map_err(|e| StorageError::backend("rocksdb", e.to_string()))?
            .map_err(|e| StorageError::backend("rocksdb", e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || db.get(key.as_bytes()))
            .await
            .map_err(|e| StorageError::backend("rocksdb", e.to_string()))?
            .map_err(|e| StorageError::backend("rocksdb", e.to_string()))
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || db.delete(key.as_bytes()))
            .await
            .map_err(|e| StorageError::backend("rocksdb", e.to_string()))?
            .map_err(|e| StorageError::backend("rocksdb", e.to_string()))
    }

    async fn close(&self) -> Result<(), StorageError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.flush())
            .await
            .map_err(|e| StorageError::backend("rocksdb", e.to_string()))?
            .map_err(|e| StorageError::backend("rocksdb", e.to_string()))
    }
}
