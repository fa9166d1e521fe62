//! In-memory `Storage` backend. No persistence across restarts; used for
//! local development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Storage, StorageError};

#[derive(Default)]
pub struct MemoryStorage {
    map: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.map.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.map.read().get(key).cloned())
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        self.map.write().remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryStorage::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", b"1".to_vec()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));

        store.set("a", b"2".to_vec()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"2".to_vec()));

        store.del("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_del_missing_key_is_ok() {
        let store = MemoryStorage::new();
        assert!(store.del("missing").await.is_ok());
    }
}
