//! Generic key/value persistence capability used by the queue engine to
//! durably record topic directories, topic/line cursors, and in-flight
//! redelivery state.
//!
//! Mirrors the reference data layer's split between a thin async trait (one
//! method per operation) and an enum-wrapped service that selects the
//! concrete backend at startup.

pub mod codec;
pub mod error;
pub mod memory;
pub mod rocksdb;
pub mod service;

use async_trait::async_trait;

pub use error::StorageError;
pub use service::StorageService;

/// A durable byte-oriented key/value capability. Every queue/topic/line
/// record is a flat key mapped to a codec-framed value; `Storage` itself
/// knows nothing about the queue domain.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `value` under `key`, replacing any existing value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Fetch the value stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove the value stored at `key`. Not an error if the key is absent.
    async fn del(&self, key: &str) -> Result<(), StorageError>;

    /// Flush and release backend resources. Called once, during shutdown.
    async fn close(&self) -> Result<(), StorageError>;
}
