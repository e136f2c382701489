//! Storage backend trait definition
//!
//! Defines the async interface that all storage backends must implement.

use async_trait::async_trait;
use bytes::Bytes;
use tracker_core::Result;

/// Async trait for storage backends
///
/// Keys are `/`-separated strings relative to the backend root. Each
/// operation on a single key is assumed atomic; there are no cross-key
/// transactions.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Read the blob stored at `key`
    ///
    /// # Errors
    /// Returns `StoragePathNotFound` if the key doesn't exist, or a storage
    /// error if the read fails
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Store `data` at `key`, replacing any previous value
    ///
    /// Uses atomic writes where possible so readers never observe a partial blob.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Delete the blob at `key`
    ///
    /// Succeeds when the key does not exist, so deletions can be retried.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all keys starting with `prefix`, sorted
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Human-readable location, used in logs and CLI messages
    fn describe(&self) -> String;
}
