//! In-memory storage backend using `DashMap`.
//!
//! Data is lost when the value is dropped. Faults can be injected per
//! operation and key prefix to simulate an unreliable remote store.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, instrument};
use tracker_core::{Error, Result};

use crate::StorageBackend;

/// Operation kinds that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    Get,
    Put,
    Delete,
    List,
}

/// In-memory key/blob store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: DashMap<String, Bytes>,
    /// Active faults as (operation, key prefix)
    faults: Mutex<Vec<(FaultOp, String)>>,
    /// Successful mutations in the order they were applied
    journal: Mutex<Vec<(FaultOp, String)>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Make every `op` on keys starting with `prefix` fail until cleared
    pub fn inject_fault(&self, op: FaultOp, prefix: impl Into<String>) {
        self.faults.lock().push((op, prefix.into()));
    }

    /// Shorthand for a failing delete
    pub fn fail_delete(&self, prefix: impl Into<String>) {
        self.inject_fault(FaultOp::Delete, prefix);
    }

    /// Shorthand for a failing put
    pub fn fail_put(&self, prefix: impl Into<String>) {
        self.inject_fault(FaultOp::Put, prefix);
    }

    /// Shorthand for a failing get
    pub fn fail_get(&self, prefix: impl Into<String>) {
        self.inject_fault(FaultOp::Get, prefix);
    }

    /// Shorthand for a failing list
    pub fn fail_list(&self, prefix: impl Into<String>) {
        self.inject_fault(FaultOp::List, prefix);
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Successful puts and deletes, oldest first
    pub fn journal(&self) -> Vec<(FaultOp, String)> {
        self.journal.lock().clone()
    }

    fn check_fault(&self, op: FaultOp, key: &str) -> Result<()> {
        let faults = self.faults.lock();
        if faults
            .iter()
            .any(|(fault_op, prefix)| *fault_op == op && key.starts_with(prefix.as_str()))
        {
            return Err(Error::Storage {
                message: format!("Injected {:?} failure for {}", op, key),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    #[instrument(skip(self), fields(backend = "memory"))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.check_fault(FaultOp::Get, key)?;
        self.objects
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| Error::StoragePathNotFound {
                path: key.to_string(),
            })
    }

    #[instrument(skip(self, data), fields(backend = "memory", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.check_fault(FaultOp::Put, key)?;
        self.objects.insert(key.to_string(), data);
        self.journal.lock().push((FaultOp::Put, key.to_string()));
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.check_fault(FaultOp::Delete, key)?;
        if self.objects.remove(key).is_none() {
            debug!(key, "Key already absent");
        }
        self.journal.lock().push((FaultOp::Delete, key.to_string()));
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.check_fault(FaultOp::List, prefix)?;
        let mut keys: Vec<_> = self
            .objects
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_fault(FaultOp::Get, key)?;
        Ok(self.objects.contains_key(key))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
