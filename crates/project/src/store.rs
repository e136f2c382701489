//! Persisted record layout and typed record access
//!
//! ```text
//! experiments/<experiment-id>/experiment.json
//! experiments/<experiment-id>/checkpoints/<checkpoint-id>/checkpoint.json
//! ```
//!
//! Everything else under an experiment's namespace (artifact files) is
//! opaque to the store.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use storage::StorageBackend;
use tracing::debug;
use tracker_core::{Checkpoint, CheckpointId, Error, Experiment, ExperimentId, Result};

/// Root of all experiment namespaces
pub const EXPERIMENTS_PREFIX: &str = "experiments/";

const EXPERIMENT_FILE: &str = "experiment.json";
const CHECKPOINT_FILE: &str = "checkpoint.json";
const CHECKPOINTS_DIR: &str = "checkpoints";

/// Key prefix owning everything stored for one experiment
pub fn experiment_namespace(experiment_id: &str) -> String {
    format!("{}{}/", EXPERIMENTS_PREFIX, experiment_id)
}

/// Key of an experiment record
pub fn experiment_key(experiment_id: &str) -> String {
    format!("{}{}", experiment_namespace(experiment_id), EXPERIMENT_FILE)
}

/// Key prefix owning everything stored for one checkpoint
pub fn checkpoint_namespace(experiment_id: &str, checkpoint_id: &str) -> String {
    format!(
        "{}{}/{}/",
        experiment_namespace(experiment_id),
        CHECKPOINTS_DIR,
        checkpoint_id
    )
}

/// Key of a checkpoint record
pub fn checkpoint_key(experiment_id: &str, checkpoint_id: &str) -> String {
    format!(
        "{}{}",
        checkpoint_namespace(experiment_id, checkpoint_id),
        CHECKPOINT_FILE
    )
}

/// A storage key recognised as a metadata record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Experiment {
        experiment_id: ExperimentId,
    },
    Checkpoint {
        experiment_id: ExperimentId,
        checkpoint_id: CheckpointId,
    },
}

impl RecordKey {
    /// Classify a key, returning `None` for anything that is not a record
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(EXPERIMENTS_PREFIX)?;
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        match parts.as_slice() {
            [experiment_id, EXPERIMENT_FILE] => Some(RecordKey::Experiment {
                experiment_id: experiment_id.to_string(),
            }),
            [experiment_id, CHECKPOINTS_DIR, checkpoint_id, CHECKPOINT_FILE] => {
                Some(RecordKey::Checkpoint {
                    experiment_id: experiment_id.to_string(),
                    checkpoint_id: checkpoint_id.to_string(),
                })
            }
            _ => None,
        }
    }

    /// The storage key this record lives at
    pub fn key(&self) -> String {
        match self {
            RecordKey::Experiment { experiment_id } => experiment_key(experiment_id),
            RecordKey::Checkpoint {
                experiment_id,
                checkpoint_id,
            } => checkpoint_key(experiment_id, checkpoint_id),
        }
    }
}

/// Typed access to experiment and checkpoint records on a backend
#[derive(Debug, Clone)]
pub struct RecordStore {
    backend: Arc<dyn StorageBackend>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// The underlying backend
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Every record key currently stored, in key order
    pub async fn list_records(&self) -> Result<Vec<RecordKey>> {
        let keys = self.backend.list_keys(EXPERIMENTS_PREFIX).await?;
        let records: Vec<_> = keys.iter().filter_map(|k| RecordKey::parse(k)).collect();
        debug!(keys = keys.len(), records = records.len(), "Listed records");
        Ok(records)
    }

    /// All keys under an experiment's namespace
    pub async fn list_namespace(&self, experiment_id: &str) -> Result<Vec<String>> {
        self.backend
            .list_keys(&experiment_namespace(experiment_id))
            .await
    }

    /// Read and decode an experiment record
    pub async fn read_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        let key = experiment_key(experiment_id);
        let experiment: Experiment = self.read_json(&key).await?;
        if experiment.id != experiment_id {
            return Err(Error::CorruptRecord {
                key,
                reason: format!("record id {} does not match its key", experiment.id),
            });
        }
        Ok(experiment)
    }

    /// Read and decode a checkpoint record
    pub async fn read_checkpoint(
        &self,
        experiment_id: &str,
        checkpoint_id: &str,
    ) -> Result<Checkpoint> {
        let key = checkpoint_key(experiment_id, checkpoint_id);
        let checkpoint: Checkpoint = self.read_json(&key).await?;
        if checkpoint.id != checkpoint_id || checkpoint.experiment_id != experiment_id {
            return Err(Error::CorruptRecord {
                key,
                reason: format!(
                    "record {} (experiment {}) does not match its key",
                    checkpoint.id, checkpoint.experiment_id
                ),
            });
        }
        Ok(checkpoint)
    }

    /// Persist an experiment record
    pub async fn write_experiment(&self, experiment: &Experiment) -> Result<()> {
        let data = serde_json::to_vec_pretty(experiment)?;
        self.backend
            .put(&experiment_key(&experiment.id), Bytes::from(data))
            .await
    }

    /// Persist a checkpoint record
    pub async fn write_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let data = serde_json::to_vec_pretty(checkpoint)?;
        self.backend
            .put(
                &checkpoint_key(&checkpoint.experiment_id, &checkpoint.id),
                Bytes::from(data),
            )
            .await
    }

    /// Delete an experiment record (not its checkpoints)
    pub async fn delete_experiment_record(&self, experiment_id: &str) -> Result<()> {
        self.backend.delete(&experiment_key(experiment_id)).await
    }

    /// Delete a checkpoint record (not its artifacts)
    pub async fn delete_checkpoint_record(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.backend
            .delete(&checkpoint_key(&checkpoint.experiment_id, &checkpoint.id))
            .await
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let data = self.backend.get(key).await?;
        serde_json::from_slice(&data).map_err(|e| Error::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemoryStorage;

    #[test]
    fn test_key_layout() {
        assert_eq!(experiment_key("e1"), "experiments/e1/experiment.json");
        assert_eq!(
            checkpoint_key("e1", "c1"),
            "experiments/e1/checkpoints/c1/checkpoint.json"
        );
        assert_eq!(checkpoint_namespace("e1", "c1"), "experiments/e1/checkpoints/c1/");
    }

    #[test]
    fn test_parse_record_keys() {
        assert_eq!(
            RecordKey::parse("experiments/e1/experiment.json"),
            Some(RecordKey::Experiment {
                experiment_id: "e1".to_string()
            })
        );
        let checkpoint = RecordKey::parse("experiments/e1/checkpoints/c1/checkpoint.json").unwrap();
        assert_eq!(
            checkpoint,
            RecordKey::Checkpoint {
                experiment_id: "e1".to_string(),
                checkpoint_id: "c1".to_string(),
            }
        );
        assert_eq!(checkpoint.key(), "experiments/e1/checkpoints/c1/checkpoint.json");

        // Artifacts and malformed paths are not records
        assert_eq!(RecordKey::parse("experiments/e1/checkpoints/c1/weights.bin"), None);
        assert_eq!(
            RecordKey::parse("experiments/e1/checkpoints/c1/files/checkpoint.json"),
            None
        );
        assert_eq!(RecordKey::parse("experiments//experiment.json"), None);
        assert_eq!(RecordKey::parse("other/e1/experiment.json"), None);
    }

    #[tokio::test]
    async fn test_write_and_read_records() {
        let store = RecordStore::new(Arc::new(MemoryStorage::new()));
        let mut experiment = Experiment::new("e1");
        experiment.checkpoints.push("c1".to_string());
        let checkpoint = Checkpoint::new("c1", "e1");

        store.write_experiment(&experiment).await.unwrap();
        store.write_checkpoint(&checkpoint).await.unwrap();

        assert_eq!(store.read_experiment("e1").await.unwrap(), experiment);
        assert_eq!(store.read_checkpoint("e1", "c1").await.unwrap(), checkpoint);
        assert_eq!(store.list_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let backend = Arc::new(MemoryStorage::new());
        backend
            .put(&experiment_key("e1"), Bytes::from("not json"))
            .await
            .unwrap();
        let store = RecordStore::new(backend);

        let result = store.read_experiment("e1").await;
        assert!(matches!(result, Err(Error::CorruptRecord { .. })));
    }

    #[tokio::test]
    async fn test_checkpoint_under_wrong_experiment_is_corrupt() {
        let backend = Arc::new(MemoryStorage::new());
        let checkpoint = Checkpoint::new("c1", "e2");
        backend
            .put(
                &checkpoint_key("e1", "c1"),
                Bytes::from(serde_json::to_vec(&checkpoint).unwrap()),
            )
            .await
            .unwrap();
        let store = RecordStore::new(backend);

        let result = store.read_checkpoint("e1", "c1").await;
        assert!(matches!(result, Err(Error::CorruptRecord { .. })));
    }
}
