//! Project facade: resolve and remove records by id prefix

use std::sync::Arc;

use storage::StorageBackend;
use tracing::debug;
use tracker_core::{CheckpointId, Error, ExperimentId, RecordKind, Result, StorageConfig};

use crate::deletion::DeletionEngine;
use crate::repository::Repository;
use crate::resolver::{resolve, ResolvedRecord};
use crate::store::RecordStore;

/// What a successful `remove` deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub kind: RecordKind,
    pub id: String,
    /// Checkpoints removed along with an experiment
    pub checkpoints: usize,
}

/// Records in one storage location
///
/// The repository is loaded on first use and reused for the rest of the
/// invocation. A failed removal drops it so the next call reloads from
/// storage.
#[derive(Debug)]
pub struct Project {
    store: RecordStore,
    engine: DeletionEngine,
    repository: Option<Repository>,
}

impl Project {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let store = RecordStore::new(backend);
        Self {
            engine: DeletionEngine::new(store.clone()),
            store,
            repository: None,
        }
    }

    /// Create a project using backend settings from configuration
    pub fn with_config(backend: Arc<dyn StorageBackend>, config: &StorageConfig) -> Self {
        let mut project = Self::new(backend);
        project.engine = project.engine.with_concurrency(config.delete_concurrency);
        project
    }

    /// The storage location, for messages
    pub fn storage_description(&self) -> String {
        self.store.backend().describe()
    }

    /// The loaded repository, loading it if needed
    pub async fn repository(&mut self) -> Result<&mut Repository> {
        let repository = match self.repository.take() {
            Some(repository) => repository,
            None => {
                debug!(storage = %self.storage_description(), "Loading repository");
                Repository::load(&self.store).await?
            }
        };
        Ok(self.repository.insert(repository))
    }

    /// Forget the cached repository
    pub fn invalidate(&mut self) {
        self.repository = None;
    }

    /// Resolve an id or id prefix to one experiment or checkpoint
    pub async fn resolve(&mut self, prefix: &str) -> Result<ResolvedRecord> {
        let repository = self.repository().await?;
        resolve(repository, prefix)
    }

    /// Resolve a prefix and remove the record it names
    ///
    /// Experiments are removed together with their checkpoints. A prefix
    /// that only matches an index entry left behind by an interrupted
    /// checkpoint removal finishes that removal.
    pub async fn remove(&mut self, prefix: &str) -> Result<Removed> {
        let resolved = match self.resolve(prefix).await {
            Ok(resolved) => resolved,
            Err(not_found @ Error::PrefixNotFound { .. }) => {
                return self.remove_dangling(prefix, not_found).await;
            }
            Err(e) => return Err(e),
        };
        let engine = self.engine.clone();
        let repository = self.repository().await?;

        let outcome = match &resolved {
            ResolvedRecord::Checkpoint(checkpoint) => engine
                .delete_checkpoint(repository, checkpoint)
                .await
                .map(|()| 0),
            ResolvedRecord::Experiment(experiment) => {
                let checkpoints = repository.checkpoints_of(experiment).len();
                engine
                    .delete_experiment(repository, experiment)
                    .await
                    .map(|()| checkpoints)
            }
        };

        match outcome {
            Ok(checkpoints) => Ok(Removed {
                kind: resolved.kind(),
                id: resolved.id().to_string(),
                checkpoints,
            }),
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }

    /// Drop an indexed checkpoint id whose body is already gone
    async fn remove_dangling(&mut self, prefix: &str, not_found: Error) -> Result<Removed> {
        let engine = self.engine.clone();
        let repository = self.repository().await?;

        let mut matches: Vec<(ExperimentId, CheckpointId)> = repository
            .dangling_checkpoint_ids()
            .into_iter()
            .filter(|(_, checkpoint_id)| checkpoint_id.starts_with(prefix))
            .collect();
        if let Some(exact) = matches.iter().position(|(_, id)| id == prefix) {
            matches = vec![matches.swap_remove(exact)];
        }

        let (experiment_id, checkpoint_id) = match matches.len() {
            0 => return Err(not_found),
            1 => matches.remove(0),
            _ => {
                let mut candidates: Vec<String> =
                    matches.into_iter().map(|(_, id)| id).collect();
                candidates.sort();
                return Err(Error::AmbiguousPrefix {
                    prefix: prefix.to_string(),
                    candidates,
                });
            }
        };

        debug!(experiment = %experiment_id, checkpoint = %checkpoint_id, "Prefix matches dangling index entry");
        let outcome = engine
            .delete_dangling_checkpoint(repository, &experiment_id, &checkpoint_id)
            .await;
        if let Err(e) = outcome {
            self.invalidate();
            return Err(e);
        }

        Ok(Removed {
            kind: RecordKind::Checkpoint,
            id: checkpoint_id,
            checkpoints: 0,
        })
    }
}
