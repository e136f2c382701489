//! Cascading deletion of checkpoints and experiments
//!
//! Removal order is what keeps storage recoverable after a crash:
//!
//! 1. a checkpoint's artifacts, then its record, then its entry in the
//!    owning experiment's index;
//! 2. for an experiment, every checkpoint body, then leftover keys in its
//!    namespace, then the experiment record itself.
//!
//! An interrupted removal therefore leaves at worst an experiment that still
//! lists checkpoints whose bodies are gone. Running the same removal again
//! treats those as already deleted and finishes the job.

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use tracker_core::{Checkpoint, CheckpointId, Error, Experiment, Result};

use crate::repository::Repository;
use crate::store::{experiment_key, RecordStore};

/// Default number of key deletions in flight
pub const DEFAULT_DELETE_CONCURRENCY: usize = 16;

/// Executes removals against a record store
///
/// The engine is the only writer of an experiment's checkpoint index. It
/// mutates the caller's [`Repository`] in step with storage so the snapshot
/// keeps describing what is stored.
#[derive(Debug, Clone)]
pub struct DeletionEngine {
    store: RecordStore,
    concurrency: usize,
}

impl DeletionEngine {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            concurrency: DEFAULT_DELETE_CONCURRENCY,
        }
    }

    /// Limit concurrent key deletions (minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Remove a checkpoint and drop it from its experiment's index
    ///
    /// Safe to call again for a checkpoint whose body is already gone: the
    /// deletes succeed as no-ops and the index is still updated.
    #[instrument(skip_all, fields(checkpoint = %checkpoint.id, experiment = %checkpoint.experiment_id))]
    pub async fn delete_checkpoint(
        &self,
        repository: &mut Repository,
        checkpoint: &Checkpoint,
    ) -> Result<()> {
        self.remove_checkpoint_body(checkpoint).await?;
        repository.remove_checkpoint(&checkpoint.id);
        self.unindex_checkpoint(repository, &checkpoint.experiment_id, &checkpoint.id)
            .await?;

        info!("Removed checkpoint");
        Ok(())
    }

    /// Finish removing a checkpoint whose body is already gone
    ///
    /// Only the experiment's index still names it, so only the index is
    /// rewritten.
    #[instrument(skip(self, repository))]
    pub async fn delete_dangling_checkpoint(
        &self,
        repository: &mut Repository,
        experiment_id: &str,
        checkpoint_id: &str,
    ) -> Result<()> {
        self.unindex_checkpoint(repository, experiment_id, checkpoint_id)
            .await?;

        info!("Removed dangling checkpoint from index");
        Ok(())
    }

    /// Remove an experiment together with every checkpoint it owns
    ///
    /// # Errors
    /// Returns `PartialDeletion` when a checkpoint cannot be removed. The
    /// experiment record is kept and its index lists exactly the checkpoints
    /// still present, so the call can simply be repeated.
    #[instrument(skip_all, fields(experiment = %experiment.id))]
    pub async fn delete_experiment(
        &self,
        repository: &mut Repository,
        experiment: &Experiment,
    ) -> Result<()> {
        // Prefer the snapshot's copy, which reflects earlier removals
        let current = repository
            .experiment(&experiment.id)
            .cloned()
            .unwrap_or_else(|| experiment.clone());
        let snapshot = repository.checkpoints_of(&current);
        let mut succeeded: Vec<CheckpointId> = Vec::new();

        for checkpoint_id in &snapshot {
            let Some(checkpoint) = repository.checkpoint(checkpoint_id).cloned() else {
                debug!(checkpoint = %checkpoint_id, "Checkpoint already removed");
                continue;
            };

            if let Err(source) = self.remove_checkpoint_body(&checkpoint).await {
                self.trim_index(repository, &current).await;
                return Err(Error::PartialDeletion {
                    experiment_id: current.id.clone(),
                    failed_checkpoint_id: checkpoint_id.clone(),
                    succeeded,
                    source: Box::new(source),
                });
            }

            repository.remove_checkpoint(checkpoint_id);
            succeeded.push(checkpoint_id.clone());
        }

        self.sweep_namespace(&current).await?;
        self.store.delete_experiment_record(&current.id).await?;
        repository.remove_experiment(&current.id);

        info!(checkpoints = succeeded.len(), "Removed experiment");
        Ok(())
    }

    /// Delete a checkpoint's artifacts, then its record
    async fn remove_checkpoint_body(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.delete_keys(checkpoint.artifacts.iter().cloned().collect())
            .await?;
        self.store.delete_checkpoint_record(checkpoint).await?;
        debug!(checkpoint = %checkpoint.id, artifacts = checkpoint.artifacts.len(), "Deleted checkpoint body");
        Ok(())
    }

    /// Drop a checkpoint from its owning experiment's index and persist it
    async fn unindex_checkpoint(
        &self,
        repository: &mut Repository,
        experiment_id: &str,
        checkpoint_id: &str,
    ) -> Result<()> {
        let Some(experiment) = repository.experiment(experiment_id) else {
            warn!(
                checkpoint = %checkpoint_id,
                experiment = %experiment_id,
                "Owning experiment not found, skipping index update"
            );
            return Ok(());
        };

        if !experiment.has_checkpoint(checkpoint_id) {
            debug!(checkpoint = %checkpoint_id, "Checkpoint not indexed");
            return Ok(());
        }

        let mut updated = experiment.clone();
        updated.remove_checkpoint(checkpoint_id);
        self.store.write_experiment(&updated).await?;
        repository.replace_experiment(updated);
        Ok(())
    }

    /// Rewrite an experiment's index to list only checkpoints that still exist
    ///
    /// Used when a cascade aborts. Failure here is not reported: the stale
    /// entries it would have removed are tolerated by the next attempt.
    async fn trim_index(&self, repository: &mut Repository, experiment: &Experiment) {
        let mut updated = experiment.clone();
        updated
            .checkpoints
            .retain(|id| repository.checkpoint(id).is_some());
        if updated.checkpoints == experiment.checkpoints {
            return;
        }

        match self.store.write_experiment(&updated).await {
            Ok(()) => repository.replace_experiment(updated),
            Err(e) => warn!(
                experiment = %experiment.id,
                error = %e,
                "Failed to trim experiment index after partial removal"
            ),
        }
    }

    /// Delete any keys left in an experiment's namespace except its record
    async fn sweep_namespace(&self, experiment: &Experiment) -> Result<()> {
        let record_key = experiment_key(&experiment.id);
        let leftovers: Vec<String> = self
            .store
            .list_namespace(&experiment.id)
            .await?
            .into_iter()
            .filter(|k| *k != record_key)
            .collect();

        if !leftovers.is_empty() {
            debug!(count = leftovers.len(), "Sweeping experiment namespace");
        }
        self.delete_keys(leftovers).await
    }

    /// Delete keys concurrently, returning the first failure
    ///
    /// Deletions already in flight when a failure is seen are allowed to
    /// finish; no new ones are started.
    async fn delete_keys(&self, keys: Vec<String>) -> Result<()> {
        let backend = self.store.backend().clone();
        let mut pending = keys.into_iter();
        let mut tasks = JoinSet::new();
        let mut first_error: Option<Error> = None;

        loop {
            while first_error.is_none() && tasks.len() < self.concurrency {
                let Some(key) = pending.next() else { break };
                let backend = backend.clone();
                tasks.spawn(async move { backend.delete(&key).await });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let outcome = joined.unwrap_or_else(|e| {
                Err(Error::Internal {
                    message: format!("Delete task failed: {}", e),
                })
            });
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
