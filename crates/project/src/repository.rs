//! Point-in-time view of every experiment and checkpoint record

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};
use tracker_core::{Checkpoint, CheckpointId, Error, Experiment, ExperimentId, Result};

use crate::store::{RecordKey, RecordStore};

/// Snapshot of all records in a storage location
///
/// Built once per invocation. Ids are unique across experiments and
/// checkpoints combined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Repository {
    experiments: BTreeMap<ExperimentId, Experiment>,
    checkpoints: BTreeMap<CheckpointId, Checkpoint>,
}

impl Repository {
    /// Build a repository from records, checking the shared id namespace
    pub fn from_records(
        experiments: impl IntoIterator<Item = Experiment>,
        checkpoints: impl IntoIterator<Item = Checkpoint>,
    ) -> Result<Self> {
        let mut repository = Repository::default();

        for experiment in experiments {
            if repository.experiments.contains_key(&experiment.id) {
                return Err(Error::DuplicateId { id: experiment.id });
            }
            repository
                .experiments
                .insert(experiment.id.clone(), experiment);
        }

        for checkpoint in checkpoints {
            if repository.contains_id(&checkpoint.id) {
                return Err(Error::DuplicateId { id: checkpoint.id });
            }
            repository
                .checkpoints
                .insert(checkpoint.id.clone(), checkpoint);
        }

        Ok(repository)
    }

    /// Load every record from the store
    ///
    /// A single unreadable or malformed record fails the whole load.
    #[instrument(skip(store), fields(storage = %store.backend().describe()))]
    pub async fn load(store: &RecordStore) -> Result<Self> {
        let mut experiments = Vec::new();
        let mut checkpoints = Vec::new();

        for record in store.list_records().await? {
            let loaded = match &record {
                RecordKey::Experiment { experiment_id } => store
                    .read_experiment(experiment_id)
                    .await
                    .map(|e| experiments.push(e)),
                RecordKey::Checkpoint {
                    experiment_id,
                    checkpoint_id,
                } => store
                    .read_checkpoint(experiment_id, checkpoint_id)
                    .await
                    .map(|c| checkpoints.push(c)),
            };

            match loaded {
                Ok(()) => {}
                // Removed by another process between listing and reading
                Err(Error::StoragePathNotFound { path }) => {
                    debug!(%path, "Record vanished during load");
                }
                Err(e) => return Err(e),
            }
        }

        let repository = Self::from_records(experiments, checkpoints)?;
        info!(
            experiments = repository.experiments.len(),
            checkpoints = repository.checkpoints.len(),
            "Loaded repository"
        );
        Ok(repository)
    }

    /// All experiments, ordered by id
    pub fn experiments(&self) -> impl Iterator<Item = &Experiment> {
        self.experiments.values()
    }

    /// All checkpoints, ordered by id
    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.values()
    }

    pub fn experiment(&self, id: &str) -> Option<&Experiment> {
        self.experiments.get(id)
    }

    pub fn checkpoint(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.get(id)
    }

    /// Whether any record uses this id
    pub fn contains_id(&self, id: &str) -> bool {
        self.experiments.contains_key(id) || self.checkpoints.contains_key(id)
    }

    /// Experiment ids, ordered
    pub fn experiment_ids(&self) -> impl Iterator<Item = &ExperimentId> {
        self.experiments.keys()
    }

    /// Checkpoint ids, ordered
    pub fn checkpoint_ids(&self) -> impl Iterator<Item = &CheckpointId> {
        self.checkpoints.keys()
    }

    /// Checkpoints naming `experiment_id` as their owner, indexed ones first
    pub fn checkpoints_of(&self, experiment: &Experiment) -> Vec<CheckpointId> {
        let mut ids: Vec<CheckpointId> = experiment.checkpoints.clone();
        for checkpoint in self.checkpoints.values() {
            if checkpoint.experiment_id == experiment.id && !ids.contains(&checkpoint.id) {
                ids.push(checkpoint.id.clone());
            }
        }
        ids
    }

    /// Indexed checkpoint ids with no checkpoint record behind them
    ///
    /// This is the state an interrupted checkpoint removal leaves behind.
    pub fn dangling_checkpoint_ids(&self) -> Vec<(ExperimentId, CheckpointId)> {
        self.experiments
            .values()
            .flat_map(|e| {
                e.checkpoints
                    .iter()
                    .filter(|c| !self.checkpoints.contains_key(*c))
                    .map(|c| (e.id.clone(), c.clone()))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty() && self.checkpoints.is_empty()
    }

    // Mutations below are used by the deletion engine to keep the snapshot
    // in step with storage.

    pub(crate) fn remove_checkpoint(&mut self, id: &str) -> Option<Checkpoint> {
        self.checkpoints.remove(id)
    }

    pub(crate) fn remove_experiment(&mut self, id: &str) -> Option<Experiment> {
        self.experiments.remove(id)
    }

    pub(crate) fn replace_experiment(&mut self, experiment: Experiment) {
        self.experiments.insert(experiment.id.clone(), experiment);
    }
}
