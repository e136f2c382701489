//! Core record definitions for experiment and checkpoint tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Unique identifier types
///
/// Experiments and checkpoints draw from one namespace.
pub type ExperimentId = String;
pub type CheckpointId = String;

/// Length of the abbreviated id shown to users
pub const SHORT_ID_LEN: usize = 7;

/// Abbreviate an id for display
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Experiment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Unique experiment identifier
    pub id: ExperimentId,

    /// Timestamp when the experiment was created
    pub created: DateTime<Utc>,

    /// Checkpoint ids in creation order
    #[serde(default)]
    pub checkpoints: Vec<CheckpointId>,

    /// Hyperparameters recorded with the experiment
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,

    /// Run context (host, user, command, ...)
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl Experiment {
    /// Create an experiment with no checkpoints
    pub fn new(id: impl Into<ExperimentId>) -> Self {
        Self {
            id: id.into(),
            created: Utc::now(),
            checkpoints: Vec::new(),
            params: BTreeMap::new(),
            context: BTreeMap::new(),
        }
    }

    /// Abbreviated id for display
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Whether the index lists the given checkpoint
    pub fn has_checkpoint(&self, checkpoint_id: &str) -> bool {
        self.checkpoints.iter().any(|c| c == checkpoint_id)
    }

    /// Drop a checkpoint from the index, returns true if it was listed
    pub fn remove_checkpoint(&mut self, checkpoint_id: &str) -> bool {
        let before = self.checkpoints.len();
        self.checkpoints.retain(|c| c != checkpoint_id);
        self.checkpoints.len() != before
    }
}

/// Checkpoint record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint identifier
    pub id: CheckpointId,

    /// Owning experiment
    pub experiment_id: ExperimentId,

    /// Timestamp when the checkpoint was created
    pub created: DateTime<Utc>,

    /// Training step at checkpoint
    #[serde(default)]
    pub step: Option<u64>,

    /// Metric values keyed by name
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,

    /// Storage keys of the files saved with this checkpoint
    #[serde(default)]
    pub artifacts: BTreeSet<String>,
}

impl Checkpoint {
    /// Create a checkpoint with no metrics or artifacts
    pub fn new(id: impl Into<CheckpointId>, experiment_id: impl Into<ExperimentId>) -> Self {
        Self {
            id: id.into(),
            experiment_id: experiment_id.into(),
            created: Utc::now(),
            step: None,
            metrics: BTreeMap::new(),
            artifacts: BTreeSet::new(),
        }
    }

    /// Abbreviated id for display
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Which kind of record an id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Experiment,
    Checkpoint,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Experiment => f.write_str("experiment"),
            RecordKind::Checkpoint => f.write_str("checkpoint"),
        }
    }
}
