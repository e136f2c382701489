//! Prefix resolution over a repository snapshot
//!
//! A prefix resolves when it names exactly one experiment or checkpoint.
//! A full id always resolves to its own record, even when it is also the
//! prefix of longer ids.

use serde::Serialize;
use tracker_core::{Checkpoint, Error, Experiment, RecordKind, Result};

use crate::repository::Repository;

/// The single record a prefix resolved to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "lowercase")]
pub enum ResolvedRecord {
    Experiment(Experiment),
    Checkpoint(Checkpoint),
}

impl ResolvedRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            ResolvedRecord::Experiment(_) => RecordKind::Experiment,
            ResolvedRecord::Checkpoint(_) => RecordKind::Checkpoint,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ResolvedRecord::Experiment(e) => &e.id,
            ResolvedRecord::Checkpoint(c) => &c.id,
        }
    }

    pub fn short_id(&self) -> &str {
        tracker_core::short_id(self.id())
    }
}

/// Resolve `prefix` to exactly one record
///
/// # Errors
/// - `InvalidPrefix` for an empty prefix
/// - `PrefixNotFound` when nothing matches
/// - `AmbiguousPrefix` listing every match when several ids share the
///   prefix and none equals it
pub fn resolve(repository: &Repository, prefix: &str) -> Result<ResolvedRecord> {
    if prefix.is_empty() {
        return Err(Error::InvalidPrefix {
            prefix: prefix.to_string(),
        });
    }

    if let Some(experiment) = repository.experiment(prefix) {
        return Ok(ResolvedRecord::Experiment(experiment.clone()));
    }
    if let Some(checkpoint) = repository.checkpoint(prefix) {
        return Ok(ResolvedRecord::Checkpoint(checkpoint.clone()));
    }

    let experiments: Vec<&Experiment> = repository
        .experiments()
        .filter(|e| e.id.starts_with(prefix))
        .collect();
    let checkpoints: Vec<&Checkpoint> = repository
        .checkpoints()
        .filter(|c| c.id.starts_with(prefix))
        .collect();

    match (experiments.as_slice(), checkpoints.as_slice()) {
        ([], []) => Err(Error::PrefixNotFound {
            prefix: prefix.to_string(),
        }),
        ([experiment], []) => Ok(ResolvedRecord::Experiment((*experiment).clone())),
        ([], [checkpoint]) => Ok(ResolvedRecord::Checkpoint((*checkpoint).clone())),
        _ => {
            let mut candidates: Vec<String> = experiments
                .iter()
                .map(|e| e.id.clone())
                .chain(checkpoints.iter().map(|c| c.id.clone()))
                .collect();
            candidates.sort();
            Err(Error::AmbiguousPrefix {
                prefix: prefix.to_string(),
                candidates,
            })
        }
    }
}
