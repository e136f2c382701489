//! End-to-end removal test
//!
//! Simulates what a training run leaves in storage and removes it the way
//! the command line does:
//! - Project discovery through keepsake.yaml
//! - Backend construction from the configured storage URL
//! - Prefix removal of several experiments and checkpoints in one invocation

use anyhow::Result;
use bytes::Bytes;
use project::store::checkpoint_namespace;
use project::{Project, RecordStore, Repository};
use std::path::Path;
use storage::open_backend;
use tracker_core::{Checkpoint, Experiment, ProjectConfig, RecordKind};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A finished training run: one experiment with `steps` checkpoints
struct SimulatedRun {
    experiment_id: String,
    checkpoint_ids: Vec<String>,
}

impl SimulatedRun {
    async fn record(store: &RecordStore, steps: u64) -> Result<Self> {
        let mut experiment = Experiment::new(new_id());
        experiment
            .context
            .insert("command".to_string(), "python train.py".to_string());

        let mut checkpoint_ids = Vec::new();
        for step in 0..steps {
            let mut checkpoint = Checkpoint::new(new_id(), experiment.id.clone());
            checkpoint.step = Some(step);
            checkpoint
                .metrics
                .insert("loss".to_string(), serde_json::json!(1.0 / (step + 1) as f64));

            for file in ["weights", "optimizer"] {
                let key = format!(
                    "{}{}",
                    checkpoint_namespace(&experiment.id, &checkpoint.id),
                    file
                );
                store
                    .backend()
                    .put(&key, Bytes::from(vec![step as u8; 128]))
                    .await?;
                checkpoint.artifacts.insert(key);
            }

            store.write_checkpoint(&checkpoint).await?;
            experiment.checkpoints.push(checkpoint.id.clone());
            checkpoint_ids.push(checkpoint.id);
        }

        store.write_experiment(&experiment).await?;
        Ok(Self {
            experiment_id: experiment.id,
            checkpoint_ids,
        })
    }
}

/// Shortest prefix of `id` that resolves uniquely in `repository`
fn unique_prefix(repository: &Repository, id: &str) -> String {
    (1..=id.len())
        .map(|len| &id[..len])
        .find(|prefix| {
            project::resolve(repository, prefix)
                .map(|r| r.id() == id)
                .unwrap_or(false)
        })
        .unwrap_or(id)
        .to_string()
}

async fn open_configured_project(project_dir: &Path) -> Result<(Project, RecordStore)> {
    let (config, dir) = ProjectConfig::find_in_dir(project_dir)?;
    let backend = open_backend(&config.storage, &dir, &config.storage_options).await?;
    let store = RecordStore::new(backend.clone());
    Ok((Project::with_config(backend, &config.storage_options), store))
}

#[tokio::test]
async fn test_remove_runs_by_prefix() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let project_dir = tempfile::tempdir()?;
    std::fs::write(
        project_dir.path().join("keepsake.yaml"),
        "storage: .keepsake/storage/\nstorage_options:\n  delete_concurrency: 4\n",
    )?;
    let nested = project_dir.path().join("src");
    std::fs::create_dir_all(&nested)?;

    let (mut project, store) = open_configured_project(&nested).await?;
    let runs = vec![
        SimulatedRun::record(&store, 3).await?,
        SimulatedRun::record(&store, 2).await?,
        SimulatedRun::record(&store, 4).await?,
    ];
    assert!(project_dir.path().join(".keepsake/storage/experiments").is_dir());

    let repository = Repository::load(&store).await?;
    assert_eq!(repository.experiments().count(), 3);
    assert_eq!(repository.checkpoints().count(), 9);

    // Remove the first run entirely and one checkpoint of the second
    let experiment_prefix = unique_prefix(&repository, &runs[0].experiment_id);
    let checkpoint_prefix = unique_prefix(&repository, &runs[1].checkpoint_ids[0]);

    let removed = project.remove(&experiment_prefix).await?;
    assert_eq!(removed.kind, RecordKind::Experiment);
    assert_eq!(removed.id, runs[0].experiment_id);
    assert_eq!(removed.checkpoints, 3);

    let removed = project.remove(&checkpoint_prefix).await?;
    assert_eq!(removed.kind, RecordKind::Checkpoint);
    assert_eq!(removed.id, runs[1].checkpoint_ids[0]);

    let after = Repository::load(&store).await?;
    assert!(after.experiment(&runs[0].experiment_id).is_none());
    for id in &runs[0].checkpoint_ids {
        assert!(after.checkpoint(id).is_none());
    }
    assert_eq!(
        after.experiment(&runs[1].experiment_id).unwrap().checkpoints,
        vec![runs[1].checkpoint_ids[1].clone()]
    );
    assert_eq!(after.experiment(&runs[2].experiment_id).unwrap().checkpoints.len(), 4);
    assert!(after.dangling_checkpoint_ids().is_empty());

    // The cached repository in the project agrees with storage
    assert_eq!(*project.repository().await?, after);
    Ok(())
}
