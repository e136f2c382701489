use anyhow::Result;
use bytes::Bytes;
use project::store::{checkpoint_key, checkpoint_namespace, experiment_key};
use project::{Project, RecordStore, Repository};
use std::sync::Arc;
use storage::{LocalStorage, StorageBackend};
use tempfile::TempDir;
use tracker_core::{Checkpoint, Error, Experiment, RecordKind};

// Helper to write an experiment and its checkpoints (with one artifact each) to local storage
async fn write_experiment(
    store: &RecordStore,
    experiment_id: &str,
    checkpoint_ids: &[&str],
) -> Result<()> {
    let mut experiment = Experiment::new(experiment_id);
    experiment
        .params
        .insert("learning_rate".to_string(), serde_json::json!(0.01));

    for id in checkpoint_ids {
        let mut checkpoint = Checkpoint::new(*id, experiment_id);
        let artifact = format!("{}model.pt", checkpoint_namespace(experiment_id, id));
        store
            .backend()
            .put(&artifact, Bytes::from(format!("weights for {}", id)))
            .await?;
        checkpoint.artifacts.insert(artifact);
        store.write_checkpoint(&checkpoint).await?;
        experiment.checkpoints.push(id.to_string());
    }

    store.write_experiment(&experiment).await?;
    Ok(())
}

fn local_store() -> Result<(TempDir, Arc<LocalStorage>, RecordStore)> {
    let dir = tempfile::tempdir()?;
    let backend = Arc::new(LocalStorage::new(dir.path().join("storage")));
    let store = RecordStore::new(backend.clone());
    Ok((dir, backend, store))
}

#[tokio::test]
async fn test_resolution_over_local_storage() -> Result<()> {
    let (_dir, backend, store) = local_store()?;
    write_experiment(&store, "abc123", &["abc999"]).await?;

    let mut project = Project::new(backend);

    match project.resolve("abc").await {
        Err(Error::AmbiguousPrefix { candidates, .. }) => {
            assert_eq!(candidates, vec!["abc123".to_string(), "abc999".to_string()]);
        }
        other => panic!("expected ambiguous prefix, got {:?}", other),
    }
    assert_eq!(project.resolve("abc123").await?.kind(), RecordKind::Experiment);
    assert_eq!(project.resolve("abc9").await?.kind(), RecordKind::Checkpoint);
    assert!(matches!(
        project.resolve("zzz").await,
        Err(Error::PrefixNotFound { .. })
    ));

    // Same prefix, same answer
    let first = project.resolve("abc1").await?;
    let second = project.resolve("abc1").await?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_cascade_removes_all_keys() -> Result<()> {
    let (dir, backend, store) = local_store()?;
    write_experiment(&store, "e1", &["c1", "c2", "c3"]).await?;
    write_experiment(&store, "e2", &["c4"]).await?;

    let mut project = Project::new(backend.clone());
    let removed = project.remove("e1").await?;
    assert_eq!(removed.kind, RecordKind::Experiment);
    assert_eq!(removed.checkpoints, 3);

    for id in ["c1", "c2", "c3"] {
        assert!(backend.list_keys(&checkpoint_namespace("e1", id)).await?.is_empty());
    }
    assert!(!backend.exists(&experiment_key("e1")).await?);
    assert!(!dir.path().join("storage/experiments/e1").exists());

    let remaining = Repository::load(&store).await?;
    assert_eq!(remaining.experiment_ids().collect::<Vec<_>>(), vec!["e2"]);
    assert_eq!(remaining.checkpoint_ids().collect::<Vec<_>>(), vec!["c4"]);
    Ok(())
}

#[tokio::test]
async fn test_remove_checkpoint_updates_index() -> Result<()> {
    let (_dir, backend, store) = local_store()?;
    write_experiment(&store, "e1", &["c1", "c2"]).await?;

    let mut project = Project::new(backend.clone());
    project.remove("c1").await?;

    assert!(!backend.exists(&checkpoint_key("e1", "c1")).await?);
    assert_eq!(store.read_experiment("e1").await?.checkpoints, vec!["c2".to_string()]);

    // A new invocation reports the removed id as not found
    let mut fresh = Project::new(backend);
    assert!(matches!(fresh.remove("c1").await, Err(Error::PrefixNotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_interrupted_checkpoint_removal_is_finished_by_experiment_removal() -> Result<()> {
    let (_dir, backend, store) = local_store()?;
    write_experiment(&store, "e1", &["c1", "c2"]).await?;

    // Simulate a crash after the checkpoint body was deleted but before the
    // experiment index was rewritten
    let checkpoint = store.read_checkpoint("e1", "c1").await?;
    for artifact in &checkpoint.artifacts {
        backend.delete(artifact).await?;
    }
    store.delete_checkpoint_record(&checkpoint).await?;

    let repository = Repository::load(&store).await?;
    assert_eq!(
        repository.dangling_checkpoint_ids(),
        vec![("e1".to_string(), "c1".to_string())]
    );

    let mut project = Project::new(backend.clone());
    assert!(matches!(
        project.resolve("c1").await,
        Err(Error::PrefixNotFound { .. })
    ));
    project.remove("e1").await?;
    assert!(backend.list_keys("").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_interrupted_checkpoint_removal_is_finished_by_retry() -> Result<()> {
    let (_dir, backend, store) = local_store()?;
    write_experiment(&store, "e1", &["c1", "c2"]).await?;

    let checkpoint = store.read_checkpoint("e1", "c1").await?;
    for artifact in &checkpoint.artifacts {
        backend.delete(artifact).await?;
    }
    store.delete_checkpoint_record(&checkpoint).await?;

    // A new invocation repeats the removal; only the index is left to update
    let mut project = Project::new(backend.clone());
    let removed = project.remove("c1").await?;
    assert_eq!(removed.kind, RecordKind::Checkpoint);
    assert_eq!(removed.id, "c1");

    assert_eq!(store.read_experiment("e1").await?.checkpoints, vec!["c2".to_string()]);
    assert!(Repository::load(&store).await?.dangling_checkpoint_ids().is_empty());
    assert!(backend.exists(&checkpoint_key("e1", "c2")).await?);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_record_blocks_every_operation() -> Result<()> {
    let (_dir, backend, store) = local_store()?;
    write_experiment(&store, "e1", &["c1"]).await?;
    backend
        .put(&checkpoint_key("e1", "c2"), Bytes::from("{ not json"))
        .await?;

    let mut project = Project::new(backend.clone());
    let result = project.remove("e1").await;
    assert!(matches!(result, Err(Error::CorruptRecord { .. })));

    // Nothing was deleted
    assert!(backend.exists(&experiment_key("e1")).await?);
    assert!(backend.exists(&checkpoint_key("e1", "c1")).await?);
    Ok(())
}
